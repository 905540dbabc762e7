use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{fs, io};

const CONFIG_FILE: &str = "peerdex.toml";

/// Node configuration, loaded from `peerdex.toml` in the working directory.
/// A missing file is written out with defaults so the ports and directories
/// are visible and editable.
///
/// The control and transfer ports are distinct constants of the overlay,
/// not protocol-mandated values; every node a session talks to must agree
/// on the transfer port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_host: String,
    pub control_port: u16,
    pub transfer_port: u16,
    pub shared_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub username: Option<String>,
    /// Bound on any single socket read while waiting for a reply or a
    /// transfer request.
    pub io_timeout_secs: u64,
    /// How long the index server waits for the next command before treating
    /// the connection as dead.
    pub idle_timeout_secs: u64,
}

impl Config {
    pub async fn init() -> io::Result<Self> {
        let path = Path::new(CONFIG_FILE);

        if path.exists() {
            let contents = fs::read_to_string(path).await?;
            toml::from_str(&contents).map_err(io::Error::other)
        } else {
            let cfg = Self::default();
            let contents = toml::to_string_pretty(&cfg).map_err(io::Error::other)?;
            fs::write(path, contents).await?;
            Ok(cfg)
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.control_port)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            control_port: 1234,
            transfer_port: 1235,
            shared_dir: PathBuf::from("public"),
            downloads_dir: PathBuf::from("downloads"),
            username: None,
            io_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}
