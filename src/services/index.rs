use crate::{
    domain::{FileEntry, PeerRegistry},
    proto::command::{Command, Reply},
};
use std::{
    io::ErrorKind,
    net::{IpAddr, SocketAddr},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream, ToSocketAddrs, tcp::OwnedWriteHalf},
    time::timeout,
};
use tracing::{info, warn};

type SharedRegistry = Arc<RwLock<PeerRegistry>>;

/// What the server knows about one control connection. The username is
/// advisory; every catalog operation keys on the address.
struct ConnectionSession {
    addr: IpAddr,
    username: Option<String>,
}

/// The rendezvous server: accepts control connections, one handler task per
/// socket, and owns the shared peer registry.
///
/// Strict request/response: each handler reads one command line, mutates or
/// queries the registry under its lock, and writes exactly one reply before
/// the next read. JOIN ordering is not enforced; a CREATEFILE from an
/// un-joined address get-or-creates its record. Teardown of any kind (LEAVE,
/// EOF, error, idle timeout) purges the address from the catalog.
pub struct IndexServer {
    listener: TcpListener,
    registry: SharedRegistry,
    idle_timeout: Duration,
}

impl IndexServer {
    pub async fn bind(addr: impl ToSocketAddrs, idle_timeout: Duration) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self {
            listener,
            registry: Arc::new(RwLock::new(PeerRegistry::new())),
            idle_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(&self) -> io::Result<()> {
        info!(addr = ?self.listener.local_addr()?, "Index server listening");

        loop {
            let (stream, peer_addr) = self.listener.accept().await?;
            info!(ip = ?peer_addr.ip(), "Control connection opened");

            let registry = Arc::clone(&self.registry);
            let idle_timeout = self.idle_timeout;

            tokio::spawn(async move {
                if let Err(err) =
                    handle_control(stream, peer_addr, Arc::clone(&registry), idle_timeout).await
                {
                    warn!(ip = ?peer_addr.ip(), "Control connection error: {err}");
                }

                // Disconnection always purges the catalog entry, whether or
                // not LEAVE was sent.
                if let Ok(mut reg) = registry.write() {
                    reg.leave(peer_addr.ip());
                }
                info!(ip = ?peer_addr.ip(), "Control connection closed");
            });
        }
    }
}

async fn handle_control(
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: SharedRegistry,
    idle_timeout: Duration,
) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut session = ConnectionSession {
        addr: peer_addr.ip(),
        username: None,
    };

    loop {
        let line = match timeout(idle_timeout, lines.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => return Ok(()),
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                return Err(io::Error::new(ErrorKind::TimedOut, "control read timed out"));
            }
        };

        match Command::parse(line.trim()) {
            Ok(command) => dispatch(&mut writer, &registry, &mut session, command).await?,
            Err(err) => write_reply(&mut writer, &Reply::Error(err)).await?,
        }
    }
}

async fn dispatch(
    writer: &mut OwnedWriteHalf,
    registry: &SharedRegistry,
    session: &mut ConnectionSession,
    command: Command,
) -> io::Result<()> {
    let addr = session.addr;

    match command {
        Command::Join { username } => {
            let displaced = write_registry(registry)?.join(addr, &username);
            if let Some(prev) = displaced {
                // One record per address; identity is the address.
                warn!(ip = ?addr, prev = %prev, new = %username, "Join displaced an existing session");
            }

            info!(ip = ?addr, username = %username, "Peer joined");
            session.username = Some(username);
            write_reply(writer, &Reply::ConfirmJoin).await
        }
        Command::CreateFile { name, size } => {
            write_registry(registry)?.put_file(
                addr,
                FileEntry {
                    name: name.clone(),
                    size,
                },
            );
            write_reply(writer, &Reply::ConfirmCreateFile(name)).await
        }
        Command::DeleteFile { name } => {
            write_registry(registry)?.remove_file(addr, &name);
            write_reply(writer, &Reply::ConfirmDeleteFile(name)).await
        }
        Command::Search { pattern } => {
            let hits = read_registry(registry)?.search(&pattern);

            // Zero or more FILE lines, then an empty line as terminator.
            let mut out = String::new();
            for hit in &hits {
                out.push_str(&hit.to_string());
                out.push('\n');
            }
            out.push('\n');
            writer.write_all(out.as_bytes()).await
        }
        Command::Leave => {
            write_registry(registry)?.leave(addr);
            info!(ip = ?addr, username = ?session.username.take(), "Peer left");
            write_reply(writer, &Reply::ConfirmLeave).await
        }
    }
}

async fn write_reply(writer: &mut OwnedWriteHalf, reply: &Reply) -> io::Result<()> {
    writer.write_all(format!("{reply}\n").as_bytes()).await
}

fn write_registry(registry: &SharedRegistry) -> io::Result<RwLockWriteGuard<'_, PeerRegistry>> {
    registry
        .write()
        .map_err(|_| io::Error::other("registry lock poisoned"))
}

fn read_registry(registry: &SharedRegistry) -> io::Result<RwLockReadGuard<'_, PeerRegistry>> {
    registry
        .read()
        .map_err(|_| io::Error::other("registry lock poisoned"))
}
