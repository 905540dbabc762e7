use crate::{
    domain::{FileEntry, SearchHit},
    proto::{
        command::{Command, Reply},
        transfer::{TransferRequest, TransferStatus},
    },
    utils::fs::FileStore,
};
use std::{
    io::ErrorKind,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::timeout,
};
use tracing::warn;

/// A completed (or truncated) download: where it landed and how many bytes
/// arrived.
#[derive(Debug)]
pub struct Download {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Client-side orchestrator: holds the persistent control connection to the
/// index server, advertises the local shared directory, searches the
/// catalog, and drives single-shot downloads against remote transfer
/// services.
pub struct PeerSession {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    transfer_port: u16,
    store: Arc<FileStore>,
    reply_timeout: Duration,
}

impl PeerSession {
    /// Connects the control channel. `transfer_port` is the well-known port
    /// remote peers serve transfers on; it must match what those peers
    /// bound.
    pub async fn connect(
        server_addr: impl ToSocketAddrs,
        transfer_port: u16,
        store: Arc<FileStore>,
        reply_timeout: Duration,
    ) -> io::Result<Self> {
        let stream = TcpStream::connect(server_addr).await?;
        let (reader, writer) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            transfer_port,
            store,
            reply_timeout,
        })
    }

    pub async fn join(&mut self, username: &str) -> io::Result<()> {
        let reply = self
            .request(&Command::Join {
                username: username.to_string(),
            })
            .await?;

        match Reply::parse(&reply) {
            Some(Reply::ConfirmJoin) => Ok(()),
            _ => Err(rejection("join", &reply)),
        }
    }

    /// Enumerates the shared directory and advertises one CREATEFILE per
    /// file. Returns how many were accepted; individual rejections are
    /// logged and skipped.
    pub async fn advertise_local_files(&mut self) -> io::Result<usize> {
        let mut shared = 0;
        for entry in self.store.scan_files()? {
            match self.create_file(&entry).await {
                Ok(()) => shared += 1,
                Err(err) => warn!(file = %entry.name, "Failed to advertise: {err}"),
            }
        }
        Ok(shared)
    }

    pub async fn create_file(&mut self, entry: &FileEntry) -> io::Result<()> {
        let reply = self
            .request(&Command::CreateFile {
                name: entry.name.clone(),
                size: entry.size,
            })
            .await?;

        match Reply::parse(&reply) {
            Some(Reply::ConfirmCreateFile(_)) => Ok(()),
            _ => Err(rejection("createfile", &reply)),
        }
    }

    pub async fn delete_file(&mut self, name: &str) -> io::Result<()> {
        let reply = self
            .request(&Command::DeleteFile {
                name: name.to_string(),
            })
            .await?;

        match Reply::parse(&reply) {
            Some(Reply::ConfirmDeleteFile(_)) => Ok(()),
            _ => Err(rejection("deletefile", &reply)),
        }
    }

    /// Submits a search; the empty pattern lists the whole catalog. The
    /// reply is zero or more `FILE` lines closed by an empty line.
    pub async fn search(&mut self, pattern: &str) -> io::Result<Vec<SearchHit>> {
        let command = Command::Search {
            pattern: pattern.to_string(),
        };
        self.writer
            .write_all(format!("{command}\n").as_bytes())
            .await?;

        let mut hits = Vec::new();
        loop {
            let line = self.read_reply_line().await?;
            if line.is_empty() {
                return Ok(hits);
            }

            match SearchHit::parse(&line) {
                Some(hit) => hits.push(hit),
                None => {
                    return Err(io::Error::new(
                        ErrorKind::InvalidData,
                        format!("malformed search result: {line}"),
                    ));
                }
            }
        }
    }

    /// Fetches `[start, end)` (or to end-of-file) of `name` from `peer` and
    /// persists it under the range-encoding download name. Fails with the
    /// peer's error line on rejection, and with `UnexpectedEof` when the
    /// stream ends short of the announced byte count (the partial file is
    /// kept for manual resume via offsets).
    pub async fn download(
        &self,
        peer: IpAddr,
        name: &str,
        start: u64,
        end: Option<u64>,
    ) -> io::Result<Download> {
        let addr = SocketAddr::new(peer, self.transfer_port);
        let stream = TcpStream::connect(addr).await?;
        let mut reader = BufReader::new(stream);

        let request = TransferRequest {
            name: name.to_string(),
            start,
            end,
        };
        reader
            .get_mut()
            .write_all(request.to_string().as_bytes())
            .await?;

        let mut line = String::new();
        match timeout(self.reply_timeout, reader.read_line(&mut line)).await {
            Ok(result) => {
                result?;
            }
            Err(_) => {
                return Err(io::Error::new(ErrorKind::TimedOut, "transfer reply timed out"));
            }
        }

        match TransferStatus::parse(line.trim_end()) {
            Some(TransferStatus::Ok(len)) => {
                let path = self.store.download_path(name, start, end);
                let bytes = self.store.write_download(&path, len, &mut reader).await?;

                if bytes < len {
                    warn!(file = %name, bytes, expected = len, "Download truncated");
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("short read: {bytes} of {len} bytes"),
                    ));
                }

                Ok(Download { path, bytes })
            }
            Some(TransferStatus::Error(err)) => Err(io::Error::other(err.to_string())),
            None => Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("malformed transfer reply: {}", line.trim_end()),
            )),
        }
    }

    /// Tells the server this peer is gone. Its whole catalog record vanishes
    /// the moment the server confirms.
    pub async fn leave(&mut self) -> io::Result<()> {
        let reply = self.request(&Command::Leave).await?;

        match Reply::parse(&reply) {
            Some(Reply::ConfirmLeave) => Ok(()),
            _ => Err(rejection("leave", &reply)),
        }
    }

    async fn request(&mut self, command: &Command) -> io::Result<String> {
        self.writer
            .write_all(format!("{command}\n").as_bytes())
            .await?;
        self.read_reply_line().await
    }

    async fn read_reply_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        let n = match timeout(self.reply_timeout, self.reader.read_line(&mut line)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(io::Error::new(ErrorKind::TimedOut, "control reply timed out"));
            }
        };

        if n == 0 {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                "server closed the control connection",
            ));
        }
        Ok(line.trim_end().to_string())
    }
}

fn rejection(op: &str, reply: &str) -> io::Error {
    io::Error::other(format!("{op} rejected: {reply}"))
}
