use crate::{
    proto::transfer::{TransferError, TransferRequest, TransferStatus},
    utils::fs::FileStore,
};
use std::{io::ErrorKind, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{self, AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, ToSocketAddrs},
    time::timeout,
};
use tracing::{info, warn};

const REQUEST_BUF: usize = 1024;

/// Per-peer transfer listener: serves byte ranges of shared files, one GET
/// per freshly opened connection, on a port distinct from the control port.
///
/// Validation order is fixed: file existence, then start offset, then end
/// offset, short-circuiting on the first failure. On success the status line
/// `OK <n>` goes out first and exactly `n` bytes follow; a mid-stream I/O
/// failure truncates the connection instead of sending a corrective reply.
pub struct TransferService {
    listener: TcpListener,
    store: Arc<FileStore>,
    read_timeout: Duration,
}

impl TransferService {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        store: Arc<FileStore>,
        read_timeout: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self {
            listener,
            store,
            read_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(&self) -> io::Result<()> {
        info!(addr = ?self.listener.local_addr()?, "Transfer service listening");

        loop {
            let (stream, peer_addr) = self.listener.accept().await?;
            let store = Arc::clone(&self.store);
            let read_timeout = self.read_timeout;

            tokio::spawn(async move {
                if let Err(err) = handle_request(stream, peer_addr, store, read_timeout).await {
                    warn!(ip = ?peer_addr.ip(), "Transfer connection error: {err}");
                }
            });
        }
    }
}

async fn handle_request(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    store: Arc<FileStore>,
    read_timeout: Duration,
) -> io::Result<()> {
    // One newline-free command per connection; a single bounded read is the
    // whole request.
    let mut buf = [0u8; REQUEST_BUF];
    let n = match timeout(read_timeout, stream.read(&mut buf)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(io::Error::new(ErrorKind::TimedOut, "transfer read timed out"));
        }
    };

    let line = String::from_utf8_lossy(&buf[..n]);
    let request = match TransferRequest::parse(line.trim()) {
        Ok(request) => request,
        Err(err) => return send_status(&mut stream, TransferStatus::Error(err)).await,
    };

    serve(&mut stream, peer_addr, &store, &request).await
}

async fn serve(
    stream: &mut TcpStream,
    peer_addr: SocketAddr,
    store: &FileStore,
    request: &TransferRequest,
) -> io::Result<()> {
    let size = match store.file_size(&request.name).await {
        Ok(Some(size)) => size,
        Ok(None) => {
            return send_status(stream, TransferStatus::Error(TransferError::FileNotFound)).await;
        }
        Err(err) => {
            let _ = send_status(stream, TransferStatus::Error(TransferError::Internal)).await;
            return Err(err);
        }
    };

    let (start, end) = match request.resolve(size) {
        Ok(range) => range,
        Err(err) => return send_status(stream, TransferStatus::Error(err)).await,
    };

    send_status(stream, TransferStatus::Ok(end - start)).await?;

    // Past this point errors just drop the connection; the client counts
    // bytes and detects the short read.
    let sent = store.stream_range(&request.name, start, end, stream).await?;
    if sent < end - start {
        warn!(file = %request.name, sent, expected = end - start, "File shrank mid-stream");
        return Err(io::Error::new(ErrorKind::UnexpectedEof, "short range read"));
    }

    info!(ip = ?peer_addr.ip(), file = %request.name, start, end, "Served byte range");
    stream.flush().await
}

async fn send_status(stream: &mut TcpStream, status: TransferStatus) -> io::Result<()> {
    stream.write_all(format!("{status}\n").as_bytes()).await
}
