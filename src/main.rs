mod config;
mod domain;
mod proto;
mod services;
mod utils;

use crate::{
    config::Config,
    services::{IndexServer, PeerSession, TransferService},
    utils::fs::FileStore,
};
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::init().await?;

    match std::env::args().nth(1).as_deref() {
        Some("server") => run_server(config).await,
        Some("peer") | None => run_peer(config).await,
        Some(other) => {
            eprintln!("unknown mode `{other}`; usage: peerdex [server | peer [username]]");
            std::process::exit(2);
        }
    }
}

async fn run_server(config: Config) -> io::Result<()> {
    let server = IndexServer::bind(("0.0.0.0", config.control_port), config.idle_timeout()).await?;
    server.run().await
}

async fn run_peer(config: Config) -> io::Result<()> {
    let username = std::env::args()
        .nth(2)
        .or_else(|| config.username.clone())
        .or_else(|| hostname::get().ok().and_then(|h| h.into_string().ok()))
        .unwrap_or_else(|| "anonymous".to_string());

    let store = Arc::new(FileStore::new(&config.shared_dir, &config.downloads_dir)?);

    let transfer =
        TransferService::bind(("0.0.0.0", config.transfer_port), Arc::clone(&store), config.io_timeout())
            .await?;
    match local_ip_address::local_ip() {
        Ok(ip) => info!(addr = %format!("{ip}:{}", config.transfer_port), "Transfer service reachable"),
        Err(err) => warn!("Could not determine local address: {err}"),
    }

    let mut session = PeerSession::connect(
        config.server_addr(),
        config.transfer_port,
        store,
        config.io_timeout(),
    )
    .await?;

    session.join(&username).await?;
    let shared = session.advertise_local_files().await?;
    info!(username = %username, shared, "Joined index server");

    tokio::select!(
        res = transfer.run() => res,
        res = menu_loop(&mut session) => res,
    )
}

/// Minimal line-driven menu over stdin. Command failures are reported and
/// the loop continues; only a dead control connection or quitting ends the
/// session, and LEAVE always goes out before the socket closes.
async fn menu_loop(session: &mut PeerSession) -> io::Result<()> {
    print_usage();

    let mut input = BufReader::new(io::stdin()).lines();
    while let Some(line) = input.next_line().await? {
        let line = line.trim();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));

        match verb {
            "" => {}
            "share" => match session.advertise_local_files().await {
                Ok(n) => println!("shared {n} file(s)"),
                Err(err) => println!("share failed: {err}"),
            },
            "list" => match session.search("").await {
                Ok(hits) => print_hits(&hits),
                Err(err) => println!("list failed: {err}"),
            },
            "search" => match session.search(rest).await {
                Ok(hits) => print_hits(&hits),
                Err(err) => println!("search failed: {err}"),
            },
            "rm" if !rest.is_empty() => match session.delete_file(rest).await {
                Ok(()) => println!("removed {rest} from the catalog"),
                Err(err) => println!("rm failed: {err}"),
            },
            "get" => handle_get(session, rest).await,
            "quit" | "exit" => break,
            _ => print_usage(),
        }
    }

    if let Err(err) = session.leave().await {
        warn!("Failed to send LEAVE: {err}");
    }
    Ok(())
}

async fn handle_get(session: &PeerSession, args: &str) {
    let mut parts = args.split_whitespace();
    let (Some(addr), Some(name)) = (parts.next(), parts.next()) else {
        println!("usage: get <addr> <file> [start [end]]");
        return;
    };
    let Ok(addr) = addr.parse() else {
        println!("invalid peer address: {addr}");
        return;
    };
    let start = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let end = parts.next().and_then(|s| s.parse().ok());

    match session.download(addr, name, start, end).await {
        Ok(download) => {
            println!("saved {} byte(s) to {}", download.bytes, download.path.display());
        }
        Err(err) => println!("download failed: {err}"),
    }
}

fn print_hits(hits: &[crate::domain::SearchHit]) {
    if hits.is_empty() {
        println!("no matches");
        return;
    }
    for hit in hits {
        println!("{}  {}  {} bytes", hit.name, hit.addr, hit.size);
    }
}

fn print_usage() {
    println!("commands: share | list | search <pattern> | get <addr> <file> [start [end]] | rm <file> | quit");
}

#[cfg(test)]
mod tests {
    pub mod flow;
}
