mod index;
mod session;
mod transfer;

pub use index::IndexServer;
pub use session::PeerSession;
pub use transfer::TransferService;
