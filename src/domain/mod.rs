mod file;
mod registry;

pub use file::{FileEntry, SearchHit};
pub use registry::{PeerRecord, PeerRegistry};
