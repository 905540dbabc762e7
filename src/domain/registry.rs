use crate::domain::{FileEntry, SearchHit};
use std::{collections::BTreeMap, net::IpAddr};

/// Everything the catalog knows about one peer: an advisory username and the
/// files it advertises, in advertisement order.
#[derive(Debug, Default, Clone)]
pub struct PeerRecord {
    pub username: Option<String>,
    pub files: Vec<FileEntry>,
}

/// The server-side in-memory catalog: peer address to advertised files.
///
/// Identity is the network address; usernames are metadata, never lookup
/// keys. One record per address, created implicitly on the first JOIN or
/// CREATEFILE and destroyed whole on LEAVE or disconnect. Nothing survives
/// a restart.
///
/// The index server owns the registry exclusively, behind a single `RwLock`;
/// every read-modify-write here runs inside one lock acquisition. A
/// `BTreeMap` keeps search output deterministic: address order, then
/// advertisement order within one peer.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: BTreeMap<IpAddr, PeerRecord>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `username` to `addr`, creating the record if absent and
    /// preserving any files already advertised. Returns the username this
    /// join displaced, if a differently-named session held the address.
    pub fn join(&mut self, addr: IpAddr, username: &str) -> Option<String> {
        let record = self.peers.entry(addr).or_default();

        let displaced = match record.username.as_deref() {
            Some(prev) if prev != username => Some(prev.to_string()),
            _ => None,
        };
        record.username = Some(username.to_string());
        displaced
    }

    /// Upserts an advertisement. Re-advertising a name drops the old entry
    /// and appends the new one, so the entry moves to the end of the record.
    pub fn put_file(&mut self, addr: IpAddr, entry: FileEntry) {
        let record = self.peers.entry(addr).or_default();
        record.files.retain(|f| f.name != entry.name);
        record.files.push(entry);
    }

    /// Removes one advertisement. Absent entries and absent peers are a
    /// no-op, not an error.
    pub fn remove_file(&mut self, addr: IpAddr, name: &str) {
        if let Some(record) = self.peers.get_mut(&addr) {
            record.files.retain(|f| f.name != name);
        }
    }

    /// Case-insensitive substring search across all peers. The empty pattern
    /// matches everything.
    pub fn search(&self, pattern: &str) -> Vec<SearchHit> {
        let pattern = pattern.to_lowercase();

        self.peers
            .iter()
            .flat_map(|(addr, record)| {
                record
                    .files
                    .iter()
                    .filter(|f| f.name.to_lowercase().contains(&pattern))
                    .map(|f| SearchHit {
                        name: f.name.clone(),
                        addr: *addr,
                        size: f.size,
                    })
            })
            .collect()
    }

    /// Drops the whole record for `addr`. A peer is fully present or fully
    /// absent; there is no partial leave. Returns whether it was present.
    pub fn leave(&mut self, addr: IpAddr) -> bool {
        self.peers.remove(&addr).is_some()
    }

    pub fn record(&self, addr: IpAddr) -> Option<&PeerRecord> {
        self.peers.get(&addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, RwLock};

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn entry(name: &str, size: u64) -> FileEntry {
        FileEntry {
            name: name.into(),
            size,
        }
    }

    #[test]
    fn last_write_wins_per_filename() {
        let mut registry = PeerRegistry::new();
        let a = addr("10.0.0.1");

        registry.join(a, "alice");
        registry.put_file(a, entry("a.txt", 10));
        registry.put_file(a, entry("b.txt", 20));
        registry.put_file(a, entry("a.txt", 30));

        let files = &registry.record(a).unwrap().files;
        assert_eq!(files, &[entry("b.txt", 20), entry("a.txt", 30)]);

        registry.remove_file(a, "b.txt");
        assert_eq!(registry.record(a).unwrap().files, vec![entry("a.txt", 30)]);

        // Absent entries and absent peers are no-ops.
        registry.remove_file(a, "b.txt");
        registry.remove_file(addr("10.0.0.9"), "b.txt");
        assert_eq!(registry.record(a).unwrap().files.len(), 1);
    }

    #[test]
    fn createfile_before_join_creates_the_record() {
        let mut registry = PeerRegistry::new();
        let a = addr("10.0.0.1");

        registry.put_file(a, entry("a.txt", 10));

        let record = registry.record(a).unwrap();
        assert_eq!(record.username, None);
        assert_eq!(record.files.len(), 1);

        // A later join keeps the advertised files.
        registry.join(a, "alice");
        assert_eq!(registry.record(a).unwrap().files.len(), 1);
    }

    #[test]
    fn join_reports_displaced_username() {
        let mut registry = PeerRegistry::new();
        let a = addr("10.0.0.1");

        assert_eq!(registry.join(a, "alice"), None);
        assert_eq!(registry.join(a, "alice"), None);
        assert_eq!(registry.join(a, "bob"), Some("alice".to_string()));
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let mut registry = PeerRegistry::new();
        registry.put_file(addr("10.0.0.2"), entry("Song.MP3", 2));
        registry.put_file(addr("10.0.0.1"), entry("song.mp3", 1));
        registry.put_file(addr("10.0.0.1"), entry("notes.txt", 3));

        let hits = registry.search("song");
        assert_eq!(hits.len(), 2);
        // Address order, then advertisement order.
        assert_eq!(hits[0].addr, addr("10.0.0.1"));
        assert_eq!(hits[0].name, "song.mp3");
        assert_eq!(hits[1].addr, addr("10.0.0.2"));
        assert_eq!(hits[1].name, "Song.MP3");

        assert_eq!(registry.search("SONG").len(), 2);
        assert_eq!(registry.search("zzz").len(), 0);
    }

    #[test]
    fn empty_pattern_matches_everything() {
        let mut registry = PeerRegistry::new();
        registry.put_file(addr("10.0.0.1"), entry("a.txt", 1));
        registry.put_file(addr("10.0.0.2"), entry("b.txt", 2));

        assert_eq!(registry.search("").len(), 2);
    }

    #[test]
    fn leave_clears_all_files_atomically() {
        let mut registry = PeerRegistry::new();
        let a = addr("10.0.0.1");
        let b = addr("10.0.0.2");

        registry.join(a, "alice");
        registry.put_file(a, entry("song.mp3", 5_000_000));
        registry.join(b, "bob");
        registry.put_file(b, entry("other.mp3", 1));

        assert!(registry.leave(a));
        assert!(registry.record(a).is_none());
        assert_eq!(registry.search("").len(), 1);

        // Leaving twice is fine.
        assert!(!registry.leave(a));
    }

    #[test]
    fn concurrent_joins_never_lose_records() {
        let registry = Arc::new(RwLock::new(PeerRegistry::new()));
        let peers = 8;
        let files_per_peer = 5;

        let handles: Vec<_> = (0..peers)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let a = addr(&format!("10.0.0.{}", i + 1));
                    for round in 0..200u64 {
                        registry.write().unwrap().join(a, &format!("user{i}"));
                        for f in 0..files_per_peer {
                            registry
                                .write()
                                .unwrap()
                                .put_file(a, entry(&format!("file-{i}-{f}"), round));
                        }
                        if round % 3 == 0 {
                            registry.write().unwrap().leave(a);
                        }
                    }
                    // Settle into a known final state.
                    let mut reg = registry.write().unwrap();
                    reg.join(a, &format!("user{i}"));
                    for f in 0..files_per_peer {
                        reg.put_file(a, entry(&format!("file-{i}-{f}"), f));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let reg = registry.read().unwrap();
        for i in 0..peers {
            let record = reg.record(addr(&format!("10.0.0.{}", i + 1))).unwrap();
            assert_eq!(record.username.as_deref(), Some(format!("user{i}").as_str()));
            assert_eq!(record.files.len(), files_per_peer as usize);
        }
        assert_eq!(reg.search("file-").len(), peers as usize * files_per_peer as usize);
    }
}
