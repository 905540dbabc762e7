use std::{fmt, net::IpAddr};

/// A single advertised file: bare name plus size in bytes. No path, no
/// content hash; two files sharing a name are indistinguishable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

/// One search result: an advertised file paired with the address serving it.
/// Wire form is a `FILE <name> <addr> <size>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub name: String,
    pub addr: IpAddr,
    pub size: u64,
}

impl SearchHit {
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        if parts.next()? != "FILE" {
            return None;
        }

        let name = parts.next()?.to_string();
        let addr = parts.next()?.parse().ok()?;
        let size = parts.next()?.parse().ok()?;

        Some(Self { name, addr, size })
    }
}

impl fmt::Display for SearchHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FILE {} {} {}", self.name, self.addr, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_lines_round_trip() {
        let hit = SearchHit {
            name: "song.mp3".into(),
            addr: "10.0.0.1".parse().unwrap(),
            size: 5_000_000,
        };

        let line = hit.to_string();
        assert_eq!(line, "FILE song.mp3 10.0.0.1 5000000");
        assert_eq!(SearchHit::parse(&line), Some(hit));
    }

    #[test]
    fn rejects_non_result_lines() {
        assert_eq!(SearchHit::parse(""), None);
        assert_eq!(SearchHit::parse("CONFIRMJOIN"), None);
        assert_eq!(SearchHit::parse("FILE song.mp3 not-an-ip 10"), None);
        assert_eq!(SearchHit::parse("FILE song.mp3 10.0.0.1"), None);
    }
}
