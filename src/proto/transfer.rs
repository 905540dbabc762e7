use std::fmt;

/// A byte-range request: `GET <name> <start> [<end>]`, one per transfer
/// connection. `start` is inclusive, `end` exclusive; a missing `end` means
/// "to end of file". Never persisted, validated against the file size at
/// request time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub name: String,
    pub start: u64,
    pub end: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    InvalidFormat,
    InvalidOffsetStart,
    InvalidOffsetEnd,
    FileNotFound,
    UnknownCommand,
    Internal,
}

impl TransferRequest {
    pub fn parse(line: &str) -> Result<Self, TransferError> {
        let mut parts = line.split_whitespace();

        match parts.next() {
            Some("GET") => {}
            _ => return Err(TransferError::UnknownCommand),
        }

        let name = parts.next().ok_or(TransferError::InvalidFormat)?;
        let start = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or(TransferError::InvalidFormat)?;
        let end = match parts.next() {
            Some(s) => Some(s.parse().map_err(|_| TransferError::InvalidFormat)?),
            None => None,
        };

        Ok(Self {
            name: name.to_string(),
            start,
            end,
        })
    }

    /// Resolves the request against the target file's current size into a
    /// concrete half-open `[start, end)` range. Checks start before end, so
    /// the first invalid offset wins.
    pub fn resolve(&self, file_size: u64) -> Result<(u64, u64), TransferError> {
        if self.start >= file_size {
            return Err(TransferError::InvalidOffsetStart);
        }

        let end = self.end.unwrap_or(file_size);
        if end <= self.start || end > file_size {
            return Err(TransferError::InvalidOffsetEnd);
        }

        Ok((self.start, end))
    }
}

impl fmt::Display for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "GET {} {} {}", self.name, self.start, end),
            None => write!(f, "GET {} {}", self.name, self.start),
        }
    }
}

impl TransferError {
    pub fn parse(line: &str) -> Option<Self> {
        match line {
            "ERROR Invalid command format" => Some(Self::InvalidFormat),
            "ERROR Invalid offset start" => Some(Self::InvalidOffsetStart),
            "ERROR Invalid offset end" => Some(Self::InvalidOffsetEnd),
            "ERROR File not found" => Some(Self::FileNotFound),
            "ERROR Unknown command" => Some(Self::UnknownCommand),
            "ERROR Internal server error" => Some(Self::Internal),
            _ => None,
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat => write!(f, "ERROR Invalid command format"),
            Self::InvalidOffsetStart => write!(f, "ERROR Invalid offset start"),
            Self::InvalidOffsetEnd => write!(f, "ERROR Invalid offset end"),
            Self::FileNotFound => write!(f, "ERROR File not found"),
            Self::UnknownCommand => write!(f, "ERROR Unknown command"),
            Self::Internal => write!(f, "ERROR Internal server error"),
        }
    }
}

/// The status line a transfer service sends back before any payload:
/// `OK <byteCount>` then exactly that many raw bytes, or a named error and
/// nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Ok(u64),
    Error(TransferError),
}

impl TransferStatus {
    pub fn parse(line: &str) -> Option<Self> {
        if let Some(count) = line.strip_prefix("OK ") {
            return count.trim().parse().ok().map(Self::Ok);
        }
        TransferError::parse(line).map(Self::Error)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(count) => write!(f, "OK {count}"),
            Self::Error(err) => write!(f, "{err}"),
        }
    }
}
