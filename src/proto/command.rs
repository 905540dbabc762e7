use std::fmt;

/// Control commands, one per line on the persistent control connection.
///
/// The grammar is whitespace-delimited, so file names and usernames cannot
/// contain spaces. Extra trailing tokens are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join { username: String },
    CreateFile { name: String, size: u64 },
    DeleteFile { name: String },
    Search { pattern: String },
    Leave,
}

/// Malformed control input. Reported as an `ERROR` reply on the same
/// connection; the connection stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    UsernameRequired,
    InvalidCreateFile,
    InvalidDeleteFile,
    UnknownCommand,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut parts = line.split_whitespace();

        match parts.next() {
            Some("JOIN") => {
                let username = parts.next().ok_or(CommandError::UsernameRequired)?;
                Ok(Self::Join {
                    username: username.to_string(),
                })
            }
            Some("CREATEFILE") => {
                let name = parts.next().ok_or(CommandError::InvalidCreateFile)?;
                let size = parts
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or(CommandError::InvalidCreateFile)?;
                Ok(Self::CreateFile {
                    name: name.to_string(),
                    size,
                })
            }
            Some("DELETEFILE") => {
                let name = parts.next().ok_or(CommandError::InvalidDeleteFile)?;
                Ok(Self::DeleteFile {
                    name: name.to_string(),
                })
            }
            Some("SEARCH") => Ok(Self::Search {
                pattern: parts.next().unwrap_or_default().to_string(),
            }),
            Some("LEAVE") => Ok(Self::Leave),
            _ => Err(CommandError::UnknownCommand),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join { username } => write!(f, "JOIN {username}"),
            Self::CreateFile { name, size } => write!(f, "CREATEFILE {name} {size}"),
            Self::DeleteFile { name } => write!(f, "DELETEFILE {name}"),
            Self::Search { pattern } if pattern.is_empty() => write!(f, "SEARCH"),
            Self::Search { pattern } => write!(f, "SEARCH {pattern}"),
            Self::Leave => write!(f, "LEAVE"),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UsernameRequired => write!(f, "ERROR Username required"),
            Self::InvalidCreateFile => write!(f, "ERROR Invalid CREATEFILE format"),
            Self::InvalidDeleteFile => write!(f, "ERROR Invalid DELETEFILE format"),
            Self::UnknownCommand => write!(f, "ERROR Unknown command"),
        }
    }
}

/// Single-line confirmation replies. Search results are not a `Reply`: they
/// are zero or more `FILE` lines followed by an empty terminator line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    ConfirmJoin,
    ConfirmCreateFile(String),
    ConfirmDeleteFile(String),
    ConfirmLeave,
    Error(CommandError),
}

impl Reply {
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        match parts.next()? {
            "CONFIRMJOIN" => Some(Self::ConfirmJoin),
            "CONFIRMCREATEFILE" => Some(Self::ConfirmCreateFile(parts.next()?.to_string())),
            "CONFIRMDELETEFILE" => Some(Self::ConfirmDeleteFile(parts.next()?.to_string())),
            "CONFIRMLEAVE" => Some(Self::ConfirmLeave),
            _ => None,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfirmJoin => write!(f, "CONFIRMJOIN"),
            Self::ConfirmCreateFile(name) => write!(f, "CONFIRMCREATEFILE {name}"),
            Self::ConfirmDeleteFile(name) => write!(f, "CONFIRMDELETEFILE {name}"),
            Self::ConfirmLeave => write!(f, "CONFIRMLEAVE"),
            Self::Error(err) => write!(f, "{err}"),
        }
    }
}
