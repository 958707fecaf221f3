use thiserror::Error;

/// Failure classes of the sync core.
///
/// Each variant maps to one containment policy: `Config` is fatal at startup,
/// `Discovery` yields zero devices for the cycle, `Auth`/`Fetch`/`Parse` abort
/// the current device cycle when listing and only the current event when
/// downloading, `Io` aborts only the event being persisted.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("device discovery error: {0}")]
    Discovery(String),

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("manifest parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Short, stable label for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Config(_) => "config",
            SyncError::Auth(_) => "auth",
            SyncError::Discovery(_) => "discovery",
            SyncError::Fetch(_) => "fetch",
            SyncError::Parse(_) => "parse",
            SyncError::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
