use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Errors after which no further group of the same run can succeed.
    pub fn aborts_run(&self) -> bool {
        matches!(self, Error::AuthenticationFailed(_) | Error::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aborts_run() {
        assert!(Error::AuthenticationFailed("401".into()).aborts_run());
        assert!(Error::Config("missing key".into()).aborts_run());
        assert!(!Error::Upstream("malformed body".into()).aborts_run());
        assert!(!Error::InvalidRecord("bad date".into()).aborts_run());
    }
}
