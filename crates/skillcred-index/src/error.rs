use skillcred_core::{CoreError, SubmissionId};

/// Local index store errors.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no mirror row for submission {0}")]
    MirrorNotFound(SubmissionId),

    #[error("rejected mirror update: {0}")]
    Transition(#[from] CoreError),
}

impl From<rocksdb::Error> for IndexError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}
