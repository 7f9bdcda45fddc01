use crate::mirror_state::{MirrorEvent, MirrorStatus};

/// Core protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid mirror transition from {from} on {event:?}")]
    InvalidMirrorTransition {
        from: MirrorStatus,
        event: MirrorEvent,
    },

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}
