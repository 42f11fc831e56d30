//! Domain errors for the Polity consistency layer.

use thiserror::Error;

/// Errors raised by the resolution and identity layer.
///
/// Only [`SyncError::StoreUnavailable`] and failures of an explicit repair are
/// meant to reach the view layer. Missing data is reported as `Ok(None)` by the
/// resolvers; the `NotFound` variant exists for callers that require the
/// entity to be present.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Node not found: {pointer}")]
    NotFound { pointer: String },

    #[error("Read of {path} not converged: expected at least {expected}, received {received}")]
    NotConverged {
        path: String,
        expected: usize,
        received: usize,
    },

    #[error("Graph store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Identity mapping for user {user_id} in game {game_id} references unusable actor {actor_id}")]
    InvalidMapping {
        game_id: String,
        user_id: String,
        actor_id: String,
    },

    #[error("Malformed pointer {value:?}: {reason}")]
    MalformedPointer { value: String, reason: String },

    #[error("Write to {path} failed: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("Failed to decode {kind}: {reason}")]
    Decode { kind: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    pub fn malformed(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPointer {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn decode(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Errors that retrying cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::MalformedPointer { .. }
        )
    }
}

impl From<serde_yaml::Error> for SyncError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::decode("yaml", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SyncError::StoreUnavailable("offline".to_string()).is_fatal());
        assert!(SyncError::malformed("a//b", "empty segment").is_fatal());
        assert!(!SyncError::NotFound {
            pointer: "actors/a1".to_string()
        }
        .is_fatal());
        assert!(!SyncError::WriteFailed {
            path: "games/g1/identity".to_string(),
            reason: "rejected".to_string(),
        }
        .is_fatal());
    }

    #[test]
    fn test_invalid_mapping_message() {
        let err = SyncError::InvalidMapping {
            game_id: "g1".to_string(),
            user_id: "u1".to_string(),
            actor_id: "x".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Identity mapping for user u1 in game g1 references unusable actor x"
        );
    }
}
