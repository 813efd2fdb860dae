use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Failure of the screen capture collaborator or of persisting its frame.
/// Never fatal: the tick is skipped and retried.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no display available")]
    NoDisplay,
    #[error("capture backend failed: {0}")]
    Backend(String),
    #[error("failed to write frame {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl CaptureError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    pub fn write(path: impl Into<PathBuf>, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Write {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

/// Failure to turn a sealed bucket into a video. The bucket stays sealed.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("encoder executable not found: {0:?}")]
    EncoderMissing(PathBuf),
    #[error("failed to spawn encoder {encoder:?}: {source}")]
    Spawn {
        encoder: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encoder failed for bucket {key} ({status}): {stderr}")]
    Failed {
        key: String,
        status: String,
        stderr: String,
    },
    #[error("encoder reported success for bucket {key} but produced no output")]
    MissingOutput { key: String },
    #[error("bucket {0} has no images")]
    NoImages(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl EncodeError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("root directory {path:?} is not writable: {source}")]
    RootUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{message}")]
    Message { message: String },
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl ConfigError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_error_mentions_bucket() {
        let err = EncodeError::Failed {
            key: "2024-05-01".into(),
            status: "exit status: 1".into(),
            stderr: "corrupt input".into(),
        };
        let text = err.to_string();
        assert!(text.contains("2024-05-01"));
        assert!(text.contains("corrupt input"));
    }

    #[test]
    fn test_config_error_context_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = ConfigError::with_context("reading screenlog.toml", io);
        assert_eq!(err.to_string(), "reading screenlog.toml: missing");
        assert!(err.source().is_some());
    }
}
