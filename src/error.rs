//! Crate-wide error taxonomy and result alias.

use thiserror::Error;

/// Errors surfaced by the orchestration core.
///
/// Every variant is recoverable at the session level: callers display the
/// message and the session stays usable. Build-stage classifications that
/// are states rather than errors (`CompileFailed`, `ToolMissing`,
/// `IoFailed`) live on [`crate::build::BuildStatus`] instead.
#[derive(Error, Debug)]
pub enum PadError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("source text is empty")]
    EmptyInput,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no successful build to run")]
    NotReady,

    #[error("an operation is already in flight")]
    Busy,

    #[error("run error: {0}")]
    Run(String),
}

/// Result type alias for runpad operations
pub type Result<T> = std::result::Result<T, PadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = PadError::UnsupportedLanguage("cobol".to_string());
        assert_eq!(err.to_string(), "unsupported language: cobol");

        let err = PadError::EmptyInput;
        assert_eq!(err.to_string(), "source text is empty");

        let err = PadError::Run("gone".to_string());
        assert_eq!(err.to_string(), "run error: gone");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: PadError = io.into();
        assert!(matches!(err, PadError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }
}
