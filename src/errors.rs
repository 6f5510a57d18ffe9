use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigError,
    InputError,
    AlignerError,
    IoError,
}

impl ErrorKind {
    /// Process exit code used by the binaries.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::ConfigError => 2,
            ErrorKind::InputError => 3,
            ErrorKind::AlignerError => 4,
            ErrorKind::IoError => 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed record in {}: {message}", path.display())]
    MalformedInput { path: PathBuf, message: String },

    #[error("input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("reference library index not found: {}", .0.display())]
    MissingLibrary(PathBuf),

    #[error("aligner failed on {}: {message}", index.display())]
    Aligner { index: PathBuf, message: String },

    #[error("unreadable alignment report: {0}")]
    Report(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PipelineError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        PipelineError::Config(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Config(_) => ErrorKind::ConfigError,
            PipelineError::MalformedInput { .. }
            | PipelineError::MissingInput(_)
            | PipelineError::MissingLibrary(_) => ErrorKind::InputError,
            PipelineError::Aligner { .. } | PipelineError::Report(_) => ErrorKind::AlignerError,
            PipelineError::Io(_) => ErrorKind::IoError,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Kind of the first `PipelineError` in the context chain. Errors that did
/// not originate in the pipeline count as I/O errors.
pub fn error_kind(err: &anyhow::Error) -> ErrorKind {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PipelineError>())
        .map_or(ErrorKind::IoError, PipelineError::kind)
}

/// Logs `err` and terminates the process with the exit code of its kind.
pub fn exit_with_error(err: &anyhow::Error) -> ! {
    log::error!("{:#}", err);
    std::process::exit(error_kind(err).exit_code());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            PipelineError::config("bad cut").kind(),
            ErrorKind::ConfigError
        );
        assert_eq!(
            PipelineError::MissingLibrary(PathBuf::from("human_rrna")).kind(),
            ErrorKind::InputError
        );
        assert_eq!(
            PipelineError::Report("short line".into()).kind(),
            ErrorKind::AlignerError
        );
        let io_err: PipelineError = io::Error::new(io::ErrorKind::Other, "disk").into();
        assert_eq!(io_err.kind(), ErrorKind::IoError);
    }

    #[test]
    fn test_error_kind_through_context() {
        let err = anyhow::Error::new(PipelineError::MissingInput(PathBuf::from("s1.fq")))
            .context("Failed to collapse s1.fq");
        assert_eq!(error_kind(&err), ErrorKind::InputError);
        assert_eq!(error_kind(&err).exit_code(), 3);

        let other = anyhow::anyhow!("thread pool exploded");
        assert_eq!(error_kind(&other), ErrorKind::IoError);
    }

    #[test]
    fn test_messages_name_the_file() {
        let err = PipelineError::MalformedInput {
            path: PathBuf::from("s1.fastq"),
            message: "missing '+' separator".into(),
        };
        assert_eq!(
            err.to_string(),
            "malformed record in s1.fastq: missing '+' separator"
        );
    }
}
