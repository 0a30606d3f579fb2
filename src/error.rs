use thiserror::Error;

/// Domain error kinds, each mapped to one of the process exit codes in the
/// CLI contract: 0 success, 1 invalid arguments, 2 runtime error, 3 unknown.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("bad database format: {0}")]
    BadFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("resource error: {0}")]
    Resource(String),
}

impl ClassifierError {
    /// Process exit code for this error, per the CLI contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            ClassifierError::InvalidArgument(_) => 1,
            ClassifierError::BadFormat(_) | ClassifierError::Io(_) | ClassifierError::Resource(_) => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
