use thiserror::Error;

#[derive(Error, Debug)]
pub enum MpwError {
    #[error("Invalid input: {0}")]
    Usage(String),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Master password does not match the profile's key ID")]
    MasterPassword,

    #[error("Format error: {0}")]
    Format(String),

    #[error("Crypto failure: {0}")]
    Crypto(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MpwError {
    /// The sysexits category reported by the CLI for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            MpwError::Usage(_) => 64,
            MpwError::MissingInput(_) => 65,
            MpwError::MasterPassword => 65,
            MpwError::Format(_) => 65,
            MpwError::Crypto(_) => 70,
            MpwError::Io(_) => 74,
        }
    }
}

pub type Result<T> = std::result::Result<T, MpwError>;
