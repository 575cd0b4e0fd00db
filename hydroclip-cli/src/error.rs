use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Clip(#[from] hydroclip_engine::ClipError),

    #[error("Invalid config file: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("{failed} of {total} clips failed")]
    ClipsFailed { failed: usize, total: usize },

    #[error("{inconsistent} of {total} folders do not match their playlist")]
    FoldersInconsistent { inconsistent: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, AppError>;
