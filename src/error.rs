use thiserror::Error;

/// Main error type for the gantry gateway core
#[derive(Error, Debug, Clone)]
pub enum GantryError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// HTTP protocol errors
    #[error("HTTP error: {message}")]
    Http { message: String },

    /// File system errors
    #[error("File system error: {message}")]
    FileSystem { message: String },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl GantryError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an HTTP error
    pub fn http<S: Into<String>>(message: S) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    /// Create a file system error
    pub fn file_system<S: Into<String>>(message: S) -> Self {
        Self::FileSystem {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result type alias for gantry operations
pub type GantryResult<T> = Result<T, GantryError>;

/// Convert from std::io::Error to GantryError
impl From<std::io::Error> for GantryError {
    fn from(err: std::io::Error) -> Self {
        GantryError::file_system(format!("IO error: {}", err))
    }
}

/// Convert from toml::de::Error to GantryError
impl From<toml::de::Error> for GantryError {
    fn from(err: toml::de::Error) -> Self {
        GantryError::config(format!("TOML parsing error: {}", err))
    }
}

/// Convert from notify::Error to GantryError
impl From<notify::Error> for GantryError {
    fn from(err: notify::Error) -> Self {
        GantryError::file_system(format!("File watching error: {}", err))
    }
}

/// Convert from hyper::Error to GantryError
impl From<hyper::Error> for GantryError {
    fn from(err: hyper::Error) -> Self {
        GantryError::http(format!("HTTP error: {}", err))
    }
}

/// Convert from hyper::http::Error to GantryError
impl From<hyper::http::Error> for GantryError {
    fn from(err: hyper::http::Error) -> Self {
        GantryError::http(format!("HTTP error: {}", err))
    }
}

/// Convert from regex::Error to GantryError
impl From<regex::Error> for GantryError {
    fn from(err: regex::Error) -> Self {
        GantryError::config(format!("Invalid regular expression: {}", err))
    }
}
