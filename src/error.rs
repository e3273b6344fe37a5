use std::fmt;

#[derive(Debug)]
pub enum PixError {
    Io(std::io::Error),
    Checkpoint(String),
    InvalidInput(String),
}

impl fmt::Display for PixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixError::Io(e) => write!(f, "IO error: {}", e),
            PixError::Checkpoint(e) => write!(f, "Checkpoint error: {}", e),
            PixError::InvalidInput(e) => write!(f, "Invalid input: {}", e),
        }
    }
}

impl std::error::Error for PixError {}

impl From<std::io::Error> for PixError {
    fn from(err: std::io::Error) -> Self {
        PixError::Io(err)
    }
}

impl From<serde_json::Error> for PixError {
    fn from(err: serde_json::Error) -> Self {
        PixError::Checkpoint(err.to_string())
    }
}
