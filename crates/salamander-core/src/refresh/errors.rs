use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("failed to read directory {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("panel driver is no longer running")]
    DriverGone,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RefreshError {
    pub fn error_code(&self) -> &'static str {
        match self {
            RefreshError::ReadDir { .. } => "read_dir_failed",
            RefreshError::Watch(_) => "watch_failed",
            RefreshError::DriverGone => "driver_gone",
            RefreshError::Io(_) => "io_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_dir_display() {
        let err = RefreshError::ReadDir {
            path: PathBuf::from("/srv/missing"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(err.to_string(), "failed to read directory /srv/missing: gone");
        assert_eq!(err.error_code(), "read_dir_failed");
    }

    #[test]
    fn test_driver_gone_code() {
        assert_eq!(RefreshError::DriverGone.error_code(), "driver_gone");
    }
}
