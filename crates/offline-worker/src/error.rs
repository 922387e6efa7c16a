//! Error types for the offline worker

use std::fmt;

#[derive(Debug)]
pub enum WorkerError {
    /// The network fetch itself failed (offline, DNS, connection reset)
    Network(String),
    Cache(String),
    Io(Box<std::io::Error>),
    Json(String),
    /// A precache asset answered with a non-OK status during install
    Precache { url: String, status: u16 },
    InvalidCacheName(String),
    Lifecycle(String),
    /// Page request failed with neither a cached copy nor an offline page
    Offline(String),
    Url(String),
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::Network(msg) => write!(f, "Network error: {}", msg),
            WorkerError::Cache(msg) => write!(f, "Cache error: {}", msg),
            WorkerError::Io(err) => write!(f, "IO error: {}", err),
            WorkerError::Json(msg) => write!(f, "JSON error: {}", msg),
            WorkerError::Precache { url, status } => {
                write!(f, "Precache of {} failed with status {}", url, status)
            }
            WorkerError::InvalidCacheName(name) => write!(f, "Invalid cache name: {}", name),
            WorkerError::Lifecycle(msg) => write!(f, "Lifecycle error: {}", msg),
            WorkerError::Offline(url) => write!(f, "Offline and no cached copy of {}", url),
            WorkerError::Url(msg) => write!(f, "URL error: {}", msg),
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkerError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        WorkerError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        WorkerError::Json(err.to_string())
    }
}

impl From<url::ParseError> for WorkerError {
    fn from(err: url::ParseError) -> Self {
        WorkerError::Url(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precache_error_display() {
        let err = WorkerError::Precache {
            url: "http://localhost:4000/manifest.json".to_string(),
            status: 404,
        };
        assert_eq!(
            format!("{}", err),
            "Precache of http://localhost:4000/manifest.json failed with status 404"
        );
    }

    #[test]
    fn test_offline_error_display() {
        let err = WorkerError::Offline("http://localhost:4000/dashboard".to_string());
        assert!(format!("{}", err).contains("/dashboard"));
    }

    #[test]
    fn test_io_error_has_source() {
        use std::error::Error;

        let err = WorkerError::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        assert!(err.source().is_some());
        assert!(format!("{}", err).starts_with("IO error"));
    }

    #[test]
    fn test_url_parse_error_conversion() {
        let err: WorkerError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, WorkerError::Url(_)));
    }
}
