use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error on index {index}: {source}")]
    Transport {
        index: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend error ({status}) on index {index}: {reason}")]
    Backend {
        index: String,
        status: u16,
        reason: String,
    },

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Bulk request on index {index} had {failed} failed item(s) out of {total}")]
    Bulk {
        index: String,
        failed: usize,
        total: usize,
    },

    #[error("Response from index {index} exceeds {limit} bytes")]
    ResponseTooLarge { index: String, limit: usize },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Short label used in log lines and CLI output
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Transport { .. } | Self::Http(_) => "transport",
            Self::Backend { .. } => "backend",
            Self::IndexNotFound(_) => "index_not_found",
            Self::Configuration(_) => "configuration",
            Self::Bulk { .. } => "bulk",
            Self::ResponseTooLarge { .. } => "response_too_large",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Json(_) => "json",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
        }
    }

    /// True for errors raised by the caller's own aggregation or listener setup
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_labels() {
        assert_eq!(Error::IndexNotFound("x".into()).error_type(), "index_not_found");
        assert_eq!(
            Error::Configuration("bad range".into()).error_type(),
            "configuration"
        );
        assert_eq!(
            Error::Bulk {
                index: "i".into(),
                failed: 1,
                total: 3
            }
            .error_type(),
            "bulk"
        );
    }

    #[test]
    fn test_bulk_message() {
        let err = Error::Bulk {
            index: "studies".into(),
            failed: 2,
            total: 10,
        };
        assert_eq!(
            err.to_string(),
            "Bulk request on index studies had 2 failed item(s) out of 10"
        );
    }

    #[test]
    fn test_is_configuration() {
        assert!(Error::Configuration("x".into()).is_configuration());
        assert!(!Error::Config("x".into()).is_configuration());
    }
}
