use thiserror::Error;

/// Classified failures raised by the source and destination clients.
///
/// Only `MaxRetries` comes out of a retry loop; every other variant is
/// returned on first occurrence.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request {method} {url} failed: {message}")]
    Transport {
        method: String,
        url: String,
        message: String,
    },

    #[error("unexpected status {status} from {method} {url}")]
    Api {
        method: String,
        url: String,
        status: u16,
    },

    #[error("reached max retries ({attempts}) for {method} {url}")]
    MaxRetries {
        method: String,
        url: String,
        attempts: u32,
    },

    #[error("account limit exceeded: {0}")]
    AccountLimit(String),

    #[error("list {0} not found")]
    ListNotFound(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("sign-in blocked by a captcha challenge; sign in manually in a browser or switch to cookie authentication")]
    Captcha,

    #[error("resource {0} is private or does not exist")]
    ResourceUnavailable(String),

    #[error("could not find element `{selector}` on {page}")]
    Scrape { selector: String, page: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("export of {resource} not ready after {attempts} attempts")]
    ExportTimeout { resource: String, attempts: u32 },

    #[error("browser error: {0}")]
    Browser(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl SourceError {
    /// Not-found outcomes are consumed by callers rather than treated as fatal
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::ListNotFound(_) | SourceError::ResourceUnavailable(_))
    }

    pub fn scrape(selector: impl Into<String>, page: impl Into<String>) -> Self {
        SourceError::Scrape {
            selector: selector.into(),
            page: page.into(),
        }
    }
}

pub type Result<T, E = SourceError> = std::result::Result<T, E>;
