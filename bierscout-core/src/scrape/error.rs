use thiserror::Error;

pub type ScrapeResult<T> = Result<T, ScrapeError>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("profile error: {0}")]
    Profile(String),
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("bot detection suspected: {0}")]
    BotDetected(String),
    #[error("unsupported store: {0}")]
    UnsupportedStore(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<tokio::task::JoinError> for ScrapeError {
    fn from(err: tokio::task::JoinError) -> Self {
        ScrapeError::Unexpected(err.to_string())
    }
}

/// Failure classes the controller acts on (spec'd reset/backoff policy is
/// keyed off these, not off concrete error variants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Browser or context could not be created. Fatal to the store's run.
    Initialization,
    /// A navigation or wait ran out of time. Processing continues with
    /// whatever content is present.
    SoftTimeout,
    /// A selector or attribute was missing for one record or one page.
    Extraction,
    /// The store appears to have identified automated access.
    BotDetection,
    /// The factory has no adapter for the store name.
    UnsupportedStore,
    Other,
}

pub fn categorize(error: &ScrapeError) -> ErrorCategory {
    match error {
        ScrapeError::Launch(_) | ScrapeError::Profile(_) => ErrorCategory::Initialization,
        ScrapeError::Timeout(_) => ErrorCategory::SoftTimeout,
        ScrapeError::Extraction(_) => ErrorCategory::Extraction,
        ScrapeError::BotDetected(_) => ErrorCategory::BotDetection,
        ScrapeError::UnsupportedStore(_) => ErrorCategory::UnsupportedStore,
        ScrapeError::Cdp(err) => {
            let text = err.to_string().to_lowercase();
            if text.contains("timeout") {
                ErrorCategory::SoftTimeout
            } else if text.contains("captcha") || text.contains("denied") {
                ErrorCategory::BotDetection
            } else {
                ErrorCategory::Other
            }
        }
        ScrapeError::Unexpected(message) => {
            if message.to_lowercase().contains("captcha") {
                ErrorCategory::BotDetection
            } else {
                ErrorCategory::Other
            }
        }
        ScrapeError::Io(_) | ScrapeError::Configuration(_) => ErrorCategory::Other,
    }
}
