//! Pipeline error types.

use thiserror::Error;
use vshort_media::MediaError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Rate limited by {service}: {message}")]
    RateLimited { service: String, message: String },

    #[error("Rate limit still exceeded after {attempts} attempts: {message}")]
    RateLimitExceeded { attempts: u32, message: String },

    #[error("{service} request failed ({status}): {message}")]
    Transport {
        service: String,
        status: u16,
        message: String,
    },

    #[error("No usable resource: {0}")]
    NoUsableResource(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cancelled by operator")]
    Cancelled,

    #[error("Invalid response from {service}: {message}")]
    InvalidResponse { service: String, message: String },

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PipelineError {
    /// Map a non-success HTTP status. 429 is the only rate-limit signal.
    pub fn from_http_status(service: &str, status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        if status == 429 {
            Self::RateLimited {
                service: service.to_string(),
                message,
            }
        } else {
            Self::Transport {
                service: service.to_string(),
                status,
                message,
            }
        }
    }

    pub fn no_usable_resource(msg: impl Into<String>) -> Self {
        Self::NoUsableResource(msg.into())
    }

    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_response(service: &str, msg: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service: service.to_string(),
            message: msg.into(),
        }
    }

    /// A single 429 from a remote service.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PipelineError::RateLimited { .. })
    }

    pub fn is_no_usable_resource(&self) -> bool {
        matches!(self, PipelineError::NoUsableResource(_))
    }

    /// Operator cancellation or shutdown, including a killed FFmpeg run.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            PipelineError::Cancelled | PipelineError::Media(MediaError::Cancelled)
        )
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            PipelineError::Timeout(_) | PipelineError::Media(MediaError::Timeout(_)) => true,
            PipelineError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status() {
        let err = PipelineError::from_http_status("pexels", 429, "slow down");
        assert!(err.is_rate_limited());

        let err = PipelineError::from_http_status("pexels", 503, "unavailable");
        assert!(!err.is_rate_limited());
        assert!(matches!(err, PipelineError::Transport { status: 503, .. }));
    }

    #[test]
    fn test_classification() {
        assert!(PipelineError::Cancelled.is_cancelled());
        assert!(PipelineError::Media(MediaError::Cancelled).is_cancelled());
        assert!(PipelineError::Timeout("download".into()).is_timeout());
        assert!(PipelineError::no_usable_resource("x").is_no_usable_resource());
        assert!(!PipelineError::task_failed("x").is_cancelled());
    }
}
