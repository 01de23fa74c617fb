use reqwest::StatusCode;
use std::time::Duration;

/// Longest response body excerpt carried into an error message.
const BODY_EXCERPT: usize = 512;

/// An error raised by one of the service clients.
///
/// Every failure is scoped to the call that produced it; nothing is retried.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A required parameter was missing or empty. Raised before any request is sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The service answered with a status code the client treats as a failure.
    #[error("HTTP {status} for url ({url})\n{}", excerpt(.body))]
    Http {
        status: StatusCode,
        url: String,
        body: String,
    },

    /// The body could not be decoded, or an expected key or element was absent.
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// The job reached the terminal `error` state.
    #[error("subset job {token} failed{}", suffix(.message))]
    JobFailed {
        token: String,
        message: Option<String>,
    },

    /// The job reached the terminal `partial error` state; resubmitting may succeed.
    #[error("subset job {token} finished with partial errors, submit the job again{}", suffix(.message))]
    JobPartialFailure {
        token: String,
        message: Option<String>,
    },

    /// The service does not recognise the token (or the dataset it was submitted for).
    #[error("subset job {token} is unknown to the service")]
    UnknownJob { token: String },

    /// The optional poll deadline elapsed before the job reached a terminal state.
    #[error("gave up waiting for subset job {token} after {elapsed:?}")]
    Timeout { token: String, elapsed: Duration },

    /// Polling was cancelled by the caller.
    #[error("polling of subset job {token} was cancelled")]
    Cancelled { token: String },

    /// Missing or invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The request could not be sent or the response could not be read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A downloaded archive could not be read.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn malformed(url: &str, reason: impl Into<String>) -> Self {
        Error::MalformedResponse {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// HTTP status code carried by an [`Error::Http`], if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Request(e) => e.status(),
            _ => None,
        }
    }
}

fn excerpt(body: &str) -> &str {
    if body.len() <= BODY_EXCERPT {
        return body;
    }
    let mut end = BODY_EXCERPT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

fn suffix(message: &Option<String>) -> String {
    match message.as_deref() {
        Some(m) if !m.is_empty() => format!(": {}", m),
        _ => String::new(),
    }
}
