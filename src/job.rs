use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Lifecycle of a subset job, as reported by the status endpoint.
///
/// `Submitted → {Queued, Processing} → {Done, PartialError, Error, Unknown}`;
/// `Unknown` can also be reported straight away for a token the service never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Submitted,
    Queued,
    Processing,
    Done,
    PartialError,
    Error,
    Unknown,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Submitted => "submitted",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::PartialError => "partial error",
            JobStatus::Error => "error",
            JobStatus::Unknown => "unknown",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Done | JobStatus::PartialError | JobStatus::Error | JobStatus::Unknown
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "submitted" => JobStatus::Submitted,
            "queued" => JobStatus::Queued,
            "processing" | "running" => JobStatus::Processing,
            "done" => JobStatus::Done,
            "partial error" | "partial_error" => JobStatus::PartialError,
            "error" => JobStatus::Error,
            "unknown" => JobStatus::Unknown,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "unrecognised job status [{}]",
                    other
                )));
            }
        })
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Reply to a job submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitReply {
    pub token: String,
}

/// Reply from the status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusReply {
    pub status: JobStatus,
    #[serde(default, rename = "resultURLs")]
    pub result_urls: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusReply {
    /// The first result URL; later ones are ignored.
    pub fn result_url(&self) -> Option<&str> {
        self.result_urls.first().map(String::as_str)
    }
}

/// A flag another thread can trip to stop a poll loop.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tuning for [`poll`].
///
/// The default polls every second with no deadline, as the services expect.
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    /// Give up with [`Error::Timeout`] once this much time has passed.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelFlag>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: None,
            cancel: None,
        }
    }
}

impl PollOptions {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Polls `fetch` until the job identified by `token` reaches a terminal state.
///
/// Returns the `done` reply. `error`, `partial error` and `unknown` map to
/// [`Error::JobFailed`], [`Error::JobPartialFailure`] and [`Error::UnknownJob`].
pub fn poll<F>(token: &str, options: &PollOptions, mut fetch: F) -> Result<StatusReply>
where
    F: FnMut(&str) -> Result<StatusReply>,
{
    let started = Instant::now();
    let mut last_status: Option<JobStatus> = None;

    loop {
        if options.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
            return Err(Error::Cancelled {
                token: token.to_string(),
            });
        }
        if let Some(limit) = options.timeout {
            let elapsed = started.elapsed();
            if elapsed >= limit {
                return Err(Error::Timeout {
                    token: token.to_string(),
                    elapsed,
                });
            }
        }

        let reply = fetch(token)?;
        log::debug!("subset job {}: {}", token, reply.status);
        if last_status != Some(reply.status) {
            last_status = Some(reply.status);
            log::info!("subset job {} status: {}", token, reply.status);
        }

        match reply.status {
            JobStatus::Done => return Ok(reply),
            JobStatus::Error => {
                return Err(Error::JobFailed {
                    token: token.to_string(),
                    message: reply.message,
                });
            }
            JobStatus::PartialError => {
                return Err(Error::JobPartialFailure {
                    token: token.to_string(),
                    message: reply.message,
                });
            }
            JobStatus::Unknown => {
                return Err(Error::UnknownJob {
                    token: token.to_string(),
                });
            }
            JobStatus::Submitted | JobStatus::Queued | JobStatus::Processing => {
                thread::sleep(options.interval);
            }
        }
    }
}
