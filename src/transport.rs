use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response, multipart};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use crate::config::DriveCredentials;
use crate::decode;
use crate::error::{Error, Result};

/// Status codes the services use to report a failed request.
///
/// Anything else, including other 4xx/5xx codes, is handed back to the caller
/// as a successful body.
pub const DENIED_STATUS: [u16; 4] = [400, 404, 408, 503];

/// How a response status is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusPolicy {
    /// Fail only on [`DENIED_STATUS`].
    #[default]
    DenyList,
    /// Fail on anything outside 2xx.
    RequireSuccess,
}

impl StatusPolicy {
    pub fn is_denied(self, status: StatusCode) -> bool {
        match self {
            StatusPolicy::DenyList => DENIED_STATUS.contains(&status.as_u16()),
            StatusPolicy::RequireSuccess => !status.is_success(),
        }
    }
}

/// Headers and body of a fully read response.
#[derive(Debug)]
pub(crate) struct Reply {
    pub(crate) content_type: Option<String>,
    pub(crate) body: Vec<u8>,
}

/// Blocking HTTP transport shared by every service client.
///
/// Each method performs exactly one request.
#[derive(Debug, Clone)]
pub struct Transport {
    http: HttpClient,
    timeout: Option<Duration>,
    progress: bool,
}

impl Transport {
    pub fn new(timeout: Option<Duration>, progress: bool) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("podaac-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("podaac-rs")),
        );

        // API calls get a per-request timeout; downloads and uploads are unbounded.
        let http = HttpClient::builder()
            .default_headers(default_headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()?;

        Ok(Self {
            http,
            timeout,
            progress,
        })
    }

    #[cfg(test)]
    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[cfg(test)]
    pub(crate) fn progress(&self) -> bool {
        self.progress
    }

    pub(crate) fn get_text(&self, url: &str) -> Result<String> {
        let req = self.api(self.http.get(url));
        let reply = self.send(req, url, StatusPolicy::DenyList)?;
        Ok(into_text(reply.body))
    }

    pub(crate) fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let text = self.get_text(url)?;
        decode::json(url, &text)
    }

    pub(crate) fn get_bytes(&self, url: &str) -> Result<Reply> {
        let req = self.api(self.http.get(url));
        self.send(req, url, StatusPolicy::DenyList)
    }

    /// POST with parameters carried in the URL and an empty body.
    pub(crate) fn post_query(&self, url: &str) -> Result<String> {
        let req = self.api(self.http.post(url));
        let reply = self.send(req, url, StatusPolicy::DenyList)?;
        Ok(into_text(reply.body))
    }

    /// POST an `application/x-www-form-urlencoded` body.
    pub(crate) fn post_form(&self, url: &str, form: &str) -> Result<String> {
        let req = self
            .api(self.http.post(url))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("Accept", "*")
            .body(form.to_string());
        let reply = self.send(req, url, StatusPolicy::DenyList)?;
        Ok(into_text(reply.body))
    }

    pub(crate) fn post_body(&self, url: &str, body: String) -> Result<String> {
        let req = self
            .api(self.http.post(url))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        let reply = self.send(req, url, StatusPolicy::DenyList)?;
        Ok(into_text(reply.body))
    }

    pub(crate) fn post_multipart(&self, url: &str, form: multipart::Form) -> Result<Reply> {
        let req = self.http.post(url).multipart(form);
        self.send(req, url, StatusPolicy::DenyList)
    }

    /// Streams the body of `url` into `target`, chunk by chunk.
    ///
    /// Returns the response content type.
    pub(crate) fn download_to(
        &self,
        url: &str,
        target: &Path,
        auth: Option<&DriveCredentials>,
        policy: StatusPolicy,
    ) -> Result<Option<String>> {
        let mut req = self.http.get(url);
        if let Some(creds) = auth {
            req = req.basic_auth(&creds.username, Some(&creds.password));
        }

        log::debug!("GET {} -> {}", url, target.display());
        let mut resp = req.send()?;
        let status = resp.status();
        if policy.is_denied(status) {
            let body = resp.text().unwrap_or_default();
            return Err(Error::Http {
                status,
                url: url.to_string(),
                body,
            });
        }
        let content_type = content_type(&resp);

        let pb = self.progress.then(|| {
            let pb = ProgressBar::new(resp.content_length().unwrap_or(0));
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        });

        let mut out = File::create(target)?;
        let copied = (|| -> Result<u64> {
            let mut buf = [0u8; 64 * 1024];
            let mut written: u64 = 0;
            loop {
                let n = resp.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n])?;
                written += n as u64;
                if let Some(pb) = &pb {
                    pb.inc(n as u64);
                }
            }
            out.flush()?;
            Ok(written)
        })();
        let written = match copied {
            Ok(written) => written,
            Err(e) => {
                drop(out);
                if let Some(pb) = &pb {
                    pb.abandon();
                }
                // Never leave a truncated file behind.
                let _ = std::fs::remove_file(target);
                return Err(e);
            }
        };

        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }
        log::info!("downloaded {} byte(s) to {}", written, target.display());
        Ok(content_type)
    }

    fn api(&self, req: RequestBuilder) -> RequestBuilder {
        match self.timeout {
            Some(t) => req.timeout(t),
            None => req,
        }
    }

    fn send(&self, req: RequestBuilder, url: &str, policy: StatusPolicy) -> Result<Reply> {
        log::debug!("{}", url);
        let resp = req.send()?;
        read_reply(resp, url, policy)
    }
}

fn read_reply(resp: Response, url: &str, policy: StatusPolicy) -> Result<Reply> {
    let status = resp.status();
    let content_type = content_type(&resp);
    let body = resp.bytes()?.to_vec();

    if policy.is_denied(status) {
        log::debug!("HTTP {} for {}", status, url);
        return Err(Error::Http {
            status,
            url: url.to_string(),
            body: into_text(body),
        });
    }
    if !status.is_success() {
        log::warn!("HTTP {} for {} passed through as a response body", status, url);
    }

    Ok(Reply { content_type, body })
}

fn content_type(resp: &Response) -> Option<String> {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

pub(crate) fn into_text(body: Vec<u8>) -> String {
    match String::from_utf8(body) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(&e.into_bytes()).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_list_matches_only_the_four_codes() {
        for code in [400u16, 404, 408, 503] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(StatusPolicy::DenyList.is_denied(status), "{}", code);
        }
        for code in [200u16, 201, 204, 301, 401, 403, 500, 502] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(!StatusPolicy::DenyList.is_denied(status), "{}", code);
        }
    }

    #[test]
    fn require_success_rejects_non_2xx() {
        assert!(!StatusPolicy::RequireSuccess.is_denied(StatusCode::OK));
        assert!(StatusPolicy::RequireSuccess.is_denied(StatusCode::UNAUTHORIZED));
        assert!(StatusPolicy::RequireSuccess.is_denied(StatusCode::FOUND));
    }

    #[test]
    fn invalid_utf8_is_converted_lossily() {
        assert_eq!(into_text(vec![b'o', b'k', 0xff]), "ok\u{fffd}");
    }
}
