use reqwest::blocking::multipart;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::client::Client;
use crate::decode;
use crate::error::{Error, Result};
use crate::query::Query;

/// Output format of a compliance report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Json,
    Html,
    Pdf,
}

impl ReportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Html => "html",
            ReportFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "json" => Ok(ReportFormat::Json),
            "html" => Ok(ReportFormat::Html),
            "pdf" => Ok(ReportFormat::Pdf),
            other => Err(Error::InvalidArgument(format!(
                "response must be 'json', 'html' or 'pdf', got '{}'",
                other
            ))),
        }
    }
}

/// Body of a compliance check.
#[derive(Debug, Clone)]
pub struct ComplianceReport {
    pub url: String,
    pub format: ReportFormat,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ComplianceReport {
    /// Decodes a `json` report.
    pub fn json(&self) -> Result<Value> {
        if self.format != ReportFormat::Json {
            return Err(Error::InvalidArgument(format!(
                "report was requested as {}, not json",
                self.format
            )));
        }
        serde_json::from_slice(&self.body).map_err(|e| Error::malformed(&self.url, e.to_string()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A local file to upload for checking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCheck {
    /// netCDF file, at most 5 GB.
    pub file: PathBuf,
    /// `1.1` or `1.3`.
    pub acdd_version: String,
    /// `L2P`, `L3` or `L4`.
    pub gds2_parameters: String,
    pub response: ReportFormat,
}

/// Metadata Compliance Checker client. Obtained from [`Client::mcc`].
#[derive(Debug, Clone, Copy)]
pub struct Mcc<'a> {
    client: &'a Client,
}

impl<'a> Mcc<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Checks a remote netCDF file (e.g. an OPeNDAP URL).
    ///
    /// `checkers` is a comma-separated list such as `CF`, `ACDD-1.3` or
    /// `GDS2,GDS2-parameters:L4`.
    pub fn check_remote_file(
        &self,
        checkers: &str,
        url_upload: &str,
        response: ReportFormat,
    ) -> Result<ComplianceReport> {
        let url = Query::new()
            .require("checkers", checkers)?
            .require("url-upload", url_upload)?
            .push("response", response.as_str())
            .with_query(&self.client.endpoints().mcc);
        let reply = self.client.transport().get_bytes(&url)?;
        Ok(ComplianceReport {
            url,
            format: response,
            content_type: reply.content_type,
            body: reply.body,
        })
    }

    /// Uploads a local netCDF file and checks it against ACDD, CF and GDS2.
    ///
    /// A missing file is reported as [`Error::Io`] before anything is sent.
    pub fn check_local_file(&self, check: &LocalCheck) -> Result<ComplianceReport> {
        for (name, value) in [
            ("acdd_version", &check.acdd_version),
            ("gds2_parameters", &check.gds2_parameters),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidArgument(format!("'{}' parameter is required", name)));
            }
        }

        let form = multipart::Form::new()
            .file("file-upload", &check.file)?
            .text("CF", "on")
            .text("ACDD", "on")
            .text("ACDD-version", check.acdd_version.clone())
            .text("GDS2", "on")
            .text("GDS2-parameters", check.gds2_parameters.clone())
            .text("response", check.response.as_str());

        let url = self.client.endpoints().mcc.clone();
        log::debug!("uploading {} to {}", check.file.display(), url);
        let reply = self.client.transport().post_multipart(&url, form)?;
        Ok(ComplianceReport {
            url,
            format: check.response,
            content_type: reply.content_type,
            body: reply.body,
        })
    }
}

/// Decodes the `json` report of either check, checking the keys every report carries.
pub fn report_summary(report: &ComplianceReport) -> Result<(String, String)> {
    let value = report.json()?;
    let model = decode::field(&report.url, &value, "model")?;
    let file = decode::field(&report.url, &value, "fn")?;
    Ok((
        model.as_str().unwrap_or_default().to_string(),
        file.as_str().unwrap_or_default().to_string(),
    ))
}
