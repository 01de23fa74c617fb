//! Thin blocking clients for the PO.DAAC web services and their neighbours.
//!
//! One [`Client`] reaches every service:
//! - [`Client::podaac`]: dataset/granule metadata and search, image, extract and subset.
//! - [`Client::l2ss`]: Level-2 subsetting search, preview and subset jobs.
//! - [`Client::mcc`]: Metadata Compliance Checker.
//! - [`Client::oceancolor`]: NASA Ocean Color file search and download.
//! - [`Client::drive`]: PO.DAAC Drive (authenticated WebDAV downloads).
//! - [`Client::nexus`]: NEXUS / OceanWorks analytics.
//!
//! Every call performs its HTTP request(s) and returns the service body. The
//! statuses in [`DENIED_STATUS`] become [`Error::Http`]; other statuses are
//! passed through as bodies.
//!
//! ## Quick start
//! - Base URLs and Drive credentials come from environment variables
//!   (`PODAAC_URL`, `PODAAC_DRIVE_USERNAME`, ...) or a `podaac.ini` file in the
//!   current or home directory. Without either, the public endpoints are used.
//!
//! ```no_run
//! use anyhow::Result;
//! use podaac::{Client, DatasetSearch, PollOptions};
//! use serde_json::json;
//!
//! fn main() -> Result<()> {
//!     let client = Client::from_env()?;
//!
//!     let feed = client
//!         .podaac()
//!         .dataset_search(&DatasetSearch::dataset("PODAAC-ASOP2-25X01"))?;
//!     for entry in feed.entries()? {
//!         println!("{}", entry.title);
//!     }
//!
//!     let query = json!({
//!         "email": "user@example.com",
//!         "query": [{
//!             "compact": true,
//!             "datasetId": "PODAAC-ASOP2-25X01",
//!             "bbox": "-180,-90,180,90",
//!             "variables": ["wvc_index", "model_speed", "model_dir", "ice_prob", "ice_age", "wvc_quality_flag", "wind_speed", "wind_dir", "bs_distance", "lat", "lon", "time"],
//!             "granuleIds": ["ascat_20140520_005700_metopa_39344_eps_o_250_2300_ovw.l2.nc"]
//!         }]
//!     });
//!     let name = client
//!         .podaac()
//!         .subset_and_download(&query, None, &PollOptions::default())?;
//!     println!("subset written to {}", name);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod client;
mod config;
mod decode;
mod download;
mod drive;
mod error;
mod job;
mod l2ss;
mod mcc;
mod nexus;
mod oceancolor;
mod podaac;
mod query;
mod transport;
mod util;

pub use client::Client;
pub use config::{
    ClientConfig, DRIVE_URL, DriveCredentials, Endpoints, L2SS_URL, MCC_URL, NEXUS_URL,
    OCEANCOLOR_URL, PODAAC_URL,
};
pub use decode::{AtomEntry, AtomFeed, AtomLink, Feed, XmlDocument};
pub use download::{Unpacked, unpack};
pub use drive::{Drive, FTP_PREFIX};
pub use error::{Error, Result};
pub use job::{CancelFlag, JobStatus, PollOptions, StatusReply, SubmitReply, poll};
pub use l2ss::{L2ss, L2ssDatasetSearch, L2ssGranuleSearch};
pub use mcc::{ComplianceReport, LocalCheck, Mcc, ReportFormat, report_summary};
pub use nexus::{BoundingBox, Nexus};
pub use oceancolor::{FileSearch, OceanColor};
pub use podaac::{DatasetSearch, ExtractRequest, GranuleSearch, ImageRequest, Podaac};
pub use query::Query;
pub use transport::{DENIED_STATUS, StatusPolicy};
