use chrono::{DateTime, Utc};
use reqwest::blocking::multipart;
use serde_json::Value;
use std::fmt;
use std::path::Path;

use crate::client::Client;
use crate::decode;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::util::urljoin;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Longitude/latitude rectangle, rendered as `west,south,east,north`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self> {
        let valid_lat = |v: f64| (-90.0..=90.0).contains(&v);
        let valid_lon = |v: f64| (-180.0..=180.0).contains(&v);
        if !(valid_lon(west) && valid_lon(east) && valid_lat(south) && valid_lat(north)) {
            return Err(Error::InvalidArgument(format!(
                "bounding box {},{},{},{} is outside -180..180 / -90..90",
                west, south, east, north
            )));
        }
        if south > north {
            return Err(Error::InvalidArgument(format!(
                "bounding box south ({}) is above north ({})",
                south, north
            )));
        }
        Ok(Self {
            west,
            south,
            east,
            north,
        })
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// NEXUS / OceanWorks analytics client. Obtained from [`Client::nexus`].
#[derive(Debug, Clone, Copy)]
pub struct Nexus<'a> {
    client: &'a Client,
}

impl<'a> Nexus<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    fn url(&self, path: &str) -> String {
        urljoin(&self.client.endpoints().nexus, path)
    }

    fn get(&self, path: &str, query: Query) -> Result<Value> {
        let url = query.with_query(&self.url(path));
        self.client.transport().get_json(&url)
    }

    /// Datasets with their time coverage.
    pub fn dataset_list(&self) -> Result<Value> {
        self.get("list", Query::new())
    }

    /// Anomaly time series against the dataset climatology.
    pub fn daily_difference_average(
        &self,
        dataset: &str,
        bbox: &BoundingBox,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Value> {
        check_range(&start, &end)?;
        let query = Query::new()
            .require("dataset", dataset)?
            .push("b", bbox.to_string())
            .push("startTime", format_time(&start))
            .push("endTime", format_time(&end));
        self.get("dailydifferenceaverage_spark", query)
    }

    /// Area-averaged time series of one or two datasets.
    ///
    /// `spark = false` uses the `stats` algorithm instead of `timeSeriesSpark`.
    pub fn time_series<S: AsRef<str>>(
        &self,
        datasets: &[S],
        bbox: &BoundingBox,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        spark: bool,
    ) -> Result<Value> {
        if datasets.is_empty() || datasets.len() > 2 {
            return Err(Error::InvalidArgument(format!(
                "time series takes one or two datasets, got {}",
                datasets.len()
            )));
        }
        check_range(&start, &end)?;
        let ds = datasets
            .iter()
            .map(|d| d.as_ref())
            .collect::<Vec<_>>()
            .join(",");
        let query = Query::new()
            .require("ds", ds)?
            .push("b", bbox.to_string())
            .push("startTime", format_time(&start))
            .push("endTime", format_time(&end));
        self.get(if spark { "timeSeriesSpark" } else { "stats" }, query)
    }

    /// Point values within a bounding box or matching metadata criteria.
    ///
    /// `parameter` is one of `sst`, `sss` or `wind`; `metadata_filter` entries
    /// are `key:value` strings.
    pub fn subset<S: AsRef<str>>(
        &self,
        dataset: &str,
        bbox: Option<&BoundingBox>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        parameter: Option<&str>,
        metadata_filter: &[S],
    ) -> Result<Value> {
        if bbox.is_none() && metadata_filter.is_empty() {
            return Err(Error::InvalidArgument(
                "either 'bounding_box' or 'metadata_filter' parameter is required".to_string(),
            ));
        }
        check_range(&start, &end)?;
        let query = Query::new()
            .require("ds", dataset)?
            .push_opt("parameter", parameter)
            .push("startTime", format_time(&start))
            .push("endTime", format_time(&end))
            .push_opt("b", bbox)
            .push_all("metadataFilter", metadata_filter);
        self.get("datainbounds", query)
    }

    /// Runs a Python/PySpark snippet on the OceanWorks cluster.
    pub fn run_string(&self, code: &str) -> Result<Value> {
        if code.trim().is_empty() {
            return Err(Error::InvalidArgument("'code' parameter is required".to_string()));
        }
        let url = self.url("run_str");
        let text = self.client.transport().post_body(&url, code.to_string())?;
        decode::json(&url, &text)
    }

    /// Uploads a PySpark file whose `main(sc)` is run on the cluster.
    pub fn run_file(&self, path: &Path) -> Result<Value> {
        let form = multipart::Form::new().file("file", path)?;
        let url = self.url("run_file");
        let reply = self.client.transport().post_multipart(&url, form)?;
        serde_json::from_slice(&reply.body).map_err(|e| Error::malformed(&url, e.to_string()))
    }
}

fn check_range(start: &DateTime<Utc>, end: &DateTime<Utc>) -> Result<()> {
    if start > end {
        return Err(Error::InvalidArgument(format!(
            "start time {} is after end time {}",
            format_time(start),
            format_time(end)
        )));
    }
    Ok(())
}
