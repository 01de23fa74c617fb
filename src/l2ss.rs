//! Level-2 Subsetting (L2SS) service: Solr-backed dataset/granule search,
//! preview images and the sibling subset-and-download job flow.

use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::client::Client;
use crate::decode;
use crate::download::{Fetcher, unpack};
use crate::error::{Error, Result};
use crate::job::{JobStatus, PollOptions, StatusReply, SubmitReply, poll};
use crate::query::Query;
use crate::transport::StatusPolicy;
use crate::util::urljoin;

/// Parameters of the L2SS dataset search. All fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct L2ssDatasetSearch {
    pub dataset_id: String,
    /// Sent as one `variable=` pair per entry.
    pub variables: Vec<String>,
    pub sensor: String,
    pub provider: String,
    pub start_time: String,
    pub end_time: String,
    pub start_index: String,
    pub items_per_page: String,
}

impl L2ssDatasetSearch {
    pub fn to_query(&self) -> Query {
        Query::new()
            .push("datasetId", &self.dataset_id)
            .push_all("variable", &self.variables)
            .push("sensor", &self.sensor)
            .push("provider", &self.provider)
            .push("startTime", &self.start_time)
            .push("endTime", &self.end_time)
            .push("startIndex", &self.start_index)
            .push("itemsPerPage", &self.items_per_page)
    }
}

/// Parameters of the L2SS granule search. `dataset_id` is required.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct L2ssGranuleSearch {
    pub dataset_id: String,
    pub bbox: String,
    pub start_time: String,
    pub end_time: String,
    pub start_index: String,
    pub items_per_page: String,
}

impl L2ssGranuleSearch {
    pub fn to_query(&self) -> Result<Query> {
        Ok(Query::new()
            .require("datasetId", &self.dataset_id)?
            .push("bbox", &self.bbox)
            .push("startTime", &self.start_time)
            .push("endTime", &self.end_time)
            .push("startIndex", &self.start_index)
            .push("itemsPerPage", &self.items_per_page))
    }
}

/// L2SS client. Obtained from [`Client::l2ss`].
#[derive(Debug, Clone, Copy)]
pub struct L2ss<'a> {
    client: &'a Client,
}

impl<'a> L2ss<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    fn url(&self, path: &str) -> String {
        urljoin(&self.client.endpoints().l2ss, path)
    }

    /// Solr dataset search; documents are under `response.docs`.
    pub fn dataset_search(&self, search: &L2ssDatasetSearch) -> Result<Value> {
        let url = search.to_query().with_query(&self.url("dataset/search"));
        self.client.transport().get_json(&url)
    }

    /// Image and data variables of a dataset (`imgVariables`, ...).
    pub fn dataset_variables(&self, dataset_id: &str) -> Result<Value> {
        let url = Query::new()
            .require("datasetId", dataset_id)?
            .with_query(&self.url("dataset/variable"));
        self.client.transport().get_json(&url)
    }

    /// Solr granule search; documents are under `response.docs`.
    pub fn granule_search(&self, search: &L2ssGranuleSearch) -> Result<Value> {
        let url = search.to_query()?.with_query(&self.url("granule/search"));
        self.client.transport().get_json(&url)
    }

    /// Downloads the preview image of one variable of a granule to
    /// `<dir>/<granule>_<variable>.png`.
    pub fn granule_preview(
        &self,
        dataset: &str,
        granule: &str,
        variable: &str,
        dir: Option<&Path>,
    ) -> Result<PathBuf> {
        for (name, value) in [("dataset", dataset), ("granule", granule), ("variable", variable)] {
            if value.trim().is_empty() {
                return Err(Error::InvalidArgument(format!("'{}' parameter is required", name)));
            }
        }
        let url = self.url(&format!("preview/{}/{}/{}.png", dataset, granule, variable));
        let name = format!("{}_{}.png", granule, variable);
        let fetched = Fetcher::new(self.client.transport()).fetch_as(
            &url,
            dir,
            &name,
            None,
            StatusPolicy::DenyList,
        )?;
        Ok(fetched.path)
    }

    /// Submits a subset job and returns its token.
    pub fn subset_submit(&self, query: &Value) -> Result<String> {
        let url = Query::new()
            .push("query", query.to_string())
            .with_query(&self.url("subset/submit"));
        let text = self.client.transport().get_text(&url)?;
        let reply: SubmitReply = decode::json(&url, &text)?;
        if reply.token.is_empty() {
            return Err(Error::malformed(&url, "empty token in submission reply"));
        }
        log::info!("submitted L2SS subset job {}", reply.token);
        Ok(reply.token)
    }

    pub fn subset_status(&self, token: &str) -> Result<JobStatus> {
        Ok(self.subset_status_reply(token)?.status)
    }

    pub fn subset_status_reply(&self, token: &str) -> Result<StatusReply> {
        let url = Query::new()
            .require("token", token)?
            .with_query(&self.url("subset/status"));
        self.client.transport().get_json(&url)
    }

    /// Submits a subset job, waits for it, downloads the first result into
    /// `dir` and extracts it. Returns the extracted file name.
    pub fn granule_download(
        &self,
        query: &Value,
        dir: Option<&Path>,
        options: &PollOptions,
    ) -> Result<String> {
        let token = self.subset_submit(query)?;
        let done = poll(&token, options, |t| self.subset_status_reply(t))?;
        let result_url = done.result_url().ok_or_else(|| {
            Error::malformed(
                &self.url("subset/status"),
                format!("job {} is done but lists no resultURLs", token),
            )
        })?;

        let fetched = Fetcher::new(self.client.transport()).fetch(result_url, dir)?;
        Ok(unpack(&fetched.path)?.file_name())
    }
}
