//! PO.DAAC web services: dataset and granule metadata, OpenSearch dataset and
//! granule search, WMS image rendering, granule extraction and the
//! asynchronous granule subset service.

use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::client::Client;
use crate::decode::{self, AtomEntry, AtomFeed, XmlDocument};
use crate::download::{Fetcher, check_file_name, unpack};
use crate::error::{Error, Result};
use crate::job::{JobStatus, PollOptions, StatusReply, SubmitReply, poll};
use crate::query::{Query, require_one_of};
use crate::transport::StatusPolicy;
use crate::util::{origin, urljoin};

/// Bounding box used to look up a dataset's preview image template.
const WHOLE_EARTH: &str = "-180,-90,180,90";

/// Largest page the dataset search service will return.
const CATALOG_PAGE: u32 = 400;

/// Parameters of the dataset search service.
///
/// Empty fields are not sent. Either `dataset_id` or `short_name` is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSearch {
    pub dataset_id: String,
    pub short_name: String,
    /// Free text, e.g. `modis`.
    pub keyword: String,
    /// `YYYY-MM-DDTHH:mm:ssZ`.
    pub start_time: String,
    pub end_time: String,
    /// `west,south,east,north`, e.g. `0.0,-45.0,180.0,40.0`.
    pub bbox: String,
    pub start_index: String,
    pub instrument: String,
    pub satellite: String,
    /// `HDF` or `NetCDF`.
    pub file_format: String,
    /// `OPEN`, `PREVIEW`, `SIMULATED` or `RETIRED`.
    pub status: String,
    /// `1B`, `2`, `2P`, `3` or `4`.
    pub process_level: String,
    /// `timeAsc`, `timeDesc`, `popularityAsc` or `popularityDesc`; relevance when empty.
    pub sort_by: String,
    /// 0 to 400.
    pub items_per_page: String,
    pub pretty: String,
    /// `atom` or `html`.
    pub format: String,
    /// `true` for complete PO.DAAC metadata per entry.
    pub full: String,
}

impl Default for DatasetSearch {
    fn default() -> Self {
        Self {
            dataset_id: String::new(),
            short_name: String::new(),
            keyword: String::new(),
            start_time: String::new(),
            end_time: String::new(),
            bbox: String::new(),
            start_index: String::new(),
            instrument: String::new(),
            satellite: String::new(),
            file_format: String::new(),
            status: String::new(),
            process_level: String::new(),
            sort_by: String::new(),
            items_per_page: "7".to_string(),
            pretty: "True".to_string(),
            format: "atom".to_string(),
            full: "False".to_string(),
        }
    }
}

impl DatasetSearch {
    pub fn dataset(dataset_id: &str) -> Self {
        Self {
            dataset_id: dataset_id.to_string(),
            ..Self::default()
        }
    }

    pub fn to_query(&self) -> Result<Query> {
        require_one_of(
            &["dataset_id", "short_name"],
            &[self.dataset_id.as_str(), self.short_name.as_str()],
        )?;
        Ok(Query::new()
            .push("datasetId", &self.dataset_id)
            .push("shortName", &self.short_name)
            .push("keyword", &self.keyword)
            .push("startTime", &self.start_time)
            .push("endTime", &self.end_time)
            .push("bbox", &self.bbox)
            .push("startIndex", &self.start_index)
            .push("instrument", &self.instrument)
            .push("satellite", &self.satellite)
            .push("fileFormat", &self.file_format)
            .push("status", &self.status)
            .push("processLevel", &self.process_level)
            .push("sortBy", &self.sort_by)
            .push("itemsPerPage", &self.items_per_page)
            .push("pretty", &self.pretty)
            .push("format", &self.format)
            .push("full", &self.full))
    }
}

/// Parameters of the granule search service. `dataset_id` is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GranuleSearch {
    pub dataset_id: String,
    pub short_name: String,
    pub start_time: String,
    pub end_time: String,
    /// `west,south,east,north`. Level-2 spatial search uses footprint polygons.
    pub bbox: String,
    pub start_index: String,
    /// `timeAsc` or `timeDesc`.
    pub sort_by: String,
    /// 0 to 400.
    pub items_per_page: String,
    /// `atom` or `html`.
    pub format: String,
    pub pretty: String,
}

impl Default for GranuleSearch {
    fn default() -> Self {
        Self {
            dataset_id: String::new(),
            short_name: String::new(),
            start_time: String::new(),
            end_time: String::new(),
            bbox: String::new(),
            start_index: String::new(),
            sort_by: "timeAsc".to_string(),
            items_per_page: "7".to_string(),
            format: "atom".to_string(),
            pretty: "True".to_string(),
        }
    }
}

impl GranuleSearch {
    pub fn dataset(dataset_id: &str) -> Self {
        Self {
            dataset_id: dataset_id.to_string(),
            ..Self::default()
        }
    }

    pub fn to_query(&self) -> Result<Query> {
        Ok(Query::new()
            .require("datasetId", &self.dataset_id)?
            .push("shortName", &self.short_name)
            .push("startTime", &self.start_time)
            .push("endTime", &self.end_time)
            .push("bbox", &self.bbox)
            .push("startIndex", &self.start_index)
            .push("sortBy", &self.sort_by)
            .push("itemsPerPage", &self.items_per_page)
            .push("format", &self.format)
            .push("pretty", &self.pretty))
    }
}

/// A WMS request against the image service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub dataset_id: String,
    pub short_name: String,
    /// Restricts the image to a single granule.
    pub granule_name: String,
    /// `GetCapabilities`, `GetMap` or `GetLegendGraphic`.
    pub request: String,
    pub bbox: String,
    pub height: String,
    pub width: String,
    pub style: String,
    /// Only `EPSG:4326` is supported by the service.
    pub srs: String,
    pub service: String,
    pub version: String,
    pub format: String,
    pub layers: String,
}

impl Default for ImageRequest {
    fn default() -> Self {
        Self {
            dataset_id: String::new(),
            short_name: String::new(),
            granule_name: String::new(),
            request: "GetMap".to_string(),
            bbox: String::new(),
            height: String::new(),
            width: String::new(),
            style: String::new(),
            srs: String::new(),
            service: "WMS".to_string(),
            version: "1.3.0".to_string(),
            format: "image/png".to_string(),
            layers: String::new(),
        }
    }
}

impl ImageRequest {
    pub fn to_query(&self) -> Result<Query> {
        require_one_of(
            &["dataset_id", "short_name"],
            &[self.dataset_id.as_str(), self.short_name.as_str()],
        )?;
        Ok(Query::new()
            .push("datasetId", &self.dataset_id)
            .push("shortName", &self.short_name)
            .push("granuleName", &self.granule_name)
            .push("request", &self.request)
            .push("bbox", &self.bbox)
            .push("height", &self.height)
            .push("width", &self.width)
            .push("style", &self.style)
            .push("srs", &self.srs)
            .push("service", &self.service)
            .push("version", &self.version)
            .push("format", &self.format)
            .push("layers", &self.layers))
    }
}

/// A request against the granule extraction service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractRequest {
    pub dataset_id: String,
    pub short_name: String,
    pub granule_name: String,
    pub bbox: String,
    /// `netcdf` or `hdf`.
    pub format: String,
}

impl ExtractRequest {
    pub fn to_query(&self) -> Result<Query> {
        require_one_of(
            &["dataset_id", "short_name"],
            &[self.dataset_id.as_str(), self.short_name.as_str()],
        )?;
        Ok(Query::new()
            .push("datasetId", &self.dataset_id)
            .push("shortName", &self.short_name)
            .require("granuleName", &self.granule_name)?
            .push("bbox", &self.bbox)
            .push("format", &self.format))
    }
}

#[derive(Debug, Deserialize)]
struct Level2Datasets {
    datasets: Vec<Level2Dataset>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Level2Dataset {
    persistent_id: String,
    short_name: String,
}

/// PO.DAAC web services client. Obtained from [`Client::podaac`].
#[derive(Debug, Clone, Copy)]
pub struct Podaac<'a> {
    client: &'a Client,
}

impl<'a> Podaac<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    fn url(&self, path: &str) -> String {
        urljoin(&self.client.endpoints().podaac, path)
    }

    /// Dataset metadata in `iso` (default when `format` is empty) or `gcmd` format.
    pub fn dataset_metadata(
        &self,
        dataset_id: &str,
        short_name: &str,
        format: &str,
    ) -> Result<XmlDocument> {
        let url = Query::new()
            .require("datasetId", dataset_id)?
            .push("shortName", short_name)
            .push("format", or_default(format, "iso"))
            .with_query(&self.url("metadata/dataset/"));
        let body = self.client.transport().get_text(&url)?;
        Ok(XmlDocument::new(&url, body))
    }

    /// Searches the dataset catalog over Level 2, 3 and 4 datasets.
    pub fn dataset_search(&self, search: &DatasetSearch) -> Result<AtomFeed> {
        let url = search.to_query()?.with_query(&self.url("search/dataset/"));
        let body = self.client.transport().get_text(&url)?;
        Ok(AtomFeed::new(&url, body))
    }

    /// The `variables` list of a dataset.
    pub fn dataset_variables(&self, dataset_id: &str) -> Result<Vec<Value>> {
        let url = Query::new()
            .require("datasetId", dataset_id)?
            .with_query(&self.url("dataset/variables/"));
        let reply: Value = self.client.transport().get_json(&url)?;
        match decode::field(&url, &reply, "variables")? {
            Value::Array(items) => Ok(items.clone()),
            other => Err(Error::malformed(
                &url,
                format!("'variables' is not a list: {}", other),
            )),
        }
    }

    /// Metadata of a single granule, ISO-19115 by default.
    pub fn granule_metadata(
        &self,
        dataset_id: &str,
        short_name: &str,
        granule_name: &str,
        format: &str,
    ) -> Result<XmlDocument> {
        let url = Query::new()
            .require("datasetId", dataset_id)?
            .push("shortName", short_name)
            .push("granuleName", granule_name)
            .push("format", or_default(format, "iso"))
            .with_query(&self.url("metadata/granule/"));
        let body = self.client.transport().get_text(&url)?;
        Ok(XmlDocument::new(&url, body))
    }

    /// Datacasting metadata of the granules archived in the last 24 hours.
    pub fn last24hours_datacasting_granule_md(
        &self,
        dataset_id: &str,
        short_name: &str,
        items_per_page: u32,
    ) -> Result<XmlDocument> {
        let url = Query::new()
            .require("datasetId", dataset_id)?
            .push("shortName", short_name)
            .push("itemsPerPage", items_per_page.to_string())
            .push("format", "datacasting")
            .with_query(&self.url("metadata/granule/"));
        let body = self.client.transport().get_text(&url)?;
        Ok(XmlDocument::new(&url, body))
    }

    /// Searches the granules of a Level 2 swath or Level 3/4 gridded dataset.
    pub fn granule_search(&self, search: &GranuleSearch) -> Result<AtomFeed> {
        let url = search.to_query()?.with_query(&self.url("search/granule/"));
        let body = self.client.transport().get_text(&url)?;
        Ok(AtomFeed::new(&url, body))
    }

    /// Downloads the preview image of `image_variable` for a dataset to
    /// `<dir>/<dataset_id>.png`.
    ///
    /// The image URL template is taken from the `Preview Image` link of the
    /// dataset's granule search results.
    pub fn granule_preview(
        &self,
        dataset_id: &str,
        image_variable: &str,
        dir: Option<&Path>,
    ) -> Result<PathBuf> {
        if dataset_id.trim().is_empty() {
            return Err(Error::InvalidArgument("'dataset_id' parameter is required".into()));
        }
        let feed = self.granule_search(&GranuleSearch {
            bbox: WHOLE_EARTH.to_string(),
            ..GranuleSearch::dataset(dataset_id)
        })?;
        let template = feed
            .entries()?
            .iter()
            .find_map(|e| e.link_titled("Preview Image").map(|l| l.href.clone()))
            .ok_or_else(|| {
                Error::malformed(feed.url(), "preview image not available for this dataset")
            })?;

        let url = format!("{}/{}.png", template.trim_end_matches('/'), image_variable);
        let name = format!("{}.png", dataset_id);
        let fetched = Fetcher::new(self.client.transport()).fetch_as(
            &url,
            dir,
            &name,
            None,
            StatusPolicy::DenyList,
        )?;
        Ok(fetched.path)
    }

    /// Renders granules to an image through the WMS image service and saves it
    /// as `<dir>/<dataset_id or short_name>.png`.
    pub fn image_granule(&self, request: &ImageRequest, dir: Option<&Path>) -> Result<PathBuf> {
        let url = request.to_query()?.with_query(&self.url("image/granule/"));
        let stem = or_default(&request.dataset_id, &request.short_name);
        self.fetch_checked(&url, dir, &format!("{}.png", stem), || {
            format!("service type image not available for this dataset: {}", stem)
        })
    }

    /// Subsets a granule server-side and saves the result as `<dir>/<granule_name>`.
    pub fn extract_granule(&self, request: &ExtractRequest, dir: Option<&Path>) -> Result<PathBuf> {
        let url = request.to_query()?.with_query(&self.url("extract/granule/"));
        self.fetch_checked(&url, dir, &request.granule_name, || {
            "unexpected error reported by the extract service".to_string()
        })
    }

    /// Downloads the first granule of a Level 4 dataset from OPeNDAP.
    ///
    /// Returns the granule name.
    pub fn extract_l4_granule(&self, dataset_id: &str, dir: Option<&Path>) -> Result<String> {
        let feed = self.granule_search(&GranuleSearch {
            start_index: "1".to_string(),
            ..GranuleSearch::dataset(dataset_id)
        })?;
        let entries = feed.entries()?;
        let entry = entries
            .first()
            .ok_or_else(|| Error::malformed(feed.url(), "granule search returned no entries"))?;
        let link = entry
            .link_titled("OPeNDAP URL")
            .ok_or_else(|| Error::malformed(feed.url(), "granule has no OPeNDAP link"))?;
        let url = link.href.strip_suffix(".html").unwrap_or(&link.href);

        let granule_name = entry.title.trim().to_string();
        if granule_name.is_empty() {
            return Err(Error::malformed(feed.url(), "granule entry has no title"));
        }
        if check_file_name(&granule_name).is_err() {
            return Err(Error::malformed(
                feed.url(),
                format!("granule title '{}' is not a plain file name", granule_name),
            ));
        }
        self.fetch_checked(url, dir, &granule_name, || {
            "unexpected error reported by the OPeNDAP server".to_string()
        })?;
        Ok(granule_name)
    }

    /// Submits a subset job and returns its token.
    ///
    /// `query` is the subset request document, e.g.
    /// `{"email": "", "query": [{"datasetId": "...", "granuleIds": ["..."], "bbox": "...", "variables": [...], "compact": true}]}`.
    pub fn granule_subset(&self, query: &Value) -> Result<String> {
        let url = self.url("subset/granule?request=submit");
        let form = Query::new().push("query", query.to_string()).encode();
        let text = self.client.transport().post_form(&url, &form)?;
        let reply: SubmitReply = decode::json(&url, &text)?;
        if reply.token.is_empty() {
            return Err(Error::malformed(&url, "empty token in submission reply"));
        }
        log::info!("submitted subset job {}", reply.token);
        Ok(reply.token)
    }

    /// Reads a subset request document from a JSON file and submits it.
    pub fn granule_subset_from_file(&self, path: &Path) -> Result<String> {
        let query = read_query_file(path)?;
        self.granule_subset(&query)
    }

    /// Current status of a subset job. Tokens the service never issued report
    /// [`JobStatus::Unknown`].
    pub fn subset_status(&self, token: &str) -> Result<JobStatus> {
        Ok(self.subset_status_reply(token)?.status)
    }

    /// Full status reply of a subset job, including result URLs once `done`.
    pub fn subset_status_reply(&self, token: &str) -> Result<StatusReply> {
        let url = Query::new()
            .require("token", token)?
            .with_query(&self.url("subset/status"));
        self.client.transport().get_json(&url)
    }

    /// Submits a subset job, waits for it to finish, downloads the first result
    /// into `dir` and extracts it.
    ///
    /// Returns the name of the extracted file.
    pub fn subset_and_download(
        &self,
        query: &Value,
        dir: Option<&Path>,
        options: &PollOptions,
    ) -> Result<String> {
        let token = self.granule_subset(query)?;
        let done = poll(&token, options, |t| self.subset_status_reply(t))?;
        let result_url = done.result_url().ok_or_else(|| {
            Error::malformed(
                &self.url("subset/status"),
                format!("job {} is done but lists no resultURLs", token),
            )
        })?;

        log::info!("subset job {} done, downloading {}", token, result_url);
        let fetched = Fetcher::new(self.client.transport()).fetch(result_url, dir)?;
        Ok(unpack(&fetched.path)?.file_name())
    }

    /// Persistent IDs of the Level 2 datasets available to granule search.
    pub fn list_level2_dataset_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .level2_datasets()?
            .into_iter()
            .map(|d| d.persistent_id)
            .collect())
    }

    /// Short names of the Level 2 datasets available to granule search.
    pub fn list_level2_dataset_short_names(&self) -> Result<Vec<String>> {
        Ok(self
            .level2_datasets()?
            .into_iter()
            .map(|d| d.short_name)
            .collect())
    }

    /// Dataset IDs available to granule search, excluding the Level 2 ones.
    pub fn list_granule_search_dataset_ids(&self) -> Result<Vec<String>> {
        let level2: HashSet<String> = self.list_level2_dataset_ids()?.into_iter().collect();
        self.catalog(|e| e.dataset_id.clone(), &level2)
    }

    /// Dataset short names available to granule search, excluding the Level 2 ones.
    pub fn list_granule_search_dataset_short_names(&self) -> Result<Vec<String>> {
        let level2: HashSet<String> = self
            .list_level2_dataset_short_names()?
            .into_iter()
            .collect();
        self.catalog(|e| e.short_name.clone(), &level2)
    }

    /// Dataset IDs offered by the granule extraction service.
    pub fn list_extract_granule_dataset_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .extract_datasets()?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// Dataset short names offered by the granule extraction service.
    pub fn list_extract_granule_dataset_short_names(&self) -> Result<Vec<String>> {
        Ok(self
            .extract_datasets()?
            .into_iter()
            .map(|(_, short_name)| short_name)
            .collect())
    }

    fn extract_datasets(&self) -> Result<Vec<(String, String)>> {
        let url = self.url("extract/granule/index.html");
        let html = self.client.transport().get_text(&url)?;
        dataset_table(&url, &html)
    }

    fn level2_datasets(&self) -> Result<Vec<Level2Dataset>> {
        let root = origin(&self.client.endpoints().podaac).ok_or_else(|| {
            Error::Config(format!(
                "invalid podaac base url ({})",
                self.client.endpoints().podaac
            ))
        })?;
        let url = format!("{}/l2ssIngest/datasets", root);
        let reply: Level2Datasets = self.client.transport().get_json(&url)?;
        Ok(reply.datasets)
    }

    /// Walks the first two pages of the dataset catalog.
    fn catalog<F>(&self, pick: F, exclude: &HashSet<String>) -> Result<Vec<String>>
    where
        F: Fn(&AtomEntry) -> Option<String>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for start_index in [None, Some(CATALOG_PAGE)] {
            let url = Query::new()
                .push_opt("startIndex", start_index)
                .push("itemsPerPage", CATALOG_PAGE.to_string())
                .push("format", "atom")
                .with_query(&self.url("search/dataset/"));
            let feed = AtomFeed::new(&url, self.client.transport().get_text(&url)?);
            for entry in feed.entries()? {
                if let Some(v) = pick(&entry) {
                    if !exclude.contains(&v) && seen.insert(v.clone()) {
                        out.push(v);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Downloads `url` to `dir/name`; a `text/plain` reply is the service's way
    /// of reporting failure, so the file is removed and an error returned.
    fn fetch_checked<F>(&self, url: &str, dir: Option<&Path>, name: &str, reason: F) -> Result<PathBuf>
    where
        F: FnOnce() -> String,
    {
        check_file_name(name)?;
        let fetched = Fetcher::new(self.client.transport()).fetch_as(
            url,
            dir,
            name,
            None,
            StatusPolicy::DenyList,
        )?;
        let plain = fetched
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("text/plain"));
        if plain {
            let detail = std::fs::read_to_string(&fetched.path).unwrap_or_default();
            std::fs::remove_file(&fetched.path)?;
            let reason = reason();
            return Err(Error::malformed(
                url,
                if detail.trim().is_empty() {
                    reason
                } else {
                    format!("{}: {}", reason, detail.trim())
                },
            ));
        }
        Ok(fetched.path)
    }
}

/// Reads `(id, short name)` pairs from the `tblDataset` table of the
/// extraction service's index page. The first row is the header.
fn dataset_table(url: &str, html: &str) -> Result<Vec<(String, String)>> {
    let selector =
        |css: &str| Selector::parse(css).map_err(|e| Error::malformed(url, e.to_string()));
    let table_sel = selector("table#tblDataset")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("td")?;

    let doc = Html::parse_document(html);
    let table = doc
        .select(&table_sel)
        .next()
        .ok_or_else(|| Error::malformed(url, "no tblDataset table in page"))?;

    let mut out = Vec::new();
    for row in table.select(&row_sel).skip(1) {
        let cells: Vec<String> = row
            .select(&cell_sel)
            .map(|td| td.text().collect::<String>().trim().to_string())
            .collect();
        match cells.as_slice() {
            [] => continue,
            [id, short_name, ..] => out.push((id.clone(), short_name.clone())),
            [_] => {
                return Err(Error::malformed(
                    url,
                    "tblDataset row has fewer than two cells",
                ));
            }
        }
    }
    Ok(out)
}

fn or_default<'s>(value: &'s str, default: &'s str) -> &'s str {
    if value.trim().is_empty() { default } else { value }
}

pub(crate) fn read_query_file(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| {
        Error::InvalidArgument(format!(
            "{} is not a valid JSON subset request: {}",
            path.display(),
            e
        ))
    })
}
