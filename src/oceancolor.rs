use std::path::Path;

use crate::client::Client;
use crate::download::Fetcher;
use crate::error::Result;
use crate::query::{Query, require_one_of};

/// Parameters of the Ocean Color file search.
///
/// `sensor` is required, as is one of `search` or `sub_id`. Flags are sent as
/// `1`/`0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSearch {
    /// aquarius, seawifs, aqua, terra, meris, octs, czcs, hico or viirs.
    pub sensor: String,
    pub sdate: String,
    pub edate: String,
    /// L0, L1, L2, L3b, L3m, MET or misc.
    pub dtype: String,
    pub add_url: bool,
    pub results_as_file: bool,
    /// Text search pattern, e.g. `*DAY_CHL*`.
    pub search: String,
    pub sub_id: String,
    pub std_only: bool,
    pub cksum: bool,
    /// `json`, `txt` or `html`.
    pub format: String,
}

impl Default for FileSearch {
    fn default() -> Self {
        Self {
            sensor: String::new(),
            sdate: String::new(),
            edate: String::new(),
            dtype: String::new(),
            add_url: true,
            results_as_file: true,
            search: String::new(),
            sub_id: String::new(),
            std_only: true,
            cksum: false,
            format: "json".to_string(),
        }
    }
}

impl FileSearch {
    pub fn sensor(sensor: impl Into<String>) -> Self {
        Self {
            sensor: sensor.into(),
            ..Self::default()
        }
    }

    pub fn to_query(&self) -> Result<Query> {
        let flag = |b: bool| if b { "1" } else { "0" };
        let query = Query::new()
            .require("sensor", &self.sensor)?
            .push("sdate", &self.sdate)
            .push("edate", &self.edate)
            .push("dtype", &self.dtype)
            .push("addurl", flag(self.add_url))
            .push("results_as_file", flag(self.results_as_file));

        require_one_of(&["search", "sub_id"], &[self.search.as_str(), self.sub_id.as_str()])?;
        let query = if self.search.trim().is_empty() {
            query.push("subID", &self.sub_id)
        } else {
            query.push("search", &self.search)
        };

        Ok(query
            .push("std_only", flag(self.std_only))
            .push("cksum", if self.cksum { "1" } else { "" })
            .push("format", &self.format))
    }
}

/// NASA Ocean Color data distribution. Obtained from [`Client::oceancolor`].
#[derive(Debug, Clone, Copy)]
pub struct OceanColor<'a> {
    client: &'a Client,
}

impl<'a> OceanColor<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Searches publicly available files in the Ocean Data Processing System.
    ///
    /// The body is returned in the requested `format`; with `results_as_file`
    /// and `add_url` set, each line of a `txt` listing is a download URL.
    pub fn file_search(&self, search: &FileSearch) -> Result<String> {
        let url = search
            .to_query()?
            .with_query(&self.client.endpoints().oceancolor);
        self.client.transport().post_query(&url)
    }

    /// Downloads one file, e.g.
    /// `https://oceandata.sci.gsfc.nasa.gov/cgi/getfile/O1997001.L3b_DAY_CHL.nc`,
    /// into `dir` and returns its file name.
    pub fn get_file(&self, url: &str, dir: Option<&Path>) -> Result<String> {
        let fetched = Fetcher::new(self.client.transport()).fetch(url, dir)?;
        let name = fetched
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        log::info!("downloaded '{}' to '{}'", name, fetched.path.display());
        Ok(name)
    }
}
