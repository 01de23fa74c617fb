use std::path::Path;
use std::time::Duration;

use crate::config::{ClientConfig, Endpoints, load_config, load_config_file};
use crate::drive::Drive;
use crate::error::{Error, Result};
use crate::l2ss::L2ss;
use crate::mcc::Mcc;
use crate::nexus::Nexus;
use crate::oceancolor::OceanColor;
use crate::podaac::Podaac;
use crate::transport::Transport;

/// Entry point to every service.
///
/// A `Client` owns an immutable copy of its configuration and a pooled HTTP
/// client; it is cheap to clone and may be shared across threads.
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
    transport: Transport,
}

impl Client {
    /// Creates a client using environment variables and/or `podaac.ini`.
    pub fn from_env() -> Result<Self> {
        Self::new(load_config()?)
    }

    /// Creates a client from an explicit `podaac.ini`-style file.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::new(load_config_file(path)?)
    }

    pub fn new(config: ClientConfig) -> Result<Self> {
        for (name, url) in [
            ("podaac", &config.endpoints.podaac),
            ("l2ss", &config.endpoints.l2ss),
            ("mcc", &config.endpoints.mcc),
            ("oceancolor", &config.endpoints.oceancolor),
            ("drive", &config.endpoints.drive),
            ("nexus", &config.endpoints.nexus),
        ] {
            if reqwest::Url::parse(url).is_err() {
                return Err(Error::Config(format!("invalid {} base url ({})", name, url)));
            }
        }

        let transport = Transport::new(config.timeout, config.progress)?;
        Ok(Self { config, transport })
    }

    /// Creates a client whose services all live under the given base URLs.
    pub fn with_endpoints(endpoints: Endpoints) -> Result<Self> {
        Self::new(ClientConfig {
            endpoints,
            ..ClientConfig::default()
        })
    }

    pub fn with_timeout(self, timeout: Option<Duration>) -> Result<Self> {
        let mut config = self.config;
        config.timeout = timeout;
        Self::new(config)
    }

    pub fn with_progress(self, progress: bool) -> Result<Self> {
        let mut config = self.config;
        config.progress = progress;
        Self::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.config.endpoints
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    /// PO.DAAC metadata, search, image, extract and subset services.
    pub fn podaac(&self) -> Podaac<'_> {
        Podaac::new(self)
    }

    /// Level-2 subsetting service.
    pub fn l2ss(&self) -> L2ss<'_> {
        L2ss::new(self)
    }

    /// Metadata Compliance Checker.
    pub fn mcc(&self) -> Mcc<'_> {
        Mcc::new(self)
    }

    /// NASA Ocean Color file search.
    pub fn oceancolor(&self) -> OceanColor<'_> {
        OceanColor::new(self)
    }

    /// PO.DAAC Drive. Fails when no Drive credentials are configured.
    pub fn drive(&self) -> Result<Drive<'_>> {
        Drive::new(self)
    }

    /// NEXUS / OceanWorks analytics.
    pub fn nexus(&self) -> Nexus<'_> {
        Nexus::new(self)
    }
}
