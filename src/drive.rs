//! PO.DAAC Drive: authenticated WebDAV access to granule files.

use std::path::{Path, PathBuf};

use crate::client::Client;
use crate::config::DriveCredentials;
use crate::decode::AtomFeed;
use crate::download::{Fetcher, Unpacked, unpack};
use crate::error::{Error, Result};
use crate::transport::StatusPolicy;

/// FTP host whose paths mirror the Drive WebDAV tree.
pub const FTP_PREFIX: &str = "ftp://podaac-ftp.jpl.nasa.gov";

/// Drive client. Obtained from [`Client::drive`].
#[derive(Debug, Clone, Copy)]
pub struct Drive<'a> {
    client: &'a Client,
    credentials: &'a DriveCredentials,
}

impl<'a> Drive<'a> {
    pub(crate) fn new(client: &'a Client) -> Result<Self> {
        let credentials = client.config().drive.as_ref().ok_or_else(|| {
            Error::Config(
                "PO.DAAC Drive needs urs_username and urs_password \
                 (set PODAAC_DRIVE_USERNAME/PODAAC_DRIVE_PASSWORD or the [drive] section)"
                    .to_string(),
            )
        })?;
        Ok(Self {
            client,
            credentials,
        })
    }

    pub fn webdav_url(&self) -> &str {
        self.client.endpoints().drive.trim_end_matches('/')
    }

    /// Rewrites every FTP link of a granule search feed to its Drive URL.
    pub fn mine_drive_urls_from_granule_search(&self, feed: &AtomFeed) -> Result<Vec<String>> {
        drive_urls(feed, self.webdav_url())
    }

    /// Downloads each Drive URL below `dir`, keeping the directory layout under
    /// the WebDAV root. `.gz` files are decompressed and the archive removed.
    ///
    /// Returns the local path of every granule, in input order.
    pub fn download_granules<S: AsRef<str>>(
        &self,
        urls: &[S],
        dir: Option<&Path>,
    ) -> Result<Vec<PathBuf>> {
        let fetcher = Fetcher::new(self.client.transport());
        let root = match dir {
            Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
            _ => std::env::current_dir()?,
        };

        let mut paths = Vec::with_capacity(urls.len());
        for url in urls {
            let url = url.as_ref();
            let (parent, name) = relative_location(url, self.webdav_url())?;
            let target_dir = root.join(parent);

            let fetched = fetcher
                .fetch_as(
                    url,
                    Some(target_dir.as_path()),
                    &name,
                    Some(self.credentials),
                    StatusPolicy::RequireSuccess,
                )
                .inspect_err(|e| {
                    if let Error::Http { status, .. } = e {
                        log::error!(
                            "granule {} not downloaded (HTTP {}); check the Drive credentials",
                            url,
                            status
                        );
                    }
                })?;

            let local = if name.to_ascii_lowercase().ends_with(".gz") {
                match unpack(&fetched.path)? {
                    Unpacked::Decompressed { path } => path,
                    other => other.path().to_path_buf(),
                }
            } else {
                fetched.path
            };
            paths.push(local);
        }
        Ok(paths)
    }
}

/// Every link in `feed` pointing at [`FTP_PREFIX`], rewritten onto `webdav_url`.
pub(crate) fn drive_urls(feed: &AtomFeed, webdav_url: &str) -> Result<Vec<String>> {
    let webdav_url = webdav_url.trim_end_matches('/');
    Ok(feed
        .entries()?
        .iter()
        .flat_map(|entry| entry.links.iter())
        .filter(|link| link.href.contains(&format!("{}/", FTP_PREFIX)))
        .map(|link| link.href.replacen(FTP_PREFIX, webdav_url, 1))
        .collect())
}

/// Splits a Drive URL into the directory below the WebDAV root and the file name.
fn relative_location(url: &str, webdav_url: &str) -> Result<(PathBuf, String)> {
    let rest = url.strip_prefix(webdav_url).unwrap_or_else(|| {
        // Not under the configured root; keep only the file name.
        url.rsplit_once('/').map(|(_, name)| name).unwrap_or(url)
    });
    let rest = rest.split(['?', '#']).next().unwrap_or_default();

    let mut segments = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(Error::InvalidArgument(format!(
                    "granule url escapes the download directory ({})",
                    url
                )));
            }
            s => segments.push(s),
        }
    }

    let Some(name) = segments.pop() else {
        return Err(Error::InvalidArgument(format!(
            "cannot derive a file name from url ({})",
            url
        )));
    };
    Ok((segments.iter().collect(), name.to_string()))
}
