use flate2::read::MultiGzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use crate::config::DriveCredentials;
use crate::error::{Error, Result};
use crate::transport::{StatusPolicy, Transport};
use crate::util::file_name_from_url;

/// A file written to disk by [`Fetcher::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub path: PathBuf,
    pub content_type: Option<String>,
}

/// Result of [`unpack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unpacked {
    /// A zip archive was extracted; `entry` is the name of the extracted file.
    Extracted { entry: String, path: PathBuf },
    /// A gzip file was decompressed into `path`.
    Decompressed { path: PathBuf },
    /// Not a recognised compressed artifact; left as downloaded.
    Unchanged { path: PathBuf },
}

impl Unpacked {
    pub fn path(&self) -> &Path {
        match self {
            Unpacked::Extracted { path, .. }
            | Unpacked::Decompressed { path }
            | Unpacked::Unchanged { path } => path,
        }
    }

    /// Local file name of the unpacked artifact.
    pub fn file_name(&self) -> String {
        match self {
            Unpacked::Extracted { entry, .. } => entry.clone(),
            _ => self
                .path()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

/// Streams remote artifacts to disk.
pub(crate) struct Fetcher<'a> {
    transport: &'a Transport,
}

impl<'a> Fetcher<'a> {
    pub(crate) fn new(transport: &'a Transport) -> Self {
        Self { transport }
    }

    /// Downloads `url` into `dest_dir` (the working directory when `None`),
    /// naming the file after the URL's last path segment.
    pub(crate) fn fetch(&self, url: &str, dest_dir: Option<&Path>) -> Result<Downloaded> {
        let name = file_name_from_url(url).ok_or_else(|| {
            Error::InvalidArgument(format!("cannot derive a file name from url ({})", url))
        })?;
        self.fetch_as(url, dest_dir, &name, None, StatusPolicy::DenyList)
    }

    /// Downloads `url` into `dest_dir/name`, creating `dest_dir` and its parents.
    ///
    /// `name` must be a single path component.
    pub(crate) fn fetch_as(
        &self,
        url: &str,
        dest_dir: Option<&Path>,
        name: &str,
        auth: Option<&DriveCredentials>,
        policy: StatusPolicy,
    ) -> Result<Downloaded> {
        check_file_name(name)?;
        let dir = destination(dest_dir)?;
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(&dir)?;
        }
        let path = dir.join(name);
        let content_type = self.transport.download_to(url, &path, auth, policy)?;
        Ok(Downloaded { path, content_type })
    }
}

fn destination(dest_dir: Option<&Path>) -> Result<PathBuf> {
    match dest_dir {
        Some(d) if !d.as_os_str().is_empty() => Ok(d.to_path_buf()),
        _ => Ok(std::env::current_dir()?),
    }
}

/// Rejects names that would place a file outside the destination directory.
pub(crate) fn check_file_name(name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::InvalidArgument(format!(
            "'{}' is not a plain file name",
            name
        )));
    }
    Ok(())
}

/// Extracts `.zip` or decompresses `.gz` artifacts in place and deletes the
/// compressed file. Other files are returned untouched.
pub fn unpack(path: &Path) -> Result<Unpacked> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.ends_with(".zip") {
        let (entry, extracted) = extract_zip(path)?;
        fs::remove_file(path)?;
        Ok(Unpacked::Extracted {
            entry,
            path: extracted,
        })
    } else if name.ends_with(".gz") {
        let out = gunzip(path)?;
        fs::remove_file(path)?;
        Ok(Unpacked::Decompressed { path: out })
    } else {
        Ok(Unpacked::Unchanged {
            path: path.to_path_buf(),
        })
    }
}

/// Extracts every entry of the archive next to it and returns the first file entry.
fn extract_zip(path: &Path) -> Result<(String, PathBuf)> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;
    let mut first: Option<(String, PathBuf)> = None;
    let mut files = 0usize;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(Error::malformed(
                &path.display().to_string(),
                format!("zip entry {:?} escapes the destination directory", entry.name()),
            ));
        };
        let out_path = dir.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;

        files += 1;
        if first.is_none() {
            first = Some((entry.name().to_string(), out_path));
        }
    }

    if files > 1 {
        log::warn!(
            "{} contained {} files; only the first is reported",
            path.display(),
            files
        );
    }

    first.ok_or_else(|| Error::malformed(&path.display().to_string(), "zip archive is empty"))
}

/// Decompresses every member of `name.gz` into sibling `name`.
fn gunzip(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name
        .get(..file_name.len().saturating_sub(3))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "{} has no name left once .gz is removed",
                path.display()
            ))
        })?;
    let out_path = path.with_file_name(stem);
    let mut decoder = MultiGzDecoder::new(File::open(path)?);
    let mut out = File::create(&out_path)?;
    io::copy(&mut decoder, &mut out)?;
    Ok(out_path)
}
