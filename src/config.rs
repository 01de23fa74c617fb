use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub const PODAAC_URL: &str = "http://podaac.jpl.nasa.gov/ws/";
pub const L2SS_URL: &str = "http://podaac-tools.jpl.nasa.gov/l2ss-services/l2ss/";
pub const MCC_URL: &str = "http://podaac-uat.jpl.nasa.gov/mcc/check";
pub const OCEANCOLOR_URL: &str = "https://oceandata.sci.gsfc.nasa.gov/api/file_search";
pub const DRIVE_URL: &str = "https://podaac-tools.jpl.nasa.gov/drive/files";
pub const NEXUS_URL: &str = "https://oceanworks.jpl.nasa.gov/";

/// Base URLs of every service the client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub podaac: String,
    pub l2ss: String,
    pub mcc: String,
    pub oceancolor: String,
    pub drive: String,
    pub nexus: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            podaac: PODAAC_URL.to_string(),
            l2ss: L2SS_URL.to_string(),
            mcc: MCC_URL.to_string(),
            oceancolor: OCEANCOLOR_URL.to_string(),
            drive: DRIVE_URL.to_string(),
            nexus: NEXUS_URL.to_string(),
        }
    }
}

/// Earthdata (URS) credentials for PO.DAAC Drive.
///
/// The password is the encrypted WebDAV password shown on the Drive page,
/// not the Earthdata login password.
#[derive(Clone, PartialEq, Eq)]
pub struct DriveCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for DriveCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoints: Endpoints,
    /// Drive credentials, if any were configured.
    pub drive: Option<DriveCredentials>,
    /// Timeout applied to API calls. Downloads are not time-limited.
    pub timeout: Option<Duration>,
    /// Show a progress bar while downloading.
    pub progress: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            drive: None,
            timeout: Some(Duration::from_secs(60)),
            progress: false,
        }
    }
}

/// Parsed `podaac.ini`: section name to key/value pairs.
#[derive(Debug, Default)]
struct IniFile {
    sections: HashMap<String, HashMap<String, String>>,
}

impl IniFile {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .filter(|v| !v.is_empty())
            .cloned()
    }
}

/// Resolves configuration from (in order of precedence) environment variables,
/// the first `podaac.ini` found, and built-in defaults.
pub(crate) fn load_config() -> Result<ClientConfig> {
    let ini = match rc_candidates().into_iter().find(|p| p.exists()) {
        Some(path) => {
            log::debug!("reading configuration from {}", path.display());
            read_ini(&path)?
        }
        None => IniFile::default(),
    };
    Ok(resolve(&ini, |name| std::env::var(name).ok()))
}

/// Loads configuration from an explicit INI file, still letting environment
/// variables override it.
pub(crate) fn load_config_file(path: &Path) -> Result<ClientConfig> {
    let ini = read_ini(path)?;
    Ok(resolve(&ini, |name| std::env::var(name).ok()))
}

fn resolve(ini: &IniFile, env: impl Fn(&str) -> Option<String>) -> ClientConfig {
    let env = |name: &str| env(name).filter(|v| !v.is_empty());
    let defaults = Endpoints::default();

    let endpoint = |var: &str, key: &str, default: String| {
        env(var)
            .or_else(|| ini.get("endpoints", key))
            .unwrap_or(default)
    };

    let drive_url = env("PODAAC_DRIVE_URL")
        .or_else(|| ini.get("drive", "webdav_url"))
        .or_else(|| ini.get("endpoints", "drive"))
        .unwrap_or(defaults.drive);

    let endpoints = Endpoints {
        podaac: endpoint("PODAAC_URL", "podaac", defaults.podaac),
        l2ss: endpoint("PODAAC_L2SS_URL", "l2ss", defaults.l2ss),
        mcc: endpoint("PODAAC_MCC_URL", "mcc", defaults.mcc),
        oceancolor: endpoint("OCEANCOLOR_URL", "oceancolor", defaults.oceancolor),
        drive: drive_url,
        nexus: endpoint("NEXUS_URL", "nexus", defaults.nexus),
    };

    let username = env("PODAAC_DRIVE_USERNAME").or_else(|| ini.get("drive", "urs_username"));
    let password = env("PODAAC_DRIVE_PASSWORD").or_else(|| ini.get("drive", "urs_password"));
    let drive = match (username, password) {
        (Some(username), Some(password)) => Some(DriveCredentials { username, password }),
        _ => None,
    };

    ClientConfig {
        endpoints,
        drive,
        ..ClientConfig::default()
    }
}

fn read_ini(path: &Path) -> Result<IniFile> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(parse_ini(&text))
}

fn parse_ini(text: &str) -> IniFile {
    let mut ini = IniFile::default();
    let mut section = String::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.trim().to_lowercase();
            continue;
        }

        // configparser accepts both `key = value` and `key: value`
        let Some(idx) = line.find(['=', ':']) else {
            continue;
        };
        let (k, v) = line.split_at(idx);
        let k = k.trim().to_lowercase();
        let v = strip_quotes(v[1..].trim());
        ini.sections
            .entry(section.clone())
            .or_default()
            .insert(k, v.to_string());
    }

    ini
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates() -> Vec<PathBuf> {
    // 1) PODAAC_RC (explicit)
    // 2) ./podaac.ini
    // 3) ~/podaac.ini
    if let Ok(p) = std::env::var("PODAAC_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join("podaac.ini"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join("podaac.ini"));
    }
    v
}
