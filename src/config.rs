use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Settings read from `config.toml`. Every field is optional; anything given
/// on the command line wins over the file.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub target: Option<String>,
    pub ports: Option<String>,
    pub concurrency: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub max_duration_secs: Option<u64>,
    pub json: Option<bool>,
    pub open_only: Option<bool>,
    pub save_file: Option<String>,
}

pub fn default_config_path() -> Option<PathBuf> {
    if let Some(proj) = directories::ProjectDirs::from("org", "portsweep", "portsweep") {
        let mut p = proj.config_dir().to_path_buf();
        p.push("config.toml");
        Some(p)
    } else {
        None
    }
}

pub fn load_config(path: Option<&Path>) -> io::Result<Option<FileConfig>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(None),
        },
    };
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file");
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    let cfg: FileConfig = toml::from_str(&content)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("TOML parse error: {e}")))?;
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(Some(cfg))
}

pub fn save_config(cfg: &FileConfig, path: Option<&Path>) -> io::Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path().ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no default config dir"))?,
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let toml_str = toml::to_string_pretty(cfg)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("TOML serialize error: {e}")))?;
    fs::write(&path, toml_str)?;
    Ok(path)
}
