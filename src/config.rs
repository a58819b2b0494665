use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::api::{DEFAULT_BASE_URL, DEFAULT_UPLOAD_BASE_URL};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid config file {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_base_url: String,
    pub upload_base_url: String,
    pub config_dir: PathBuf,
    pub token_path: PathBuf,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Optional `config.json` inside the config directory.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    client_id: Option<String>,
    client_secret: Option<String>,
    token_file: Option<PathBuf>,
    api_base_url: Option<String>,
    upload_base_url: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let home = env::var("HOME").ok().map(PathBuf::from);
        Self::resolve(|key| env::var(key).ok(), home)
    }

    /// Layers environment over the config file over defaults.
    fn resolve<F>(lookup: F, home: Option<PathBuf>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config_dir = var("GCHAT_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_config_dir(home));
        let file = read_file_config(&config_dir.join("config.json"))?;

        let api_base_url = var("GCHAT_API_BASE_URL")
            .or(file.api_base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let upload_base_url = var("GCHAT_UPLOAD_BASE_URL")
            .or(file.upload_base_url)
            .unwrap_or_else(|| DEFAULT_UPLOAD_BASE_URL.to_string());
        let token_path = var("GCHAT_TOKEN_FILE")
            .map(PathBuf::from)
            .or(file.token_file)
            .unwrap_or_else(|| config_dir.join("token.json"));

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            upload_base_url: upload_base_url.trim_end_matches('/').to_string(),
            token_path,
            client_id: var("GCHAT_CLIENT_ID").or(file.client_id),
            client_secret: var("GCHAT_CLIENT_SECRET").or(file.client_secret),
            config_dir,
        })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(FileConfig::default()),
        Err(err) => return Err(err.into()),
    };
    serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn default_config_dir(home: Option<PathBuf>) -> PathBuf {
    home.unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("gchat")
}
