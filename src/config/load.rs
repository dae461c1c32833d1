use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::error::{Effect, Transience};

use super::merge::{apply_env_overrides, merge_layers};
use super::{Config, ConfigLayer};

pub const DEFAULT_CONFIG_FILE: &str = "ordered-kv.toml";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("failed to write {path}: {reason}")]
    Persist { path: PathBuf, reason: String },
}

impl ConfigLoadError {
    pub fn transience(&self) -> Transience {
        match self {
            ConfigLoadError::Read { .. } | ConfigLoadError::Persist { .. } => Transience::Unknown,
            ConfigLoadError::Parse { .. } | ConfigLoadError::Render(_) => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            ConfigLoadError::Persist { .. } => Effect::Unknown,
            _ => Effect::None,
        }
    }
}

/// Reads one config file as a layer. A missing file is not an error.
pub fn load_layer(path: &Path) -> Result<Option<ConfigLayer>, ConfigLoadError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Defaults, then the file at `path` (if any), then environment overrides.
pub fn load(path: &Path) -> Result<Config, ConfigLoadError> {
    let mut config = merge_layers(load_layer(path)?);
    apply_env_overrides(&mut config);
    Ok(config)
}

pub fn write_config(path: &Path, cfg: &Config) -> Result<(), ConfigLoadError> {
    let persist_err = |reason: String| ConfigLoadError::Persist {
        path: path.to_path_buf(),
        reason,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .map_err(|e| persist_err(format!("failed to create {}: {e}", dir.display())))?;
    let contents = toml::to_string_pretty(cfg)?;

    let temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| persist_err(format!("failed to create temp file: {e}")))?;
    fs::write(temp.path(), contents.as_bytes())
        .map_err(|e| persist_err(format!("failed to write temp file: {e}")))?;
    temp.persist(path)
        .map_err(|e| persist_err(e.to_string()))?;
    Ok(())
}
