use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Format, Serialized, Toml};

use crate::config::models::DaemonOptions;
use crate::utils::error::ConfigError;

/// `$XDG_CONFIG_HOME/displaypowerd/config.toml`, falling back to
/// `$HOME/.config` the way most XDG-aware Linux daemons do when the
/// environment variable is unset.
fn default_config_path() -> Result<PathBuf, ConfigError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .ok_or_else(|| ConfigError::DirectoryError("neither XDG_CONFIG_HOME nor HOME is set".to_string()))?;
    Ok(base.join("displaypowerd").join("config.toml"))
}

/// Loads `DaemonOptions` from `path`, falling back to defaults (merged with
/// whatever fields did parse) on any error — the core must never fail to
/// start over a malformed config file (spec §7).
///
/// Uses `figment`'s layered-provider merge: defaults first, then the TOML
/// file on top, so a config file naming only a few fields still produces a
/// complete, valid `DaemonOptions` without the teacher's hand-rolled
/// per-field merge macro.
pub fn load_config(path: &Path) -> DaemonOptions {
    match try_load_config(path) {
        Ok(options) => options,
        Err(e) => {
            tracing::error!("failed to load config from {}: {e}. Using defaults.", path.display());
            DaemonOptions::default()
        }
    }
}

fn try_load_config(path: &Path) -> Result<DaemonOptions, ConfigError> {
    if !path.exists() {
        tracing::info!("no config file at {}; writing defaults", path.display());
        let options = DaemonOptions::default();
        if let Err(e) = save_config(path, &options) {
            tracing::warn!("failed to write default config: {e}");
        }
        return Ok(options);
    }

    Figment::from(Serialized::defaults(DaemonOptions::default()))
        .merge(Toml::file(path))
        .extract()
        .map_err(|e| ConfigError::ParseError { path: path.to_path_buf(), message: e.to_string() })
}

/// Loads from the default XDG path (SPEC_FULL §B).
pub fn load_default_config() -> DaemonOptions {
    match default_config_path() {
        Ok(path) => load_config(&path),
        Err(e) => {
            tracing::error!("{e}. Using defaults.");
            DaemonOptions::default()
        }
    }
}

pub fn save_config(path: &Path, options: &DaemonOptions) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|source| ConfigError::WriteError { path: path.to_path_buf(), source })?;
    }
    let toml_string = toml::to_string_pretty(options)
        .map_err(|e| ConfigError::ParseError { path: path.to_path_buf(), message: e.to_string() })?;
    std::fs::write(path, toml_string).map_err(|source| ConfigError::WriteError { path: path.to_path_buf(), source })?;
    tracing::info!("config saved to {}", path.display());
    Ok(())
}
