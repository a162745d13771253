// src/config/mod.rs
//! Static configuration, read once at process start.
//!
//! Lookup order for each config kind:
//! 1) the path in its env var (must exist)
//! 2) `config/<stem>.toml`
//! 3) `config/<stem>.json`
//! 4) built-in defaults

pub mod feed;
pub mod pipeline;

pub use feed::{BoundingBox, FeedConfig};
pub use pipeline::PipelineConfig;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Load a config from an explicit path. TOML or JSON, picked by extension.
pub fn load_from<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing config {}", path.display()))
}

/// Env var first, then `config/<stem>.toml`, then `config/<stem>.json`, then `T::default()`.
pub fn load_default<T: DeserializeOwned + Default>(env_var: &str, stem: &str) -> Result<T> {
    if let Ok(p) = std::env::var(env_var) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        }
        return Err(anyhow!("{env_var} points to non-existent path"));
    }
    let toml_p = PathBuf::from(format!("config/{stem}.toml"));
    if toml_p.exists() {
        return load_from(&toml_p);
    }
    let json_p = PathBuf::from(format!("config/{stem}.json"));
    if json_p.exists() {
        return load_from(&json_p);
    }
    Ok(T::default())
}

fn parse_config<T: DeserializeOwned>(s: &str, hint_ext: &str) -> Result<T> {
    match hint_ext {
        "json" => Ok(serde_json::from_str(s)?),
        "toml" => Ok(toml::from_str(s)?),
        // Unknown extension: JSON if it looks like an object, else TOML.
        _ if s.trim_start().starts_with('{') => Ok(serde_json::from_str(s)?),
        _ => Ok(toml::from_str(s)?),
    }
}
