use std::path::Path;

use anyhow::Context;
use lagoon_core::config::Config;
use serde::de::DeserializeOwned;

pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    parse_from_slice(&content).with_context(|| format!("parse config file {}", path.display()))
}

pub fn parse_from_slice<T: DeserializeOwned>(content: &[u8]) -> anyhow::Result<T> {
    // read first non-space u8
    let is_json = match content
        .iter()
        .find(|&&b| b != b' ' && b != b'\r' && b != b'\n' && b != b'\t')
    {
        Some(first) => *first == b'{',
        None => false,
    };
    match is_json {
        true => serde_json::from_slice::<T>(content).map_err(Into::into),
        false => toml::from_str::<T>(&String::from_utf8_lossy(content)).map_err(Into::into),
    }
}
