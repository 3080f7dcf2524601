//! Hostvars read from standard input for `--add` / `--update`.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde_json::Value;

use invcache_store::HostVars;

/// Encoding of the hostvars mapping on stdin
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputFormat {
    Json,
    Yaml,
}

impl InputFormat {
    pub fn name(self) -> &'static str {
        match self {
            InputFormat::Json => "JSON",
            InputFormat::Yaml => "YAML",
        }
    }
}

/// Decode a hostvars mapping. Blank input is an empty mapping.
///
/// `join_groups` is left in place; the cache strips it when storing.
pub fn parse_hostvars(format: InputFormat, text: &str) -> Result<HostVars> {
    if text.trim().is_empty() {
        return Ok(HostVars::new());
    }

    let value: Value = match format {
        InputFormat::Json => {
            serde_json::from_str(text).with_context(|| format!("Error parsing stdin:\n{}", text))?
        }
        InputFormat::Yaml => {
            serde_yaml::from_str(text).with_context(|| format!("Error parsing stdin:\n{}", text))?
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(HostVars::new()),
        Value::Array(_) => bail!("Expecting dictionary of hostvars, got a list: {}", value),
        other => bail!("Expecting dictionary of hostvars, got: {}", other),
    }
}
