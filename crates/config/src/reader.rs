//! Loading configuration documents from files, readers, and values.
//!
//! File reads run `${VAR}` environment substitution before parsing so
//! documents can reference deployment-specific paths and addresses.

use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::Config;
use crate::error::ConfigError;

fn env_placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern"))
}

/// Replace `${VAR}` placeholders using the given lookup.
///
/// Split out from [`Config::from_file`] so tests can substitute without
/// touching the process environment.
pub(crate) fn substitute_env_with<F>(raw: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing: Option<String> = None;
    let substituted = env_placeholder_re().replace_all(raw, |caps: &regex::Captures<'_>| {
        let var = &caps[1];
        match lookup(var) {
            Some(value) => value,
            None => {
                missing.get_or_insert_with(|| var.to_owned());
                String::new()
            }
        }
    });
    match missing {
        Some(var) => Err(ConfigError::MissingEnvVar { var }),
        None => Ok(substituted.into_owned()),
    }
}

impl Config {
    /// Read a document from a JSON file, substituting `${VAR}`
    /// placeholders from the process environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_with(&raw, |var| std::env::var(var).ok())?;
        Ok(serde_json::from_str(&substituted)?)
    }

    /// Read a document from any reader. No environment substitution.
    pub fn from_reader(reader: impl Read) -> Result<Self, ConfigError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Build a document from an in-memory JSON value.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }
}
