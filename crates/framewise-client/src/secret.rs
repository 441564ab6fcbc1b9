//! API key references.
//!
//! The `api_key` in `config.toml` does not have to be stored in clear text.
//! It can point at the environment (`env::FRAMEWISE_API_KEY`) or at a
//! password-store entry (`pass::framewise/api-key`). Anything without a
//! known prefix is the key itself.

use std::process::Command;

use crate::error::ConfigError;

/// Where a configured secret value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRef<'a> {
    /// The value itself.
    Plain(&'a str),
    /// An environment variable name.
    Env(&'a str),
    /// A `pass` store path; the first output line is the secret.
    Pass(&'a str),
}

impl<'a> SecretRef<'a> {
    /// Classifies a configured value by its prefix.
    pub fn parse(value: &'a str) -> Self {
        if let Some(path) = value.strip_prefix("pass::") {
            Self::Pass(path)
        } else if let Some(var) = value.strip_prefix("env::") {
            Self::Env(var)
        } else {
            Self::Plain(value)
        }
    }

    /// Returns true when resolving needs an outside lookup.
    pub fn is_reference(&self) -> bool {
        !matches!(self, Self::Plain(_))
    }

    /// Produces the secret value.
    pub fn resolve(&self) -> Result<String, ConfigError> {
        match *self {
            Self::Plain(value) => Ok(value.to_string()),
            Self::Env(var) => std::env::var(var).map_err(|_| {
                ConfigError::Secret(format!("environment variable `{var}` is not set"))
            }),
            Self::Pass(path) => pass_show(path),
        }
    }
}

/// Resolves a configured value that may be a secret reference.
pub fn resolve(value: &str) -> Result<String, ConfigError> {
    SecretRef::parse(value).resolve()
}

fn pass_show(path: &str) -> Result<String, ConfigError> {
    let output = Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| ConfigError::Secret(format!("failed to run `pass show {path}`: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ConfigError::Secret(format!(
            "`pass show {path}` failed ({}): {}",
            output.status,
            stderr.trim()
        )));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::Secret(format!("`pass show {path}` produced no output")))
}
