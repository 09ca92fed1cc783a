//! Reconciler configuration.
//!
//! # Invariants
//! - Every field has a default; an empty JSON object is a valid config.
//! - Unknown fields and blank names are rejected.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Default extension-point name for view welcome contributions.
pub const VIEWS_WELCOME_EXTENSION_POINT: &str = "viewsWelcome";
/// Default command-line switch named in proposed-API diagnostics.
pub const PROPOSED_API_SWITCH: &str = "--enable-proposed-api";

/// Settings for `ViewsWelcomeContribution`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcilerConfig {
    /// Extension-point name used in diagnostics.
    pub extension_point: String,
    /// Switch that enables proposed API for one extension.
    pub proposed_api_switch: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            extension_point: VIEWS_WELCOME_EXTENSION_POINT.to_string(),
            proposed_api_switch: PROPOSED_API_SWITCH.to_string(),
        }
    }
}

impl ReconcilerConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extension_point.trim().is_empty() {
            return Err(ConfigError::EmptyExtensionPoint);
        }
        if self.proposed_api_switch.trim().is_empty() {
            return Err(ConfigError::EmptyProposedApiSwitch);
        }
        Ok(())
    }
}

/// Configuration load errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    EmptyExtensionPoint,
    EmptyProposedApiSwitch,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "invalid reconciler config: {message}"),
            Self::EmptyExtensionPoint => write!(f, "extension_point must not be empty"),
            Self::EmptyProposedApiSwitch => write!(f, "proposed_api_switch must not be empty"),
        }
    }
}

impl Error for ConfigError {}
