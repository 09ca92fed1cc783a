//! Proposed-API capability gate.
//!
//! # Responsibility
//! - Decide whether an extension may use proposed (not yet stable) API.
//! - Build the user-facing gate violation message.
//!
//! # Invariants
//! - An extension that does not declare `enableProposedApi` is never enabled.
//! - Identifier matching is ASCII case-insensitive.

use serde::Deserialize;
use std::collections::BTreeSet;

/// Host-side policy for proposed-API access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProposedApiPolicy {
    /// Host runs out of sources; every declaring extension is enabled.
    pub dev_mode: bool,
    /// Identifiers passed through the proposed-API command-line switch.
    pub enabled_extensions: BTreeSet<String>,
}

impl ProposedApiPolicy {
    /// Builds a policy from raw switch values, skipping blanks.
    pub fn from_switch_values<'a>(
        dev_mode: bool,
        values: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let enabled_extensions = values
            .into_iter()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();
        Self {
            dev_mode,
            enabled_extensions,
        }
    }

    /// Returns the effective proposed-API flag for one extension.
    pub fn allows(&self, extension_id: &str, declared: bool) -> bool {
        if !declared {
            return false;
        }
        if self.dev_mode {
            return true;
        }
        let normalized = extension_id.trim();
        self.enabled_extensions
            .iter()
            .any(|enabled| enabled.eq_ignore_ascii_case(normalized))
    }
}

/// Gate violation text reported to the offending extension's collector.
pub fn proposed_api_gate_message(extension_point: &str, extension_id: &str, switch: &str) -> String {
    format!(
        "The '{extension_point}' contribution is a proposed API and is only available when running out of dev or with the following command line switch: {switch} {extension_id}"
    )
}
