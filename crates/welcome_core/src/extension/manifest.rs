//! Extension package description and `viewsWelcome` declaration parsing.
//!
//! # Responsibility
//! - Build validated `ExtensionDescription` values from package metadata.
//! - Read `contributes.viewsWelcome` items into `WelcomeEntry` values.
//!
//! # Invariants
//! - Identifiers use the `publisher.name` form.
//! - Invalid `viewsWelcome` items are reported to the collector and skipped;
//!   they never abort parsing of the remaining items.
//! - Every parsed entry gets a fresh identity.
//!
//! # See also
//! - `extension::capability` for the proposed-API flag computation.

use crate::extension::capability::ProposedApiPolicy;
use crate::extension::collector::MessageCollector;
use crate::extension::point::ContributionSource;
use crate::model::welcome::WelcomeEntry;
use log::warn;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

/// Property name of the declaration under `contributes`.
pub const VIEWS_WELCOME_PROPERTY: &str = "viewsWelcome";

/// Identity and capability metadata of one installed extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDescription {
    /// `publisher.name` identifier.
    pub identifier: String,
    /// Package version (`major.minor.patch[-pre]`).
    pub version: String,
    /// Effective proposed-API flag, already resolved against host policy.
    pub enable_proposed_api: bool,
}

impl ExtensionDescription {
    pub fn new(identifier: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            version: version.into(),
            enable_proposed_api: false,
        }
    }

    pub fn with_proposed_api(mut self, enabled: bool) -> Self {
        self.enable_proposed_api = enabled;
        self
    }

    /// Validates identifier and version shape.
    pub fn validate(&self) -> Result<(), ManifestValidationError> {
        if !is_valid_extension_id(self.identifier.trim()) {
            return Err(ManifestValidationError::InvalidId(self.identifier.clone()));
        }
        if !is_semver(self.version.trim()) {
            return Err(ManifestValidationError::InvalidVersion(self.version.clone()));
        }
        Ok(())
    }

    /// Reads `publisher`, `name`, `version` and `enableProposedApi` from a
    /// package manifest and resolves the proposed-API flag against `policy`.
    pub fn from_package_json(
        package: &Value,
        policy: &ProposedApiPolicy,
    ) -> Result<Self, ManifestValidationError> {
        let publisher = required_str(package, "publisher")?;
        let name = required_str(package, "name")?;
        let version = required_str(package, "version")?;
        let declared = package
            .get("enableProposedApi")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let identifier = format!("{publisher}.{name}");
        let enabled = policy.allows(&identifier, declared);
        if declared && !enabled {
            warn!(
                "event=proposed_api_check module=extension status=denied extension_id={}",
                identifier
            );
        }

        let description = Self::new(identifier, version).with_proposed_api(enabled);
        description.validate()?;
        Ok(description)
    }
}

/// Builds one `viewsWelcome` contribution source from a package manifest.
pub fn views_welcome_source(
    package: &Value,
    policy: &ProposedApiPolicy,
    extension_point: &str,
) -> Result<ContributionSource<WelcomeEntry>, ManifestValidationError> {
    let description = ExtensionDescription::from_package_json(package, policy)?;
    let collector = Rc::new(MessageCollector::new(
        description.identifier.clone(),
        extension_point,
    ));
    let value = parse_views_welcome(package, &collector);
    Ok(ContributionSource::new(description, value, collector))
}

/// Parses `contributes.viewsWelcome`, reporting invalid items to `collector`.
pub fn parse_views_welcome(package: &Value, collector: &MessageCollector) -> Vec<WelcomeEntry> {
    let Some(raw) = package
        .get("contributes")
        .and_then(|contributes| contributes.get(VIEWS_WELCOME_PROPERTY))
    else {
        return vec![];
    };

    let Some(items) = raw.as_array() else {
        collector.error(ManifestValidationError::ContributionNotArray(VIEWS_WELCOME_PROPERTY).to_string());
        return vec![];
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match parse_welcome_item(index, item) {
            Ok(entry) => Some(entry),
            Err(err) => {
                collector.error(err.to_string());
                None
            }
        })
        .collect()
}

fn parse_welcome_item(index: usize, item: &Value) -> Result<WelcomeEntry, ManifestValidationError> {
    let Some(fields) = item.as_object() else {
        return Err(ManifestValidationError::ItemNotObject { index });
    };

    let item_str = |property: &'static str| -> Result<String, ManifestValidationError> {
        match fields.get(property).and_then(Value::as_str) {
            Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
            _ => Err(ManifestValidationError::ItemMissingProperty { index, property }),
        }
    };
    let view = item_str("view")?;
    let contents = item_str("contents")?;

    let when = match fields.get("when") {
        None | Some(Value::Null) => None,
        Some(Value::String(value)) => Some(value.clone()),
        Some(_) => {
            return Err(ManifestValidationError::ItemInvalidProperty {
                index,
                property: "when",
            })
        }
    };

    Ok(WelcomeEntry::new(view.trim(), contents, when))
}

fn required_str<'a>(
    package: &'a Value,
    property: &'static str,
) -> Result<&'a str, ManifestValidationError> {
    match package.get(property).and_then(Value::as_str) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim()),
        _ => Err(ManifestValidationError::MissingProperty(property)),
    }
}

fn is_valid_extension_id(value: &str) -> bool {
    let Some((publisher, name)) = value.split_once('.') else {
        return false;
    };
    is_valid_id_part(publisher) && is_valid_id_part(name)
}

fn is_valid_id_part(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_semver(value: &str) -> bool {
    let core = value.split_once('-').map_or(value, |(core, _)| core);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() != 3 {
        return false;
    }
    parts
        .iter()
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// Package and declaration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestValidationError {
    MissingProperty(&'static str),
    InvalidId(String),
    InvalidVersion(String),
    ContributionNotArray(&'static str),
    ItemNotObject { index: usize },
    ItemMissingProperty { index: usize, property: &'static str },
    ItemInvalidProperty { index: usize, property: &'static str },
}

impl Display for ManifestValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingProperty(name) => {
                write!(f, "package property `{name}` is mandatory and must be a non-empty string")
            }
            Self::InvalidId(value) => {
                write!(f, "extension id is invalid: {value} (expected publisher.name)")
            }
            Self::InvalidVersion(value) => write!(
                f,
                "extension version is invalid: {value} (expected major.minor.patch)"
            ),
            Self::ContributionNotArray(name) => {
                write!(f, "contribution `{name}` must be an array")
            }
            Self::ItemNotObject { index } => write!(f, "item {index} must be an object"),
            Self::ItemMissingProperty { index, property } => write!(
                f,
                "item {index}: property `{property}` is mandatory and must be a non-empty string"
            ),
            Self::ItemInvalidProperty { index, property } => {
                write!(f, "item {index}: property `{property}` must be a string")
            }
        }
    }
}

impl Error for ManifestValidationError {}

#[cfg(test)]
mod tests {
    use super::{
        parse_views_welcome, views_welcome_source, ExtensionDescription, ManifestValidationError,
    };
    use crate::extension::capability::ProposedApiPolicy;
    use crate::extension::collector::MessageCollector;
    use serde_json::json;

    fn package() -> serde_json::Value {
        json!({
            "publisher": "acme",
            "name": "tools",
            "version": "1.2.3",
            "enableProposedApi": true,
            "contributes": {
                "viewsWelcome": [
                    { "view": "explorer", "contents": "Open a folder", "when": "workspaceFolderCount == 0" },
                    { "view": "scm", "contents": "No repository" }
                ]
            }
        })
    }

    #[test]
    fn validates_description_shape() {
        assert!(ExtensionDescription::new("acme.tools", "1.2.3").validate().is_ok());
        assert!(ExtensionDescription::new("Acme.Tools", "0.1.0-beta.1")
            .validate()
            .is_ok());
        assert!(matches!(
            ExtensionDescription::new("acme", "1.0.0").validate(),
            Err(ManifestValidationError::InvalidId(_))
        ));
        assert!(matches!(
            ExtensionDescription::new("acme..tools", "1.0.0").validate(),
            Err(ManifestValidationError::InvalidId(_))
        ));
        assert!(matches!(
            ExtensionDescription::new("acme.tools", "v1").validate(),
            Err(ManifestValidationError::InvalidVersion(_))
        ));
    }

    #[test]
    fn resolves_proposed_api_flag_against_policy() {
        let allowed = ProposedApiPolicy::from_switch_values(false, ["acme.tools"]);
        let description =
            ExtensionDescription::from_package_json(&package(), &allowed).expect("description");
        assert_eq!(description.identifier, "acme.tools");
        assert!(description.enable_proposed_api);

        let denied = ProposedApiPolicy::default();
        let description =
            ExtensionDescription::from_package_json(&package(), &denied).expect("description");
        assert!(!description.enable_proposed_api);
    }

    #[test]
    fn rejects_package_without_publisher() {
        let mut package = package();
        package["publisher"] = json!("  ");
        let err = ExtensionDescription::from_package_json(&package, &ProposedApiPolicy::default())
            .expect_err("blank publisher must fail");
        assert_eq!(err, ManifestValidationError::MissingProperty("publisher"));
    }

    #[test]
    fn parses_declared_entries() {
        let collector = MessageCollector::new("acme.tools", "viewsWelcome");
        let entries = parse_views_welcome(&package(), &collector);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].view, "explorer");
        assert_eq!(entries[0].when.as_deref(), Some("workspaceFolderCount == 0"));
        assert_eq!(entries[1].when, None);
        assert_ne!(entries[0].id(), entries[1].id());
        assert!(collector.messages().is_empty());
    }

    #[test]
    fn missing_declaration_yields_no_entries_and_no_messages() {
        let collector = MessageCollector::new("acme.tools", "viewsWelcome");
        let entries = parse_views_welcome(&json!({ "contributes": {} }), &collector);
        assert!(entries.is_empty());
        assert!(collector.messages().is_empty());
    }

    #[test]
    fn reports_non_array_declaration_once() {
        let collector = MessageCollector::new("acme.tools", "viewsWelcome");
        let entries = parse_views_welcome(
            &json!({ "contributes": { "viewsWelcome": { "view": "explorer" } } }),
            &collector,
        );
        assert!(entries.is_empty());
        let errors = collector.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("must be an array"));
    }

    #[test]
    fn skips_invalid_items_and_keeps_valid_ones() {
        let collector = MessageCollector::new("acme.tools", "viewsWelcome");
        let entries = parse_views_welcome(
            &json!({
                "contributes": {
                    "viewsWelcome": [
                        "not an object",
                        { "view": "", "contents": "x" },
                        { "view": "explorer", "contents": "x", "when": 3 },
                        { "view": "explorer", "contents": "kept" }
                    ]
                }
            }),
            &collector,
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].contents, "kept");

        let errors = collector.errors();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].message.contains("item 0"));
        assert!(errors[1].message.contains("`view`"));
        assert!(errors[2].message.contains("`when`"));
    }

    #[test]
    fn builds_contribution_source_with_shared_collector() {
        let policy = ProposedApiPolicy::from_switch_values(true, Vec::<&str>::new());
        let source = views_welcome_source(&package(), &policy, "viewsWelcome").expect("source");
        assert_eq!(source.identifier(), "acme.tools");
        assert!(source.proposed_api_enabled());
        assert_eq!(source.value.len(), 2);
        assert!(source.collector.messages().is_empty());
    }
}
