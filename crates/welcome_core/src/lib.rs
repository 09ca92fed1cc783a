//! View welcome contribution core.
//! Keeps declared `viewsWelcome` content from installed extensions in sync
//! with the views registry.

pub mod config;
pub mod contextkey;
pub mod contribution;
pub mod extension;
pub mod logging;
pub mod model;
pub mod registry;

pub use config::{ConfigError, ReconcilerConfig, PROPOSED_API_SWITCH, VIEWS_WELCOME_EXTENSION_POINT};
pub use contextkey::{ContextKeyExpr, ContextKeyValues};
pub use contribution::{BatchOutcome, ContributionError, ViewsWelcomeContribution};
pub use extension::capability::{proposed_api_gate_message, ProposedApiPolicy};
pub use extension::collector::{ExtensionMessage, MessageCollector, Severity};
pub use extension::manifest::{
    parse_views_welcome, views_welcome_source, ExtensionDescription, ManifestValidationError,
};
pub use extension::point::{
    ContributionBatch, ContributionSource, ExtensionPoint, ExtensionPointError, HandlerError,
};
pub use logging::{default_log_level, init_logging, logging_status, LogDestination};
pub use model::welcome::{EntryId, ViewWelcomeContent, WelcomeEntry};
pub use registry::{
    InMemoryViewsRegistry, RegistrationHandle, ViewsRegistry, ViewsRegistryError,
    ViewsRegistryResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
