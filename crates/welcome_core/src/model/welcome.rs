//! View welcome entry model.
//!
//! # Responsibility
//! - Carry one `contributes.viewsWelcome` item as an immutable value.
//! - Provide the registry-facing content shape.
//!
//! # Invariants
//! - `id` is assigned once at creation and survives clones, so a clone names
//!   the same contribution.
//! - `contents` is opaque to the core.

use crate::contextkey::ContextKeyExpr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Surrogate identity for one declared welcome entry.
pub type EntryId = Uuid;

/// One declared view-welcome contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeEntry {
    /// Assigned at creation; never read from the manifest.
    #[serde(skip, default = "Uuid::new_v4")]
    id: EntryId,
    /// Target view identifier, e.g. `workbench.explorer.emptyView`.
    pub view: String,
    /// Display payload (markdown-ish text with command links).
    pub contents: String,
    /// Serialized context-key expression; `None` means always visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

impl WelcomeEntry {
    /// Creates an entry with a fresh identity.
    pub fn new(
        view: impl Into<String>,
        contents: impl Into<String>,
        when: Option<String>,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), view, contents, when)
    }

    /// Creates an entry with an explicit identity.
    pub fn with_id(
        id: EntryId,
        view: impl Into<String>,
        contents: impl Into<String>,
        when: Option<String>,
    ) -> Self {
        Self {
            id,
            view: view.into(),
            contents: contents.into(),
            when,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }
}

impl PartialEq for WelcomeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WelcomeEntry {}

/// Content shape accepted by the views registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewWelcomeContent {
    pub content: String,
    pub when: ContextKeyExpr,
}
