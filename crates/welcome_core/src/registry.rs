//! Views registry for welcome content.
//!
//! # Responsibility
//! - Store active welcome content keyed by target view.
//! - Hand out single-shot `RegistrationHandle` tokens that reverse one
//!   registration.
//!
//! # Invariants
//! - A handle releases its registration at most once; later calls are no-ops.
//! - Dropping a handle does not release anything.
//! - Content for one view is returned in registration order.

use crate::contextkey::ContextKeyValues;
use crate::model::welcome::ViewWelcomeContent;
use log::debug;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::rc::{Rc, Weak};

/// Registration errors raised by a views registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewsRegistryError {
    InvalidViewId(String),
}

impl Display for ViewsRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidViewId(value) => write!(f, "view id is invalid: `{value}`"),
        }
    }
}

impl Error for ViewsRegistryError {}

pub type ViewsRegistryResult<T> = Result<T, ViewsRegistryError>;

/// Single-shot release token for one registration.
pub struct RegistrationHandle {
    release: Option<Box<dyn FnOnce()>>,
}

impl RegistrationHandle {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Releases the registration. Idempotent.
    pub fn dispose(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.release.is_none()
    }
}

impl Debug for RegistrationHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationHandle")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Registration contract for view welcome content.
pub trait ViewsRegistry {
    fn register_view_welcome_content(
        &self,
        view: &str,
        content: ViewWelcomeContent,
    ) -> ViewsRegistryResult<RegistrationHandle>;
}

#[derive(Debug, Default)]
struct RegistryState {
    next_slot: u64,
    views: BTreeMap<String, Vec<(u64, ViewWelcomeContent)>>,
}

impl RegistryState {
    fn remove(&mut self, view: &str, slot: u64) {
        let Some(entries) = self.views.get_mut(view) else {
            return;
        };
        entries.retain(|(current, _)| *current != slot);
        if entries.is_empty() {
            self.views.remove(view);
        }
    }
}

/// In-process views registry.
///
/// Created once by the host and shared by `Rc`; handles only hold a weak
/// reference, so releasing after the registry is gone is a no-op.
#[derive(Debug, Default)]
pub struct InMemoryViewsRegistry {
    state: Rc<RefCell<RegistryState>>,
}

impl InMemoryViewsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all registered content for one view, ignoring `when`.
    pub fn view_welcome_content(&self, view: &str) -> Vec<ViewWelcomeContent> {
        self.state
            .borrow()
            .views
            .get(view.trim())
            .map(|entries| entries.iter().map(|(_, content)| content.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns content for one view whose `when` holds in `context`.
    pub fn visible_view_welcome_content(
        &self,
        view: &str,
        context: &ContextKeyValues,
    ) -> Vec<ViewWelcomeContent> {
        self.view_welcome_content(view)
            .into_iter()
            .filter(|content| content.when.evaluate(context))
            .collect()
    }

    /// Returns sorted ids of views that currently have content.
    pub fn views(&self) -> Vec<String> {
        self.state.borrow().views.keys().cloned().collect()
    }

    /// Total number of active registrations across all views.
    pub fn len(&self) -> usize {
        self.state.borrow().views.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().views.is_empty()
    }
}

impl ViewsRegistry for InMemoryViewsRegistry {
    fn register_view_welcome_content(
        &self,
        view: &str,
        content: ViewWelcomeContent,
    ) -> ViewsRegistryResult<RegistrationHandle> {
        let view = view.trim().to_string();
        if view.is_empty() {
            return Err(ViewsRegistryError::InvalidViewId(view));
        }

        let slot = {
            let mut state = self.state.borrow_mut();
            let slot = state.next_slot;
            state.next_slot += 1;
            state
                .views
                .entry(view.clone())
                .or_default()
                .push((slot, content));
            slot
        };
        debug!(
            "event=welcome_register module=registry status=ok view={} slot={}",
            view, slot
        );

        let state: Weak<RefCell<RegistryState>> = Rc::downgrade(&self.state);
        Ok(RegistrationHandle::new(move || {
            if let Some(state) = state.upgrade() {
                state.borrow_mut().remove(&view, slot);
                debug!(
                    "event=welcome_release module=registry status=ok view={} slot={}",
                    view, slot
                );
            }
        }))
    }
}
