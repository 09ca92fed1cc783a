//! Extension-point feed.
//!
//! # Responsibility
//! - Track the set of extensions contributing to one extension point.
//! - Deliver add/remove deltas to the single registered handler.
//!
//! # Invariants
//! - At most one handler is ever attached.
//! - Batches are dispatched synchronously; a batch is fully handled before
//!   `deliver`/`accept_users` returns.
//! - A handler attached late first receives every current user as `added`.

use crate::extension::collector::MessageCollector;
use crate::extension::manifest::ExtensionDescription;
use log::debug;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

/// One extension's contribution to an extension point.
#[derive(Debug, Clone)]
pub struct ContributionSource<T> {
    pub description: ExtensionDescription,
    pub value: Vec<T>,
    pub collector: Rc<MessageCollector>,
}

impl<T> ContributionSource<T> {
    pub fn new(description: ExtensionDescription, value: Vec<T>, collector: Rc<MessageCollector>) -> Self {
        Self {
            description,
            value,
            collector,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.description.identifier
    }

    pub fn proposed_api_enabled(&self) -> bool {
        self.description.enable_proposed_api
    }

    fn key(&self) -> String {
        self.identifier().to_ascii_lowercase()
    }
}

/// Add/remove delta delivered to an extension-point handler.
#[derive(Debug, Clone)]
pub struct ContributionBatch<T> {
    pub added: Vec<ContributionSource<T>>,
    pub removed: Vec<ContributionSource<T>>,
}

impl<T> ContributionBatch<T> {
    pub fn new(added: Vec<ContributionSource<T>>, removed: Vec<ContributionSource<T>>) -> Self {
        Self { added, removed }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Error raised by a handler while processing one batch.
pub type HandlerError = Box<dyn Error>;

type Handler<T> = Box<dyn FnMut(&ContributionBatch<T>) -> Result<(), HandlerError>>;

/// Extension-point feed errors.
#[derive(Debug)]
pub enum ExtensionPointError {
    HandlerAlreadySet(String),
    HandlerFailed {
        extension_point: String,
        source: HandlerError,
    },
}

impl Display for ExtensionPointError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HandlerAlreadySet(name) => {
                write!(f, "extension point `{name}` already has a handler")
            }
            Self::HandlerFailed {
                extension_point,
                source,
            } => write!(f, "handler for `{extension_point}` failed: {source}"),
        }
    }
}

impl Error for ExtensionPointError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::HandlerAlreadySet(_) => None,
            Self::HandlerFailed { source, .. } => Some(source.as_ref()),
        }
    }
}

/// Named feed of contributions for one extension point.
pub struct ExtensionPoint<T> {
    name: String,
    handler: Option<Handler<T>>,
    users: Vec<ContributionSource<T>>,
}

impl<T: Clone> ExtensionPoint<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: None,
            users: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Extensions currently contributing to this point.
    pub fn users(&self) -> &[ContributionSource<T>] {
        &self.users
    }

    /// Attaches the single handler.
    ///
    /// When users are already known, the handler immediately receives them
    /// all as `added`.
    pub fn set_handler(
        &mut self,
        handler: impl FnMut(&ContributionBatch<T>) -> Result<(), HandlerError> + 'static,
    ) -> Result<(), ExtensionPointError> {
        if self.handler.is_some() {
            return Err(ExtensionPointError::HandlerAlreadySet(self.name.clone()));
        }
        self.handler = Some(Box::new(handler));

        if self.users.is_empty() {
            return Ok(());
        }
        let initial = ContributionBatch::new(self.users.clone(), Vec::new());
        self.dispatch(&initial)
    }

    /// Replaces the full user set and delivers the resulting delta.
    ///
    /// Users are matched by extension identifier (ASCII case-insensitive).
    /// A user already known keeps its stored source, so the values removed
    /// later are exactly the values that were added.
    pub fn accept_users(&mut self, users: Vec<ContributionSource<T>>) -> Result<(), ExtensionPointError> {
        let current: BTreeSet<String> = users.iter().map(ContributionSource::key).collect();
        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.users)
            .into_iter()
            .partition(|user| current.contains(&user.key()));
        let known: BTreeSet<String> = kept.iter().map(ContributionSource::key).collect();

        let mut added = Vec::new();
        let mut next = kept;
        for user in users {
            if !known.contains(&user.key()) {
                added.push(user.clone());
                next.push(user);
            }
        }

        self.users = next;
        let batch = ContributionBatch::new(added, removed);
        if batch.is_empty() {
            return Ok(());
        }
        self.dispatch(&batch)
    }

    /// Delivers one externally computed batch and folds it into the user set.
    ///
    /// Removals of known users, and added users that replace a known one,
    /// are dispatched with the stored source so that exactly the values
    /// added earlier are removed.
    pub fn deliver(&mut self, batch: ContributionBatch<T>) -> Result<(), ExtensionPointError> {
        let ContributionBatch {
            added,
            removed: requested,
        } = batch;
        let outgoing: BTreeSet<String> = requested
            .iter()
            .chain(added.iter())
            .map(ContributionSource::key)
            .collect();

        let (mut removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.users)
            .into_iter()
            .partition(|user| outgoing.contains(&user.key()));
        let known: BTreeSet<String> = removed.iter().map(ContributionSource::key).collect();
        removed.extend(
            requested
                .into_iter()
                .filter(|user| !known.contains(&user.key())),
        );

        self.users = kept;
        self.users.extend(added.iter().cloned());
        self.dispatch(&ContributionBatch::new(added, removed))
    }

    fn dispatch(&mut self, batch: &ContributionBatch<T>) -> Result<(), ExtensionPointError> {
        let Some(handler) = self.handler.as_mut() else {
            debug!(
                "event=extension_point_dispatch module=extension status=skipped extension_point={} reason=no_handler",
                self.name
            );
            return Ok(());
        };

        debug!(
            "event=extension_point_dispatch module=extension status=start extension_point={} added={} removed={}",
            self.name,
            batch.added.len(),
            batch.removed.len()
        );
        handler(batch).map_err(|source| ExtensionPointError::HandlerFailed {
            extension_point: self.name.clone(),
            source,
        })
    }
}
