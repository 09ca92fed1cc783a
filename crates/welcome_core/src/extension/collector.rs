//! Per-extension diagnostic collector.
//!
//! # Responsibility
//! - Record contribution problems against the extension that declared them.
//! - Mirror every recorded message to the log.
//!
//! # Invariants
//! - Messages are kept in the order they were reported.
//! - Logged message text is sanitized and length-capped.

use crate::logging::sanitize_message;
use log::{error, info, warn};
use std::cell::RefCell;

const MAX_LOGGED_MESSAGE_CHARS: usize = 240;

/// Message severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One message reported for an extension contribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionMessage {
    pub severity: Severity,
    pub extension_id: String,
    pub extension_point: String,
    pub message: String,
}

/// Collects messages for one extension and one extension point.
#[derive(Debug)]
pub struct MessageCollector {
    extension_id: String,
    extension_point: String,
    messages: RefCell<Vec<ExtensionMessage>>,
}

impl MessageCollector {
    pub fn new(extension_id: impl Into<String>, extension_point: impl Into<String>) -> Self {
        Self {
            extension_id: extension_id.into(),
            extension_point: extension_point.into(),
            messages: RefCell::new(Vec::new()),
        }
    }

    pub fn error(&self, message: impl Into<String>) {
        self.report(Severity::Error, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.report(Severity::Warning, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.report(Severity::Info, message.into());
    }

    /// Snapshot of every message reported so far.
    pub fn messages(&self) -> Vec<ExtensionMessage> {
        self.messages.borrow().clone()
    }

    pub fn errors(&self) -> Vec<ExtensionMessage> {
        self.messages
            .borrow()
            .iter()
            .filter(|message| message.severity == Severity::Error)
            .cloned()
            .collect()
    }

    fn report(&self, severity: Severity, message: String) {
        let logged = sanitize_message(&message, MAX_LOGGED_MESSAGE_CHARS);
        match severity {
            Severity::Error => error!(
                "event=extension_message module=extension status=error extension_id={} extension_point={} message={}",
                self.extension_id, self.extension_point, logged
            ),
            Severity::Warning => warn!(
                "event=extension_message module=extension status=warn extension_id={} extension_point={} message={}",
                self.extension_id, self.extension_point, logged
            ),
            Severity::Info => info!(
                "event=extension_message module=extension status=info extension_id={} extension_point={} message={}",
                self.extension_id, self.extension_point, logged
            ),
        }

        self.messages.borrow_mut().push(ExtensionMessage {
            severity,
            extension_id: self.extension_id.clone(),
            extension_point: self.extension_point.clone(),
            message,
        });
    }
}
