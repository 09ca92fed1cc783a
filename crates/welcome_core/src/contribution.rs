//! View welcome contribution reconciler.
//!
//! # Responsibility
//! - Keep registry content in lock-step with `viewsWelcome` contribution deltas.
//! - Gate contributions behind the proposed-API flag.
//! - Own every registration handle until it is released exactly once.
//!
//! # Invariants
//! - An entry id is tracked iff its content is active in the registry.
//! - Within a batch, all removals are applied before any addition.
//! - A gated-out source is reported once per add attempt and never registered.
//! - After `dispose`, batches are ignored and no handle remains.
//!
//! # Known gap
//! - Removal is gated by the flag observed at removal time. Entries added
//!   under an enabled flag and removed under a disabled one stay registered
//!   until `dispose`. Batches from `ExtensionPoint` carry the stored source on
//!   removal, so this only affects batches built by hand.

use crate::config::ReconcilerConfig;
use crate::contextkey::ContextKeyExpr;
use crate::extension::capability::proposed_api_gate_message;
use crate::extension::point::{ContributionBatch, ExtensionPoint, ExtensionPointError};
use crate::model::welcome::{EntryId, ViewWelcomeContent, WelcomeEntry};
use crate::registry::{RegistrationHandle, ViewsRegistry, ViewsRegistryError};
use log::{debug, error, info, warn};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

/// Counters for one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub registered: usize,
    pub released: usize,
    pub rejected_sources: usize,
    /// Set when the batch arrived after disposal.
    pub ignored: bool,
}

/// Reconciler errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContributionError {
    Registry {
        extension_id: String,
        view: String,
        source: ViewsRegistryError,
    },
}

impl Display for ContributionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registry {
                extension_id,
                view,
                source,
            } => write!(
                f,
                "failed to register welcome content for view `{view}` from `{extension_id}`: {source}"
            ),
        }
    }
}

impl Error for ContributionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registry { source, .. } => Some(source),
        }
    }
}

struct ContributionState {
    registry: Rc<dyn ViewsRegistry>,
    config: ReconcilerConfig,
    contents: RefCell<HashMap<EntryId, RegistrationHandle>>,
    disposed: Cell<bool>,
}

// `contents` is only borrowed for single map operations, never across calls
// into the registry, collectors or release handles.
impl ContributionState {
    fn handle_batch(
        &self,
        batch: &ContributionBatch<WelcomeEntry>,
    ) -> Result<BatchOutcome, ContributionError> {
        let mut outcome = BatchOutcome::default();
        if self.disposed.get() {
            debug!(
                "event=welcome_batch module=contribution status=skipped reason=disposed added={} removed={}",
                batch.added.len(),
                batch.removed.len()
            );
            outcome.ignored = true;
            return Ok(outcome);
        }
        debug!(
            "event=welcome_batch module=contribution status=start added={} removed={}",
            batch.added.len(),
            batch.removed.len()
        );

        for contribution in &batch.removed {
            if !contribution.proposed_api_enabled() {
                continue;
            }
            for welcome in &contribution.value {
                if self.release(welcome.id()) {
                    outcome.released += 1;
                }
            }
        }

        for contribution in &batch.added {
            if !contribution.proposed_api_enabled() {
                warn!(
                    "event=proposed_api_check module=contribution status=rejected extension_id={} extension_point={}",
                    contribution.identifier(),
                    self.config.extension_point
                );
                contribution.collector.error(proposed_api_gate_message(
                    &self.config.extension_point,
                    contribution.identifier(),
                    &self.config.proposed_api_switch,
                ));
                outcome.rejected_sources += 1;
                continue;
            }

            for welcome in &contribution.value {
                if self.release(welcome.id()) {
                    warn!(
                        "event=welcome_replace module=contribution status=ok extension_id={} view={}",
                        contribution.identifier(),
                        welcome.view
                    );
                    outcome.released += 1;
                }

                let content = ViewWelcomeContent {
                    content: welcome.contents.clone(),
                    when: ContextKeyExpr::deserialize(welcome.when.as_deref()),
                };
                let handle = self
                    .registry
                    .register_view_welcome_content(&welcome.view, content)
                    .map_err(|source| {
                        error!(
                            "event=welcome_register module=contribution status=error extension_id={} view={} error={}",
                            contribution.identifier(),
                            welcome.view,
                            source
                        );
                        ContributionError::Registry {
                            extension_id: contribution.identifier().to_string(),
                            view: welcome.view.clone(),
                            source,
                        }
                    })?;
                let previous = self.contents.borrow_mut().insert(welcome.id(), handle);
                if let Some(mut previous) = previous {
                    previous.dispose();
                    outcome.released += 1;
                }
                outcome.registered += 1;
            }
        }

        info!(
            "event=welcome_batch module=contribution status=ok registered={} released={} rejected_sources={} live={}",
            outcome.registered,
            outcome.released,
            outcome.rejected_sources,
            self.contents.borrow().len()
        );
        Ok(outcome)
    }

    fn release(&self, id: EntryId) -> bool {
        let handle = self.contents.borrow_mut().remove(&id);
        match handle {
            Some(mut handle) => {
                handle.dispose();
                true
            }
            None => false,
        }
    }
}

/// Reconciles `viewsWelcome` contributions with a views registry.
pub struct ViewsWelcomeContribution {
    state: Rc<ContributionState>,
}

impl ViewsWelcomeContribution {
    pub fn new(registry: Rc<dyn ViewsRegistry>, config: ReconcilerConfig) -> Self {
        Self {
            state: Rc::new(ContributionState {
                registry,
                config,
                contents: RefCell::new(HashMap::new()),
                disposed: Cell::new(false),
            }),
        }
    }

    /// Subscribes to `extension_point`; every delivered batch is handled
    /// synchronously.
    pub fn attach(
        &self,
        extension_point: &mut ExtensionPoint<WelcomeEntry>,
    ) -> Result<(), ExtensionPointError> {
        let state = Rc::clone(&self.state);
        extension_point.set_handler(move |batch| {
            state.handle_batch(batch)?;
            Ok(())
        })
    }

    /// Processes one batch directly.
    pub fn handle_batch(
        &self,
        batch: &ContributionBatch<WelcomeEntry>,
    ) -> Result<BatchOutcome, ContributionError> {
        self.state.handle_batch(batch)
    }

    /// Releases every live registration. Idempotent.
    pub fn dispose(&self) {
        let was_disposed = self.state.disposed.replace(true);
        let contents = std::mem::take(&mut *self.state.contents.borrow_mut());

        let released = contents.len();
        for (_, mut handle) in contents {
            handle.dispose();
        }
        if !was_disposed {
            info!(
                "event=welcome_dispose module=contribution status=ok released={}",
                released
            );
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.state.disposed.get()
    }

    /// Number of live registrations.
    pub fn live_count(&self) -> usize {
        self.state.contents.borrow().len()
    }

    pub fn is_registered(&self, id: EntryId) -> bool {
        self.state.contents.borrow().contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::{BatchOutcome, ContributionError, ViewsWelcomeContribution};
    use crate::config::ReconcilerConfig;
    use crate::extension::collector::MessageCollector;
    use crate::extension::manifest::ExtensionDescription;
    use crate::extension::point::{ContributionBatch, ContributionSource};
    use crate::model::welcome::{ViewWelcomeContent, WelcomeEntry};
    use crate::registry::{
        InMemoryViewsRegistry, RegistrationHandle, ViewsRegistry, ViewsRegistryResult,
    };
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Registry that records register/release calls in order.
    #[derive(Default)]
    struct JournalRegistry {
        journal: Rc<RefCell<Vec<String>>>,
    }

    impl ViewsRegistry for JournalRegistry {
        fn register_view_welcome_content(
            &self,
            view: &str,
            content: ViewWelcomeContent,
        ) -> ViewsRegistryResult<RegistrationHandle> {
            self.journal
                .borrow_mut()
                .push(format!("register {view} {}", content.content));
            let journal = Rc::clone(&self.journal);
            let label = format!("release {view} {}", content.content);
            Ok(RegistrationHandle::new(move || journal.borrow_mut().push(label)))
        }
    }

    fn source(id: &str, gate: bool, entries: Vec<WelcomeEntry>) -> ContributionSource<WelcomeEntry> {
        ContributionSource::new(
            ExtensionDescription::new(id, "1.0.0").with_proposed_api(gate),
            entries,
            Rc::new(MessageCollector::new(id, "viewsWelcome")),
        )
    }

    fn with_memory_registry() -> (ViewsWelcomeContribution, Rc<InMemoryViewsRegistry>) {
        let registry = Rc::new(InMemoryViewsRegistry::new());
        let contribution = ViewsWelcomeContribution::new(registry.clone(), ReconcilerConfig::default());
        (contribution, registry)
    }

    #[test]
    fn registers_gated_entries_with_compiled_when() {
        let (contribution, registry) = with_memory_registry();
        let entry = WelcomeEntry::new("explorer", "Open folder", Some("!workspaceFolder".into()));
        let id = entry.id();

        let outcome = contribution
            .handle_batch(&ContributionBatch::new(vec![source("acme.tools", true, vec![entry])], vec![]))
            .expect("batch should apply");

        assert_eq!(outcome.registered, 1);
        assert!(contribution.is_registered(id));
        let active = registry.view_welcome_content("explorer");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].when.serialize(), "!workspaceFolder");
    }

    #[test]
    fn removals_run_before_additions() {
        let registry = JournalRegistry::default();
        let journal = Rc::clone(&registry.journal);
        let contribution = ViewsWelcomeContribution::new(Rc::new(registry), ReconcilerConfig::default());

        let entry = WelcomeEntry::new("explorer", "w1", None);
        let first = source("acme.tools", true, vec![entry.clone()]);
        contribution
            .handle_batch(&ContributionBatch::new(vec![first.clone()], vec![]))
            .expect("initial add");

        let outcome = contribution
            .handle_batch(&ContributionBatch::new(vec![first.clone()], vec![first]))
            .expect("update batch");

        assert_eq!(outcome.released, 1);
        assert_eq!(outcome.registered, 1);
        assert_eq!(
            *journal.borrow(),
            vec![
                "register explorer w1".to_string(),
                "release explorer w1".to_string(),
                "register explorer w1".to_string(),
            ]
        );
        assert!(contribution.is_registered(entry.id()));
    }

    #[test]
    fn re_adding_live_entry_releases_previous_handle() {
        let registry = JournalRegistry::default();
        let journal = Rc::clone(&registry.journal);
        let contribution = ViewsWelcomeContribution::new(Rc::new(registry), ReconcilerConfig::default());
        let batch = ContributionBatch::new(
            vec![source("acme.tools", true, vec![WelcomeEntry::new("scm", "w", None)])],
            vec![],
        );

        contribution.handle_batch(&batch).expect("first add");
        contribution.handle_batch(&batch).expect("duplicate add");

        assert_eq!(contribution.live_count(), 1);
        assert_eq!(
            *journal.borrow(),
            vec!["register scm w", "release scm w", "register scm w"]
        );
    }

    #[test]
    fn gate_message_uses_configured_names() {
        let registry = Rc::new(InMemoryViewsRegistry::new());
        let config = ReconcilerConfig {
            extension_point: "customWelcome".to_string(),
            proposed_api_switch: "--allow-proposed".to_string(),
        };
        let contribution = ViewsWelcomeContribution::new(registry, config);
        let gated = source("acme.tools", false, vec![WelcomeEntry::new("scm", "w", None)]);

        let outcome = contribution
            .handle_batch(&ContributionBatch::new(vec![gated.clone()], vec![]))
            .expect("gated batch should not fail");

        assert_eq!(outcome.rejected_sources, 1);
        let errors = gated.collector.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("'customWelcome'"));
        assert!(errors[0].message.ends_with("--allow-proposed acme.tools"));
    }

    #[test]
    fn registry_failure_propagates_and_keeps_earlier_entries() {
        let (contribution, registry) = with_memory_registry();
        let good = WelcomeEntry::new("explorer", "ok", None);
        let bad = WelcomeEntry::new("   ", "bad", None);
        let trailing = WelcomeEntry::new("scm", "never", None);

        let err = contribution
            .handle_batch(&ContributionBatch::new(
                vec![source("acme.tools", true, vec![good.clone(), bad.clone(), trailing.clone()])],
                vec![],
            ))
            .expect_err("invalid view must propagate");

        assert!(matches!(err, ContributionError::Registry { ref extension_id, .. } if extension_id == "acme.tools"));
        assert!(contribution.is_registered(good.id()));
        assert!(!contribution.is_registered(bad.id()));
        assert!(!contribution.is_registered(trailing.id()));
        assert_eq!(registry.len(), 1);
    }

    type Observed = Rc<RefCell<Option<Rc<ViewsWelcomeContribution>>>>;

    /// Registry whose register and release callbacks query the reconciler
    /// that drives them.
    #[derive(Default)]
    struct ObservingRegistry {
        observer: Observed,
        seen: Rc<RefCell<Vec<String>>>,
    }

    fn observed_live(observer: &Observed) -> usize {
        observer
            .borrow()
            .as_ref()
            .map_or(usize::MAX, |contribution| contribution.live_count())
    }

    impl ViewsRegistry for ObservingRegistry {
        fn register_view_welcome_content(
            &self,
            _view: &str,
            _content: ViewWelcomeContent,
        ) -> ViewsRegistryResult<RegistrationHandle> {
            let live = observed_live(&self.observer);
            self.seen.borrow_mut().push(format!("register live={live}"));
            let observer = Rc::clone(&self.observer);
            let seen = Rc::clone(&self.seen);
            Ok(RegistrationHandle::new(move || {
                let live = observed_live(&observer);
                seen.borrow_mut().push(format!("release live={live}"));
            }))
        }
    }

    #[test]
    fn registry_callbacks_may_query_the_reconciler() {
        let registry = ObservingRegistry::default();
        let observer = Rc::clone(&registry.observer);
        let seen = Rc::clone(&registry.seen);
        let contribution = Rc::new(ViewsWelcomeContribution::new(
            Rc::new(registry),
            ReconcilerConfig::default(),
        ));
        *observer.borrow_mut() = Some(Rc::clone(&contribution));

        let first = WelcomeEntry::new("a", "1", None);
        let second = WelcomeEntry::new("b", "2", None);
        contribution
            .handle_batch(&ContributionBatch::new(
                vec![source("acme.tools", true, vec![first.clone(), second])],
                vec![],
            ))
            .expect("add batch");
        contribution
            .handle_batch(&ContributionBatch::new(
                vec![],
                vec![source("acme.tools", true, vec![first])],
            ))
            .expect("remove batch");
        contribution.dispose();
        observer.borrow_mut().take();

        assert_eq!(
            *seen.borrow(),
            vec![
                "register live=0",
                "register live=1",
                "release live=1",
                "release live=0",
            ]
        );
    }

    #[test]
    fn dispose_releases_everything_once_and_ignores_later_batches() {
        let registry = JournalRegistry::default();
        let journal = Rc::clone(&registry.journal);
        let contribution = ViewsWelcomeContribution::new(Rc::new(registry), ReconcilerConfig::default());
        contribution
            .handle_batch(&ContributionBatch::new(
                vec![source(
                    "acme.tools",
                    true,
                    vec![WelcomeEntry::new("a", "1", None), WelcomeEntry::new("b", "2", None)],
                )],
                vec![],
            ))
            .expect("add batch");

        contribution.dispose();
        contribution.dispose();
        assert!(contribution.is_disposed());
        assert_eq!(contribution.live_count(), 0);
        let releases = journal
            .borrow()
            .iter()
            .filter(|line| line.starts_with("release"))
            .count();
        assert_eq!(releases, 2);

        let outcome = contribution
            .handle_batch(&ContributionBatch::new(
                vec![source("acme.other", true, vec![WelcomeEntry::new("c", "3", None)])],
                vec![],
            ))
            .expect("batches after dispose are ignored without error");
        assert_eq!(
            outcome,
            BatchOutcome {
                ignored: true,
                ..BatchOutcome::default()
            }
        );
        assert_eq!(contribution.live_count(), 0);
        assert_eq!(journal.borrow().len(), 4);
    }
}
