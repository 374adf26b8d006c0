//! Promotion of pending child slots to constructed units.
//!
//! Activating one child can satisfy several of its siblings at once, and a
//! freshly built unit can have pending children of its own, so a parent's
//! pending map is re-scanned until a whole pass constructs nothing. Slots that
//! never become satisfiable (missing siblings, dependency cycles) just stay
//! pending and show up in [`Manager::stalled`].

use std::{collections::HashSet, sync::Arc};

use tracing::{debug, debug_span, info, trace, warn};

use crate::{
    consts::PROPS,
    manager::{ActivationReport, Manager},
    prelude::{Collaborator, Result, RuntimeError},
    registry::{TypeName, TypeRecord},
    unit::{Dependency, Props, Resolved, Unit, UnitContext, UnitId},
};

/// Slots that failed during the current run, by parent id and child type.
type Failed = HashSet<(UnitId, TypeName)>;

impl Manager {
    /// Construct a root unit of `type_name`. Roots may only depend on `PROPS`.
    ///
    /// Event registration failures for the root are logged, not returned; the
    /// root stays active either way.
    pub fn init_root_as(&self, type_name: &str) -> Result<Arc<Unit>> {
        let record = self.registry().get(type_name)?;
        if let Some(dep) = record.dependencies().iter().find(|d| &***d != PROPS) {
            return Err(RuntimeError::InvalidArgument {
                name: type_name.to_string(),
                reason: Some(format!("a root cannot depend on sibling {dep}")),
            });
        }
        let values = record
            .dependencies()
            .iter()
            .map(|_| Dependency::Props(Props::new()))
            .collect();
        let unit = self.construct(&record, Resolved::new(record.name().into(), values))?;
        self.tree().insert_root(unit.clone())?;
        info!(id = %unit.id(), "Initialized root {}", record.name());

        let mut report = ActivationReport::default();
        self.awaken(&unit, &mut report);
        if !report.is_clean() {
            warn!(id = %unit.id(), failures = report.failures.len(), "Root activated with event failures");
        }
        Ok(unit)
    }

    /// Run the fixpoint over the pending children of `parent` and, recursively, of everything it builds.
    pub(crate) fn run_activation(&self, parent: &str) -> ActivationReport {
        let span = debug_span!("activate", parent_id = parent);
        let _enter = span.enter();

        let mut report = ActivationReport::default();
        let mut failed = HashSet::new();
        self.activate_children(parent, &mut report, &mut failed);
        debug!(
            activated = report.activated.len(),
            failures = report.failures.len(),
            "Activation finished"
        );
        report
    }

    fn activate_children(
        &self,
        parent: &str,
        report: &mut ActivationReport,
        failed: &mut Failed,
    ) {
        loop {
            let snapshot = {
                let tree = self.tree();
                match tree.key_of(parent) {
                    Some(key) => tree.pending(key),
                    None => return,
                }
            };

            let mut promoted = false;
            for child in &snapshot {
                match self.try_activate(parent, child, report, failed) {
                    Ok(Some(unit)) => {
                        promoted = true;
                        report.activated.push(unit.id().clone());
                        self.activate_children(unit.id().as_str(), report, failed);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(parent_id = parent, child = %child, "Activation aborted: {err}");
                        report.failures.push(err);
                    }
                }
            }

            if !promoted {
                break;
            }
        }
    }

    /// Build and promote one pending slot if its dependencies are met.
    ///
    /// `Ok(None)` means the slot is not ready, already gone, or failed earlier in this run.
    fn try_activate(
        &self,
        parent: &str,
        child: &TypeName,
        report: &mut ActivationReport,
        failed: &mut Failed,
    ) -> Result<Option<Arc<Unit>>> {
        let slot = (UnitId::from(parent), child.clone());
        if failed.contains(&slot) {
            return Ok(None);
        }
        let (key, record, resolved) = {
            let tree = self.tree();
            let Some(parent_node) = tree.node_of(parent) else {
                return Ok(None);
            };
            let Some(&key) = parent_node.pending_children.get(child) else {
                return Ok(None);
            };
            let record = match self.registry().get(child) {
                Ok(record) => record,
                Err(err) => {
                    failed.insert(slot);
                    return Err(err);
                }
            };
            if !parent_node.can_activate(&record) {
                trace!(parent_id = parent, child = %child, missing = ?parent_node.missing(&record), "Not ready");
                return Ok(None);
            }
            let resolved = Resolved::new(child.clone(), parent_node.resolve(&record));
            (key, record, resolved)
        };

        let unit = match self.construct(&record, resolved) {
            Ok(unit) => unit,
            Err(err) => {
                failed.insert(slot);
                return Err(err);
            }
        };

        let promoted = {
            let mut tree = self.tree();
            match tree.key_of(parent) {
                Some(parent_key) => tree.promote(parent_key, &record, key, unit.clone()),
                None => Ok(None),
            }
        };
        match promoted {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(parent_id = parent, child = %child, "Slot or dependency vanished while building; dropping {}", unit.id());
                return Ok(None);
            }
            Err(err) => {
                failed.insert(slot);
                return Err(err);
            }
        }

        debug!(parent_id = parent, id = %unit.id(), "Activated {child}");
        self.awaken(&unit, report);
        Ok(Some(unit))
    }

    /// Factory first, then identity. Nothing touches the tree here.
    fn construct(&self, record: &TypeRecord, resolved: Resolved) -> Result<Arc<Unit>> {
        let behavior = record.build(resolved).map_err(|err| match err {
            err @ RuntimeError::FactoryFailed { .. } => err,
            other => RuntimeError::factory(record.name(), other),
        })?;
        let id = self
            .identity()
            .generate_id(record.name())
            .map_err(|err| match err {
                err @ RuntimeError::IntegrationFailure { .. } => err,
                other => RuntimeError::integration(Collaborator::Identity, record.name(), other),
            })?;
        Ok(Arc::new(Unit::new(id, record.name().into(), behavior)))
    }

    /// Wire events, then run the awake hook. Event failures never undo the activation.
    fn awaken(&self, unit: &Arc<Unit>, report: &mut ActivationReport) {
        let events = self.events();
        match events.registered_events(unit.type_name()) {
            Ok(descriptors) => {
                for descriptor in descriptors {
                    if let Err(err) = events.register_component(&descriptor, unit) {
                        warn!(id = %unit.id(), event = descriptor.name(), "Event registration failed: {err}");
                        report.failures.push(RuntimeError::integration(
                            Collaborator::Events,
                            unit.type_name(),
                            err,
                        ));
                    }
                }
            }
            Err(err) => {
                warn!(id = %unit.id(), "Could not list events: {err}");
                report.failures.push(RuntimeError::integration(
                    Collaborator::Events,
                    unit.type_name(),
                    err,
                ));
            }
        }

        unit.raw_behavior().on_awake(&UnitContext::new(self, unit));
    }
}
