use std::{fmt::Debug, sync::Arc};

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::{
    assembler::{Slot, StalledChild, Tree},
    config::RuntimeConfig,
    events::{EventDirectory, NoEvents},
    identity::{IdentityService, SequentialIds},
    prelude::{Result, RuntimeError},
    registry::{self, Registry, TypeName},
    unit::{Props, Unit, UnitId},
};

/// Root orchestrator and the only public way into the unit tree.
///
/// Cheap to clone; all clones share one tree. Every tree mutation happens
/// under a single lock that is never held while user code (factories, hooks,
/// collaborators) runs.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<Registry>,
    identity: Box<dyn IdentityService>,
    events: Box<dyn EventDirectory>,
    config: RuntimeConfig,
    tree: Mutex<Tree>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("units", &self.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct ManagerBuilder {
    registry: Option<Arc<Registry>>,
    identity: Option<Box<dyn IdentityService>>,
    events: Option<Box<dyn EventDirectory>>,
    config: RuntimeConfig,
}

impl ManagerBuilder {
    /// Defaults to [`registry::global`].
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn identity(mut self, identity: impl IdentityService + 'static) -> Self {
        self.identity = Some(Box::new(identity));
        self
    }

    pub fn events(mut self, events: impl EventDirectory + 'static) -> Self {
        self.events = Some(Box::new(events));
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Manager {
        Manager {
            inner: Arc::new(Inner {
                registry: self.registry.unwrap_or_else(registry::global),
                identity: self
                    .identity
                    .unwrap_or_else(|| Box::new(SequentialIds::new())),
                events: self.events.unwrap_or_else(|| Box::new(NoEvents)),
                config: self.config,
                tree: Mutex::new(Tree::default()),
            }),
        }
    }
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::default()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn identity(&self) -> &dyn IdentityService {
        &*self.inner.identity
    }

    pub(crate) fn events(&self) -> &dyn EventDirectory {
        &*self.inner.events
    }

    pub(crate) fn tree(&self) -> MutexGuard<'_, Tree> {
        self.inner.tree.lock()
    }

    /// Construct a new root of the configured root type.
    pub fn init_root(&self) -> Result<Arc<Unit>> {
        let root_type = self.inner.config.root_type.clone();
        self.init_root_as(&root_type)
    }

    /// Reserve a `type_name` slot under `parent_id`.
    ///
    /// Nothing is constructed until the returned trigger fires. A slot that is
    /// already taken, pending or active, yields a no-op trigger.
    pub fn attach(&self, type_name: &str, parent_id: &str) -> Result<Trigger> {
        let mut tree = self.tree();
        let parent_key = tree
            .key_of(parent_id)
            .ok_or_else(|| RuntimeError::UnknownParent {
                id: parent_id.to_string(),
            })?;
        let record = self.registry().get(type_name)?;
        let type_name: TypeName = record.name().into();
        match tree.attach(parent_key, type_name.clone())? {
            Slot::Occupied => {
                debug!(parent_id, child = %type_name, "Slot already taken; attach is a no-op");
                Ok(Trigger::noop())
            }
            Slot::Created(_) => {
                debug!(parent_id, child = %type_name, "Attached pending slot");
                let parent = tree
                    .unit(parent_id)
                    .map(|u| u.id().clone())
                    .unwrap_or_else(|| UnitId::from(parent_id));
                Ok(Trigger {
                    target: Some(TriggerTarget {
                        manager: self.clone(),
                        parent,
                        type_name,
                    }),
                })
            }
        }
    }

    /// Active child of type `type_name` under `from_id`.
    pub fn get(&self, type_name: &str, from_id: &str) -> Option<Arc<Unit>> {
        let tree = self.tree();
        tree.node_of(from_id)?
            .active_children
            .get(type_name)
            .map(|active| active.unit.clone())
    }

    /// Active children in attach order. Unknown ids have none.
    pub fn children(&self, id: &str) -> Vec<Arc<Unit>> {
        let tree = self.tree();
        tree.node_of(id)
            .map(|node| {
                node.active_children
                    .values()
                    .map(|active| active.unit.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn parent(&self, id: &str) -> Option<Arc<Unit>> {
        let tree = self.tree();
        let parent = tree.node_of(id)?.parent?;
        tree.unit_at(parent).cloned()
    }

    pub fn find(&self, id: &str) -> Option<Arc<Unit>> {
        self.tree().unit(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tree().key_of(id).is_some()
    }

    /// Number of live units.
    pub fn len(&self) -> usize {
        self.tree().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Types attached under `id` that are not constructed yet.
    pub fn pending(&self, id: &str) -> Vec<TypeName> {
        let tree = self.tree();
        tree.key_of(id)
            .map(|key| tree.pending(key))
            .unwrap_or_default()
    }

    /// Every pending slot in the tree together with the siblings it still waits for.
    pub fn stalled(&self) -> Vec<StalledChild> {
        let registry = self.registry().clone();
        self.tree().stalled(|type_name| registry.get(type_name).ok())
    }
}

/// Outcome of one activation run.
#[derive(Debug, Default)]
pub struct ActivationReport {
    /// Units constructed by the run, descendants included, in activation order.
    pub activated: Vec<UnitId>,
    /// Units that could not be constructed plus event registrations that failed.
    pub failures: Vec<RuntimeError>,
}

impl ActivationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct TriggerTarget {
    manager: Manager,
    parent: UnitId,
    type_name: TypeName,
}

/// Returned by [`Manager::attach`]. Firing supplies the slot's parameters and runs activation.
#[must_use = "nothing is constructed until the trigger fires"]
pub struct Trigger {
    target: Option<TriggerTarget>,
}

impl Trigger {
    fn noop() -> Self {
        Self { target: None }
    }

    pub fn is_noop(&self) -> bool {
        self.target.is_none()
    }

    /// Store `props` (empty if `None`) for the slot and run activation on its parent.
    ///
    /// May be fired again; the latest bag wins for slots that are still pending.
    pub fn fire(&self, props: Option<Props>) -> Result<ActivationReport> {
        let Some(target) = &self.target else {
            return Ok(ActivationReport::default());
        };
        {
            let mut tree = target.manager.tree();
            let parent = tree
                .key_of(target.parent.as_str())
                .ok_or_else(|| RuntimeError::UnknownParent {
                    id: target.parent.to_string(),
                })?;
            let mut props = props.unwrap_or_default();
            props.set_parent_id(target.parent.as_str());
            tree.supply(parent, target.type_name.clone(), props)?;
        }
        Ok(target.manager.run_activation(target.parent.as_str()))
    }

    pub fn fire_with(&self, props: Props) -> Result<ActivationReport> {
        self.fire(Some(props))
    }

    pub fn activate(&self) -> Result<ActivationReport> {
        self.fire(None)
    }
}

impl Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            Some(t) => write!(f, "Trigger({} under {})", t.type_name, t.parent),
            None => write!(f, "Trigger(noop)"),
        }
    }
}
