pub mod props;

use std::{
    any::Any,
    borrow::Borrow,
    fmt::{self, Debug, Display},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    manager::{Manager, Trigger},
    prelude::{Result, RuntimeError},
    registry::TypeName,
};

pub use self::props::Props;

/// Globally unique unit identity, handed out by an [`IdentityService`](crate::identity::IdentityService).
///
/// Opaque to the runtime. Lookups accept plain `&str` through [`Borrow`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(Arc<str>);

impl UnitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for UnitId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for UnitId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UnitId {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl From<&str> for UnitId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl PartialEq<str> for UnitId {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for UnitId {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Payload of a unit. Everything concrete (transforms, scene data, ...) lives behind this trait.
///
/// Hooks run without any runtime lock held, so they are free to call back
/// into the [`Manager`] through the context: attach children, look up
/// siblings, deactivate descendants.
pub trait Behavior: AsAny + Send + Sync {
    /// Called once, right after the unit became active and got its id.
    fn on_awake(&self, _ctx: &UnitContext<'_>) {}

    /// Per-frame hook. Dispatching frames is up to the host.
    fn update(&self, _ctx: &UnitContext<'_>) {}

    /// Descendants are not touched by the runtime on deactivate; do it here if needed.
    fn on_deactivate(&self, _ctx: &UnitContext<'_>) {}

    /// The unit already left the tree when this runs.
    fn on_destroy(&self, _ctx: &UnitContext<'_>) {}
}

/// A live, constructed unit.
pub struct Unit {
    id: UnitId,
    type_name: TypeName,
    active: AtomicBool,
    behavior: Box<dyn Behavior>,
}

impl Unit {
    pub(crate) fn new(id: UnitId, type_name: TypeName, behavior: Box<dyn Behavior>) -> Self {
        Self {
            id,
            type_name,
            active: AtomicBool::new(true),
            behavior,
        }
    }

    pub fn id(&self) -> &UnitId {
        &self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Returns the previous flag.
    pub(crate) fn set_active(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::AcqRel)
    }

    /// Downcast the payload.
    pub fn behavior<T: Behavior>(&self) -> Option<&T> {
        AsAny::as_any(&*self.behavior).downcast_ref::<T>()
    }

    pub(crate) fn raw_behavior(&self) -> &dyn Behavior {
        &*self.behavior
    }

    /// Runs the update hook if the unit is still active. Returns whether it ran.
    pub fn update(self: &Arc<Self>, manager: &Manager) -> bool {
        if !self.is_active() {
            return false;
        }
        self.behavior.update(&UnitContext::new(manager, self));
        true
    }
}

impl Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Handle given to [`Behavior`] hooks.
pub struct UnitContext<'a> {
    manager: &'a Manager,
    unit: &'a Arc<Unit>,
}

impl<'a> UnitContext<'a> {
    pub(crate) fn new(manager: &'a Manager, unit: &'a Arc<Unit>) -> Self {
        Self { manager, unit }
    }

    pub fn manager(&self) -> &'a Manager {
        self.manager
    }

    pub fn unit(&self) -> &'a Arc<Unit> {
        self.unit
    }

    pub fn id(&self) -> &'a UnitId {
        self.unit.id()
    }

    /// Attach a child slot under this unit.
    pub fn attach(&self, type_name: &str) -> Result<Trigger> {
        self.manager.attach(type_name, self.unit.id().as_str())
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<Unit>> {
        self.manager.get(type_name, self.unit.id().as_str())
    }

    pub fn children(&self) -> Vec<Arc<Unit>> {
        self.manager.children(self.unit.id().as_str())
    }

    pub fn parent(&self) -> Option<Arc<Unit>> {
        self.manager.parent(self.unit.id().as_str())
    }
}

/// One resolved dependency value.
#[derive(Debug, Clone)]
pub enum Dependency {
    /// Live sibling instance.
    Unit(Arc<Unit>),
    /// The bag supplied for this slot, empty if none was.
    Props(Props),
}

/// Dependency values handed to a factory, in declared order.
#[derive(Debug, Clone)]
pub struct Resolved {
    type_name: TypeName,
    values: Vec<Dependency>,
}

impl Resolved {
    pub(crate) fn new(type_name: TypeName, values: Vec<Dependency>) -> Self {
        Self { type_name, values }
    }

    /// The type being constructed.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Dependency> {
        self.values.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
        self.values.iter()
    }

    pub fn into_values(self) -> Vec<Dependency> {
        self.values
    }

    pub fn unit(&self, index: usize) -> Result<Arc<Unit>> {
        match self.values.get(index) {
            Some(Dependency::Unit(unit)) => Ok(unit.clone()),
            _ => Err(self.mismatch(index, "sibling unit")),
        }
    }

    pub fn props(&self, index: usize) -> Result<Props> {
        match self.values.get(index) {
            Some(Dependency::Props(props)) => Ok(props.clone()),
            _ => Err(self.mismatch(index, "props")),
        }
    }

    /// Sibling payload at `index`, downcast to `T`.
    pub fn behavior<T: Behavior>(&self, index: usize) -> Result<&T> {
        match self.values.get(index) {
            Some(Dependency::Unit(unit)) => unit
                .behavior::<T>()
                .ok_or_else(|| self.mismatch(index, std::any::type_name::<T>())),
            _ => Err(self.mismatch(index, std::any::type_name::<T>())),
        }
    }

    fn mismatch(&self, index: usize, expected: &str) -> RuntimeError {
        RuntimeError::InvalidArgument {
            name: format!("{}[{index}]", self.type_name),
            reason: Some(format!("expected {expected}")),
        }
    }
}
