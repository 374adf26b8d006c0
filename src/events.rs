use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    prelude::{NResult, Result},
    registry::TypeName,
    unit::{Unit, UnitId},
};

/// Opaque to the runtime; only passed back to the directory it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventDescriptor {
    name: Arc<str>,
}

impl EventDescriptor {
    pub fn new(name: &str) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Where freshly activated units get wired to the events their type provides.
///
/// Registration is fire-and-forget from the runtime's side: a failure is
/// reported but the unit stays active.
pub trait EventDirectory: Send + Sync {
    fn registered_events(&self, type_name: &str) -> Result<Vec<EventDescriptor>>;

    fn register_component(&self, descriptor: &EventDescriptor, unit: &Arc<Unit>) -> NResult;

    fn unit_deactivated(&self, _unit: &Unit) {}

    fn unit_destroyed(&self, _id: &UnitId) {}
}

/// Lets a caller keep a handle to the directory it gave the manager.
impl<T: EventDirectory + ?Sized> EventDirectory for Arc<T> {
    fn registered_events(&self, type_name: &str) -> Result<Vec<EventDescriptor>> {
        (**self).registered_events(type_name)
    }

    fn register_component(&self, descriptor: &EventDescriptor, unit: &Arc<Unit>) -> NResult {
        (**self).register_component(descriptor, unit)
    }

    fn unit_deactivated(&self, unit: &Unit) {
        (**self).unit_deactivated(unit)
    }

    fn unit_destroyed(&self, id: &UnitId) {
        (**self).unit_destroyed(id)
    }
}

/// Directory with no events at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvents;

impl EventDirectory for NoEvents {
    fn registered_events(&self, _type_name: &str) -> Result<Vec<EventDescriptor>> {
        Ok(Vec::new())
    }

    fn register_component(&self, _descriptor: &EventDescriptor, _unit: &Arc<Unit>) -> NResult {
        Ok(())
    }
}

/// In-process directory. Inactive and destroyed units are dropped from every subscription.
#[derive(Default)]
pub struct InMemoryEvents {
    declared: DashMap<TypeName, Vec<EventDescriptor>>,
    subscribers: DashMap<EventDescriptor, Vec<UnitId>>,
}

impl InMemoryEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Units of `type_name` will be subscribed to `descriptor` when they activate.
    pub fn declare(&self, type_name: &str, descriptor: EventDescriptor) {
        let mut events = self.declared.entry(type_name.into()).or_default();
        if !events.contains(&descriptor) {
            events.push(descriptor);
        }
    }

    pub fn subscribers(&self, descriptor: &EventDescriptor) -> Vec<UnitId> {
        self.subscribers
            .get(descriptor)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    fn drop_unit(&self, id: &UnitId) {
        for mut entry in self.subscribers.iter_mut() {
            entry.value_mut().retain(|s| s != id);
        }
    }
}

impl EventDirectory for InMemoryEvents {
    fn registered_events(&self, type_name: &str) -> Result<Vec<EventDescriptor>> {
        Ok(self
            .declared
            .get(type_name)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }

    fn register_component(&self, descriptor: &EventDescriptor, unit: &Arc<Unit>) -> NResult {
        let mut subscribers = self.subscribers.entry(descriptor.clone()).or_default();
        if !subscribers.contains(unit.id()) {
            subscribers.push(unit.id().clone());
        }
        Ok(())
    }

    fn unit_deactivated(&self, unit: &Unit) {
        self.drop_unit(unit.id());
    }

    fn unit_destroyed(&self, id: &UnitId) {
        self.drop_unit(id);
    }
}
