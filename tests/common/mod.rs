#![allow(dead_code)]

use std::sync::Arc;

use conduct_runtime::prelude::*;
use parking_lot::Mutex;

#[derive(Default)]
pub struct Blank;
impl Behavior for Blank {}

/// Type with a `Blank` payload and the given dependencies.
pub fn blank(name: &str, deps: &[&str]) -> TypeDef {
    TypeDef::of::<Blank>(name).depends_on(deps.iter().copied())
}

pub fn registry() -> Registry {
    let registry = Registry::new();
    registry.register(blank("Scene", &[])).unwrap();
    registry
}

pub fn manager(registry: Registry) -> Manager {
    Manager::builder().registry(Arc::new(registry)).build()
}

/// Fresh manager over `registry` plus its root scene.
pub fn scene(registry: Registry) -> (Manager, Arc<Unit>) {
    let manager = manager(registry);
    let root = manager.init_root().unwrap();
    (manager, root)
}

pub fn ids(units: &[Arc<Unit>]) -> Vec<String> {
    units.iter().map(|u| u.id().to_string()).collect()
}

pub fn types(units: &[Arc<Unit>]) -> Vec<String> {
    units.iter().map(|u| u.type_name().to_string()).collect()
}

/// Shared log hooks write into.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}
