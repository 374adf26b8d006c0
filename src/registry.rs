//! Static catalog of unit types.
//!
//! Types are registered explicitly at startup, before anything is attached.
//! Inheritance is declared up front with [`TypeDef::extends`] and stored as an
//! ancestor list on the record, so required-child lookups only ever walk that
//! list.

use std::sync::{Arc, OnceLock};

use dashmap::{DashMap, mapref::entry::Entry};
use indexmap::IndexSet;
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    consts::PROPS,
    prelude::{NResult, Result, RuntimeError},
    unit::{Behavior, Resolved},
};

pub type TypeName = Arc<str>;

/// Builds the payload of a unit from its resolved dependencies.
pub type Factory = Arc<dyn Fn(Resolved) -> Result<Box<dyn Behavior>> + Send + Sync>;

/// Registered metadata for one unit type.
#[derive(Clone)]
pub struct TypeRecord {
    name: TypeName,
    dependencies: SmallVec<[TypeName; 4]>,
    /// Nearest base first.
    ancestors: SmallVec<[TypeName; 2]>,
    required_children: IndexSet<TypeName>,
    factory: Factory,
}

impl TypeRecord {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[TypeName] {
        &self.dependencies
    }

    pub fn ancestors(&self) -> &[TypeName] {
        &self.ancestors
    }

    pub fn required_children(&self) -> impl Iterator<Item = &str> {
        self.required_children.iter().map(|c| &**c)
    }

    /// Only this record's own declarations; see [`Registry::requires`] for the inherited view.
    pub fn declares_required(&self, child: &str) -> bool {
        self.required_children.contains(child)
    }

    pub(crate) fn build(&self, resolved: Resolved) -> Result<Box<dyn Behavior>> {
        (self.factory)(resolved)
    }
}

impl std::fmt::Debug for TypeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRecord")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("ancestors", &self.ancestors)
            .field("required_children", &self.required_children)
            .finish_non_exhaustive()
    }
}

/// Declaration handed to [`Registry::register`].
pub struct TypeDef {
    name: TypeName,
    dependencies: SmallVec<[TypeName; 4]>,
    base: Option<TypeName>,
    required_children: IndexSet<TypeName>,
    factory: Factory,
}

impl TypeDef {
    pub fn new<F>(name: &str, factory: F) -> Self
    where
        F: Fn(Resolved) -> Result<Box<dyn Behavior>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            dependencies: SmallVec::new(),
            base: None,
            required_children: IndexSet::new(),
            factory: Arc::new(factory),
        }
    }

    /// Type whose payload is built with `Default` and ignores its dependencies.
    pub fn of<T: Behavior + Default>(name: &str) -> Self {
        Self::new(name, |_| Ok(Box::new(T::default())))
    }

    /// Dependency names in the order the factory receives them. Use [`PROPS`] for the parameter bag.
    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dependencies
            .extend(names.into_iter().map(|n| TypeName::from(n.as_ref())));
        self
    }

    pub fn extends(mut self, base: &str) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn requires_child(mut self, child: &str) -> Self {
        self.required_children.insert(child.into());
        self
    }
}

#[derive(Default)]
pub struct Registry {
    records: DashMap<TypeName, Arc<TypeRecord>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, def: TypeDef) -> NResult {
        if def.name.is_empty() || &*def.name == PROPS {
            return Err(RuntimeError::InvalidArgument {
                name: def.name.to_string(),
                reason: Some("reserved or empty type name".into()),
            });
        }

        let mut ancestors = SmallVec::new();
        if let Some(base) = def.base {
            let base_record = self.get(&base)?;
            ancestors.push(base);
            ancestors.extend(base_record.ancestors.iter().cloned());
        }

        let record = TypeRecord {
            name: def.name.clone(),
            dependencies: def.dependencies,
            ancestors,
            required_children: def.required_children,
            factory: def.factory,
        };

        match self.records.entry(def.name) {
            Entry::Occupied(slot) => Err(RuntimeError::DuplicateRegistration {
                type_name: slot.key().to_string(),
            }),
            Entry::Vacant(slot) => {
                debug!(type_name = %record.name, deps = ?record.dependencies, "Registered unit type");
                slot.insert(Arc::new(record));
                Ok(())
            }
        }
    }

    pub fn add_required_child(&self, type_name: &str, child: &str) -> NResult {
        let mut record = self
            .records
            .get_mut(type_name)
            .ok_or_else(|| RuntimeError::unknown_type(type_name))?;
        Arc::make_mut(&mut *record)
            .required_children
            .insert(child.into());
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Result<Arc<TypeRecord>> {
        self.records
            .get(type_name)
            .map(|r| r.value().clone())
            .ok_or_else(|| RuntimeError::unknown_type(type_name))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.records.contains_key(type_name)
    }

    /// Own type followed by every registered ancestor.
    pub fn chain(&self, type_name: &str) -> Result<Vec<TypeName>> {
        let record = self.get(type_name)?;
        let mut chain = Vec::with_capacity(record.ancestors.len() + 1);
        chain.push(record.name.clone());
        chain.extend(record.ancestors.iter().cloned());
        Ok(chain)
    }

    /// Whether `type_name` or any of its ancestors declares `child` as required.
    ///
    /// Required sets are read now, not at registration, so a requirement added
    /// to a base later is still inherited.
    pub fn requires(&self, type_name: &str, child: &str) -> bool {
        let Ok(chain) = self.chain(type_name) else {
            return false;
        };
        chain.iter().any(|name| {
            self.records
                .get(&**name)
                .is_some_and(|r| r.declares_required(child))
        })
    }

    /// [`Registry::requires`] for any type on `child`'s own chain.
    pub fn requires_any(&self, type_name: &str, child: &str) -> bool {
        match self.chain(child) {
            Ok(child_chain) => child_chain.iter().any(|c| self.requires(type_name, c)),
            Err(_) => self.requires(type_name, child),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn type_names(&self) -> Vec<TypeName> {
        self.records.iter().map(|r| r.key().clone()).collect()
    }
}

static GLOBAL_REGISTRY: OnceLock<Arc<Registry>> = OnceLock::new();

/// The process-wide registry. Created on first use and kept for the lifetime of the process.
pub fn global() -> Arc<Registry> {
    GLOBAL_REGISTRY
        .get_or_init(|| Arc::new(Registry::new()))
        .clone()
}
