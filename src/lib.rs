#![warn(clippy::correctness)]
#![warn(clippy::suspicious)]
#![warn(clippy::perf)]
#![warn(clippy::style)]

//! Live parent/child tree of units whose construction waits for their dependencies.
//!
//! Register unit types in a [`Registry`](registry::Registry), create a root,
//! then [`attach`](manager::Manager::attach) child slots and fire their
//! triggers. A slot is built as soon as every sibling it depends on is active.

/// Pending/active node bookkeeping, activation and lifecycle cascades.
pub mod assembler;
pub mod config;
pub mod consts;
pub mod events;
pub mod identity;
pub mod logging;
pub mod manager;
pub mod registry;
pub mod unit;
pub mod utils;

pub mod prelude {
    pub use crate::assembler::StalledChild;
    pub use crate::config::RuntimeConfig;
    pub use crate::consts::PROPS;
    pub use crate::events::{EventDescriptor, EventDirectory, InMemoryEvents, NoEvents};
    pub use crate::identity::{IdentityService, SequentialIds};
    pub use crate::manager::{ActivationReport, Manager, ManagerBuilder, Trigger};
    pub use crate::registry::{Registry, TypeDef, TypeName, TypeRecord};
    pub use crate::unit::{Behavior, Dependency, Props, Resolved, Unit, UnitContext, UnitId};
    pub use crate::utils::errors::{Collaborator, NResult, Result, RuntimeError};
}
