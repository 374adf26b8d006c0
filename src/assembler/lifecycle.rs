//! Deactivation and destruction.
//!
//! Both cascade upward only: when a parent's type (or one of its ancestor
//! types) lists the affected unit's type as a required child, the parent
//! goes too. Going down the tree is left to each unit's hooks on deactivate;
//! on destroy the parent's node simply takes the nodes it owns with it.

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    manager::Manager,
    prelude::NResult,
    unit::{Unit, UnitContext},
};

impl Manager {
    /// Flag `id` inactive and deactivate every parent that requires it.
    ///
    /// The unit keeps its slot in the parent. Unknown or already inactive ids are a no-op.
    pub fn deactivate(&self, id: &str) -> NResult {
        let Some(unit) = self.find(id) else {
            debug!(id, "Deactivate on unknown unit ignored");
            return Ok(());
        };
        if !unit.set_active(false) {
            return Ok(());
        }
        debug!(id, "Deactivated {}", unit.type_name());

        self.events().unit_deactivated(&unit);
        unit.raw_behavior()
            .on_deactivate(&UnitContext::new(self, &unit));

        if let Some(parent) = self.required_by_parent(&unit) {
            debug!(id, parent_id = %parent.id(), "Parent requires {}; deactivating it", unit.type_name());
            self.deactivate(parent.id().as_str())?;
        }
        Ok(())
    }

    /// Remove `id` from the tree, after destroying every parent that requires it.
    ///
    /// Descendants owned by the removed node leave the tree with it. Unknown
    /// ids, including ones already removed by the cascade, are a no-op.
    pub fn destroy(&self, id: &str) -> NResult {
        let Some(unit) = self.find(id) else {
            return Ok(());
        };

        if let Some(parent) = self.required_by_parent(&unit) {
            debug!(id, parent_id = %parent.id(), "Parent requires {}; destroying it first", unit.type_name());
            self.destroy(parent.id().as_str())?;
        }

        let removed = self.tree().remove(id);
        if !removed.is_empty() {
            info!(id, removed = removed.len(), "Destroyed {}", unit.type_name());
        }
        self.retire(&removed);
        Ok(())
    }

    /// Drop every unit and node, running the destroy path for each removed unit.
    ///
    /// The registry is left alone.
    pub fn restart(&self) {
        let removed = self.tree().drain();
        info!(units = removed.len(), "Restarting unit tree");
        self.retire(&removed);
    }

    /// Flag removed units inactive, drop their subscriptions and run `on_destroy`.
    fn retire(&self, removed: &[Arc<Unit>]) {
        for unit in removed {
            unit.set_active(false);
            self.events().unit_destroyed(unit.id());
            unit.raw_behavior()
                .on_destroy(&UnitContext::new(self, unit));
        }
    }

    /// The parent of `unit`, if its type chain declares `unit`'s type chain as required.
    fn required_by_parent(&self, unit: &Unit) -> Option<Arc<Unit>> {
        let parent = self.parent(unit.id().as_str())?;
        self.registry()
            .requires_any(parent.type_name(), unit.type_name())
            .then_some(parent)
    }
}
