use std::sync::atomic::{AtomicU64, Ordering};

use crate::{prelude::Result, unit::UnitId};

/// Hands out unit ids. Called once per constructed unit.
pub trait IdentityService: Send + Sync {
    fn generate_id(&self, type_hint: &str) -> Result<UnitId>;
}

/// `"{type_hint}-{n}"` from a counter shared by all types.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn get_next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl IdentityService for SequentialIds {
    fn generate_id(&self, type_hint: &str) -> Result<UnitId> {
        let hint = if type_hint.is_empty() { "U" } else { type_hint };
        Ok(format!("{hint}-{}", self.get_next()).into())
    }
}
