//! Run-scoped bookkeeping for decisions.
//!
//! A [`DecisionRegistry`] tracks which global keys are held by live decisions
//! and which answers were loaded from disk. It is a cheap handle: clones share
//! the same state. One registry belongs to one project run.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::{Rc, Weak};

use log::debug;

use crate::error::DecisionError;
use crate::persistence::StoredDecision;

#[derive(Debug, Default)]
struct RegistryState {
    active: HashSet<String>,
    stored: BTreeMap<String, StoredDecision>,
    checksum_ifc: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DecisionRegistry {
    inner: Rc<RefCell<RegistryState>>,
}

impl DecisionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key` for a new decision. Fails if a live decision holds it.
    pub(crate) fn register(&self, key: &str) -> Result<Registration, DecisionError> {
        let mut state = self.inner.borrow_mut();
        if !state.active.insert(key.to_string()) {
            return Err(DecisionError::DuplicateGlobalKey(key.to_string()));
        }
        debug!("registered decision key {key}");
        Ok(Registration {
            registry: Rc::downgrade(&self.inner),
            key: key.to_string(),
        })
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.inner.borrow().active.contains(key)
    }

    pub fn active_count(&self) -> usize {
        self.inner.borrow().active.len()
    }

    pub fn stored(&self, key: &str) -> Option<StoredDecision> {
        self.inner.borrow().stored.get(key).cloned()
    }

    pub fn stored_decisions(&self) -> BTreeMap<String, StoredDecision> {
        self.inner.borrow().stored.clone()
    }

    pub fn replace_stored(&self, stored: BTreeMap<String, StoredDecision>) {
        self.inner.borrow_mut().stored = stored;
    }

    pub fn remove_stored(&self, key: &str) -> Option<StoredDecision> {
        self.inner.borrow_mut().stored.remove(key)
    }

    pub fn checksum_ifc(&self) -> Option<String> {
        self.inner.borrow().checksum_ifc.clone()
    }

    pub fn set_checksum_ifc(&self, checksum: Option<String>) {
        self.inner.borrow_mut().checksum_ifc = checksum;
    }
}

/// Holds a global key for as long as it lives.
#[derive(Debug)]
pub(crate) struct Registration {
    registry: Weak<RefCell<RegistryState>>,
    key: String,
}

impl Registration {
    pub(crate) fn registry(&self) -> Option<DecisionRegistry> {
        self.registry
            .upgrade()
            .map(|inner| DecisionRegistry { inner })
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            inner.borrow_mut().active.remove(&self.key);
            debug!("released decision key {}", self.key);
        }
    }
}
