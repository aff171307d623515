//! Key/value store with a staged layer on top of a committed layer.
//!
//! Input handlers write with [`ReconcilableState::set_value`], which only stages a
//! value when it differs from what is currently visible. A render step then
//! checks [`ReconcilableState::is_staged`] and calls
//! [`ReconcilableState::commit_value`] at the moment it applies the value to a
//! sink, so each change produces at most one side effect no matter how often
//! the render step runs.

use std::collections::HashMap;

use crate::error::StateError;

#[derive(Debug, Clone)]
pub struct ReconcilableState<V> {
    defaults: HashMap<String, V>,
    committed: HashMap<String, V>,
    staged: HashMap<String, V>,
}

impl<V> Default for ReconcilableState<V> {
    fn default() -> Self {
        Self {
            defaults: HashMap::new(),
            committed: HashMap::new(),
            staged: HashMap::new(),
        }
    }
}

fn check_key(key: &str) -> Result<(), StateError> {
    if key.is_empty() {
        return Err(StateError::InvalidKey);
    }
    Ok(())
}

impl<V: Clone + PartialEq> ReconcilableState<V> {
    /// Build a state whose committed layer starts as `defaults`. The same
    /// snapshot is restored by [`ReconcilableState::reset`].
    pub fn new<K, I>(defaults: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let defaults: HashMap<String, V> = defaults
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect();
        Self {
            committed: defaults.clone(),
            defaults,
            staged: HashMap::new(),
        }
    }

    /// Stage `value` unless it equals the currently visible value.
    pub fn set_value(&mut self, key: &str, value: V) -> Result<(), StateError> {
        check_key(key)?;
        if self.get_value(key)? != Some(&value) {
            self.staged.insert(key.to_string(), value);
        }
        Ok(())
    }

    /// Staged value if present, else committed value.
    pub fn get_value(&self, key: &str) -> Result<Option<&V>, StateError> {
        check_key(key)?;
        Ok(self.staged.get(key).or_else(|| self.committed.get(key)))
    }

    /// Stage unconditionally, even if the value is unchanged.
    pub fn set_staged_value(&mut self, key: &str, value: V) -> Result<(), StateError> {
        check_key(key)?;
        self.staged.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get_staged_value(&self, key: &str) -> Result<Option<&V>, StateError> {
        check_key(key)?;
        Ok(self.staged.get(key))
    }

    pub fn get_committed_value(&self, key: &str) -> Result<Option<&V>, StateError> {
        check_key(key)?;
        Ok(self.committed.get(key))
    }

    pub fn is_staged(&self, key: &str) -> Result<bool, StateError> {
        check_key(key)?;
        Ok(self.staged.contains_key(key))
    }

    pub fn is_committed(&self, key: &str) -> Result<bool, StateError> {
        check_key(key)?;
        Ok(self.committed.contains_key(key))
    }

    /// True for a key that is staged but has never been committed.
    pub fn is_uncommitted(&self, key: &str) -> Result<bool, StateError> {
        check_key(key)?;
        Ok(self.staged.contains_key(key) && !self.committed.contains_key(key))
    }

    pub fn has_value(&self, key: &str) -> Result<bool, StateError> {
        Ok(self.is_staged(key)? || self.is_committed(key)?)
    }

    /// Move a staged value into the committed layer and return the committed
    /// value. Calling it again with nothing staged just returns the value.
    pub fn commit_value(&mut self, key: &str) -> Result<Option<&V>, StateError> {
        check_key(key)?;
        if let Some(value) = self.staged.remove(key) {
            self.committed.insert(key.to_string(), value);
        }
        Ok(self.committed.get(key))
    }

    pub fn commit(&mut self) {
        self.committed.extend(self.staged.drain());
    }

    pub fn rollback_value(&mut self, key: &str) -> Result<(), StateError> {
        check_key(key)?;
        self.staged.remove(key);
        Ok(())
    }

    pub fn rollback(&mut self) {
        self.staged.clear();
    }

    /// Restore the construction-time defaults and drop anything staged.
    pub fn reset(&mut self) {
        self.staged.clear();
        self.committed = self.defaults.clone();
    }

    pub fn staged_keys(&self) -> Vec<String> {
        self.staged.keys().cloned().collect()
    }

    pub fn committed_keys(&self) -> Vec<String> {
        self.committed.keys().cloned().collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.get_copy().into_keys().collect()
    }

    /// Merged view of both layers; staged values win.
    pub fn get_copy(&self) -> HashMap<String, V> {
        let mut copy = self.committed.clone();
        copy.extend(
            self.staged
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        copy
    }
}
