// SPDX-License-Identifier: Apache-2.0 OR MIT

//! What a gate waits for.
//!
//! A [`Condition`] is either a predicate or the name of a key that must be
//! present in an [`Environment`]. Gates never reach for process-wide state
//! on their own: the environment is handed to them, which keeps them
//! testable without a real host.

use ::std::any::Any;
use ::std::collections::HashMap;
use ::std::fmt;
use ::std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Something a [`Condition::Key`] can be looked up in.
///
/// Only presence matters: a key whose value is "empty" or "false" in the
/// host's terms still satisfies the condition.
pub trait Environment: Send + Sync {
    /// Returns `true` if `name` is currently present.
    fn has_key(&self, name: &str) -> bool;
}

/// An [`Environment`] that never contains anything.
///
/// Handy when a gate only ever waits on [`Condition::Predicate`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyEnvironment;

/// A shared, type-erased stand-in for a host's global namespace.
///
/// Clones share the same entries, so one clone can be handed to a gate
/// while another is used by whatever installs values asynchronously.
#[derive(Clone, Default)]
pub struct GlobalNamespace {
    entries: Arc<RwLock<HashMap<String, GlobalValue>>>,
}

/// A value stored in a [`GlobalNamespace`].
pub type GlobalValue = Arc<dyn Any + Send + Sync>;

/// The thing a gate waits for.
///
/// Cloning is cheap: predicates are reference counted.
#[derive(Clone)]
pub enum Condition {
    /// Holds when the function returns `true`.
    Predicate(Arc<dyn Fn() -> bool + Send + Sync>),
    /// Holds when the environment has a key with this name.
    Key(String),
}

impl<F> Environment for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn has_key(&self, name: &str) -> bool {
        self(name)
    }
}

impl Environment for EmptyEnvironment {
    fn has_key(&self, _name: &str) -> bool {
        false
    }
}

impl Environment for GlobalNamespace {
    fn has_key(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl fmt::Debug for GlobalNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries().keys()).finish()
    }
}

impl GlobalNamespace {
    /// Installs `value` under `name`, returning the value it replaced.
    pub fn install<T>(&self, name: impl Into<String>, value: T) -> Option<GlobalValue>
    where
        T: 'static + Send + Sync,
    {
        self.entries_mut().insert(name.into(), Arc::new(value))
    }

    /// Returns the value under `name` if it is present and of type `T`.
    #[must_use]
    pub fn get<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: 'static + Send + Sync,
    {
        let value = self.entries().get(name)?.clone();
        value.downcast::<T>().ok()
    }

    /// Returns `true` if something is installed under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries().contains_key(name)
    }

    /// Removes and returns the value under `name`.
    pub fn remove(&self, name: &str) -> Option<GlobalValue> {
        self.entries_mut().remove(name)
    }

    /// Returns the number of installed values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns `true` if nothing is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&'_ self) -> RwLockReadGuard<'_, HashMap<String, GlobalValue>> {
        self.entries
            .read()
            .expect("Failed to read-lock GlobalNamespace: poisoned by panic in another thread")
    }

    fn entries_mut(&'_ self) -> RwLockWriteGuard<'_, HashMap<String, GlobalValue>> {
        self.entries
            .write()
            .expect("Failed to write-lock GlobalNamespace: poisoned by panic in another thread")
    }
}

impl Condition {
    /// Creates a condition that holds when `predicate` returns `true`.
    #[must_use]
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: 'static + Fn() -> bool + Send + Sync,
    {
        Self::Predicate(Arc::new(predicate))
    }

    /// Creates a condition that holds when `name` is present in the
    /// environment.
    #[must_use]
    pub fn key(name: impl Into<String>) -> Self {
        Self::Key(name.into())
    }

    /// Evaluates the condition once.
    ///
    /// Panics raised by a predicate are not caught.
    #[must_use]
    pub fn check(&self, environment: &dyn Environment) -> bool {
        match self {
            Self::Predicate(predicate) => predicate(),
            Self::Key(name) => environment.has_key(name),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Predicate(_) => f.write_str("Predicate(..)"),
            Self::Key(name) => f.debug_tuple("Key").field(name).finish(),
        }
    }
}

impl From<&str> for Condition {
    fn from(name: &str) -> Self {
        Self::key(name)
    }
}

impl From<String> for Condition {
    fn from(name: String) -> Self {
        Self::Key(name)
    }
}

