//! Core types for lockprobe
//!
//! This module defines the foundational types:
//! - ResourceId: Name of a lockable unit (a row key) in the store
//! - LockOrder: Ordered, duplicate-free sequence of resources a session locks
//! - SessionId: Position of a session within a scenario
//! - TxHandle: Opaque transaction handle issued by a store

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Identifier of a lockable resource
///
/// A ResourceId names a single unit of exclusive locking in the store,
/// typically a row key. Resource identifiers are immutable once a scenario
/// is defined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Create a new ResourceId
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the resource name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ResourceId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Error building a LockOrder
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockOrderError {
    /// The order contains no resources
    #[error("lock order is empty")]
    Empty,
    /// A resource appears more than once
    #[error("resource '{0}' appears more than once in lock order")]
    Duplicate(ResourceId),
}

/// Ordered sequence of resources a session acquires
///
/// Invariant: no resource appears twice, and the order is non-empty.
/// Both are enforced at construction and on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ResourceId>", into = "Vec<ResourceId>")]
pub struct LockOrder(Vec<ResourceId>);

impl LockOrder {
    /// Create a lock order, rejecting empty or duplicate-bearing sequences
    pub fn new<I, R>(resources: I) -> Result<Self, LockOrderError>
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceId>,
    {
        let resources: Vec<ResourceId> = resources.into_iter().map(Into::into).collect();
        if resources.is_empty() {
            return Err(LockOrderError::Empty);
        }
        let mut seen = HashSet::with_capacity(resources.len());
        for resource in &resources {
            if !seen.insert(resource) {
                return Err(LockOrderError::Duplicate(resource.clone()));
            }
        }
        Ok(Self(resources))
    }

    /// Wrap resources already known to be non-empty and duplicate-free
    pub(crate) fn new_unchecked(resources: Vec<ResourceId>) -> Self {
        debug_assert!(Self::new(resources.clone()).is_ok());
        Self(resources)
    }

    /// Resources in acquisition order
    pub fn resources(&self) -> &[ResourceId] {
        &self.0
    }

    /// Iterate resources in acquisition order
    pub fn iter(&self) -> std::slice::Iter<'_, ResourceId> {
        self.0.iter()
    }

    /// Number of locks this order acquires
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a constructed order; provided for API symmetry
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The same resources in reverse order
    pub fn reversed(&self) -> Self {
        Self(self.0.iter().rev().cloned().collect())
    }
}

impl TryFrom<Vec<ResourceId>> for LockOrder {
    type Error = LockOrderError;

    fn try_from(resources: Vec<ResourceId>) -> Result<Self, Self::Error> {
        Self::new(resources)
    }
}

impl From<LockOrder> for Vec<ResourceId> {
    fn from(order: LockOrder) -> Self {
        order.0
    }
}

impl<'a> IntoIterator for &'a LockOrder {
    type Item = &'a ResourceId;
    type IntoIter = std::slice::Iter<'a, ResourceId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for LockOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, resource) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{}", resource)?;
        }
        write!(f, "]")
    }
}

/// Index of a session within its scenario (input order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub usize);

impl SessionId {
    /// Label written into every resource this session locks
    pub fn label(&self) -> String {
        format!("session-{}", self.0 + 1)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0 + 1)
    }
}

/// Opaque transaction handle issued by a store's `begin`
///
/// Handles are plain identifiers; the store owns all transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxHandle(u64);

impl TxHandle {
    /// Wrap a raw transaction id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw transaction id
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}
