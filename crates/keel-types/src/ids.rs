//! Strongly-typed identifiers for keel records
//!
//! Decision ids follow the `{type}_{unixMillis}` shape and are unique for the
//! lifetime of the process. Everything else is a thin newtype.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::DecisionType;
use crate::error::ValidationError;

/// Identifier of a decision request and of the single result it produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DecisionId(String);

impl DecisionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a guardian ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ticket:{}", self.0)
    }
}

/// A service component that decisions act upon (e.g. "api", "cache").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ComponentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Any identity holding the Guardian capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuardianId(String);

impl GuardianId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GuardianId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "guardian:{}", self.0)
    }
}

/// Deployable revision of a component (tag, image digest, version string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Revision(String);

impl Revision {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default)]
struct AllocatorState {
    last_millis: HashMap<DecisionType, i64>,
    issued: HashSet<DecisionId>,
    submitted: HashSet<DecisionId>,
}

/// Issues `{type}_{unixMillis}` decision ids.
///
/// Two requests of the same type created within one millisecond get
/// consecutive millisecond stamps, so generated ids never collide. Ids
/// supplied from outside go through [`DecisionIdAllocator::register`] and
/// are rejected if already issued.
#[derive(Debug, Default)]
pub struct DecisionIdAllocator {
    state: Mutex<AllocatorState>,
}

impl DecisionIdAllocator {
    /// Create an allocator with its own issued-id set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide allocator used by [`crate::DecisionRequest::builder`].
    pub fn global() -> Arc<DecisionIdAllocator> {
        static GLOBAL: OnceLock<Arc<DecisionIdAllocator>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(DecisionIdAllocator::new()))
            .clone()
    }

    /// Allocate a fresh id for `decision_type` stamped at `now`.
    pub fn allocate(&self, decision_type: DecisionType, now: DateTime<Utc>) -> DecisionId {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let AllocatorState {
            last_millis,
            issued,
            ..
        } = &mut *state;

        let last = last_millis.entry(decision_type).or_insert(i64::MIN);
        let mut millis = now.timestamp_millis().max(last.saturating_add(1));
        loop {
            let candidate = DecisionId(format!("{}_{}", decision_type.as_str(), millis));
            if issued.insert(candidate.clone()) {
                *last = millis;
                return candidate;
            }
            millis += 1;
        }
    }

    /// Claim an externally supplied id.
    pub fn register(&self, id: DecisionId) -> Result<DecisionId, ValidationError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.issued.insert(id.clone()) {
            Ok(id)
        } else {
            Err(ValidationError::DuplicateId(id))
        }
    }

    /// Mark `id` as submitted for evaluation. An id is submitted at most
    /// once, whichever allocator issued it; foreign ids are registered here
    /// so later allocations skip them.
    pub fn claim(&self, id: &DecisionId) -> Result<(), ValidationError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.submitted.insert(id.clone()) {
            return Err(ValidationError::DuplicateId(id.clone()));
        }
        state.issued.insert(id.clone());
        Ok(())
    }

    /// Whether `id` has been issued by this allocator.
    pub fn is_issued(&self, id: &DecisionId) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.issued.contains(id)
    }
}
