//! Failure injection for the simulated sandbox.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where the simulated sandbox should trap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultPoint {
    /// Inside `malloc`
    Malloc,
    /// Inside `free`
    Free,
    /// Inside the named export
    Invoke(String),
}

/// Failures to inject, keyed by call counts and export names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePlan {
    /// Zero-based `malloc` call indexes that report exhaustion
    pub refuse_mallocs: BTreeSet<u64>,
    /// Every `malloc` from this index on reports exhaustion
    pub exhaust_after: Option<u64>,
    /// Exports that return a non-zero status without running
    pub reject_exports: BTreeSet<String>,
    /// Trap location
    pub trap: Option<FaultPoint>,
    /// Make start-up report failure
    pub fail_init: bool,
}

impl FailurePlan {
    /// A plan that injects nothing
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Refuse the `index`-th allocation (zero-based)
    #[must_use]
    pub fn refuse_malloc(mut self, index: u64) -> Self {
        self.refuse_mallocs.insert(index);
        self
    }

    /// Refuse every allocation after the first `count`
    #[must_use]
    pub fn exhaust_after(mut self, count: u64) -> Self {
        self.exhaust_after = Some(count);
        self
    }

    /// Make an export return -1
    #[must_use]
    pub fn reject(mut self, export: &str) -> Self {
        self.reject_exports.insert(export.to_string());
        self
    }

    /// Trap at a point
    #[must_use]
    pub fn trap_at(mut self, point: FaultPoint) -> Self {
        self.trap = Some(point);
        self
    }

    /// Fail start-up
    #[must_use]
    pub fn fail_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Whether the allocation with this index should be refused
    #[must_use]
    pub fn refuses_malloc(&self, index: u64) -> bool {
        self.refuse_mallocs.contains(&index)
            || self.exhaust_after.is_some_and(|after| index >= after)
    }

    /// Whether the export should report failure
    #[must_use]
    pub fn rejects(&self, export: &str) -> bool {
        self.reject_exports.contains(export)
    }

    /// Whether the sandbox should trap at this point
    #[must_use]
    pub fn traps_at(&self, point: &FaultPoint) -> bool {
        self.trap.as_ref() == Some(point)
    }
}
