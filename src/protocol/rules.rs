//! Reject rules
//!
//! A `RejectRules` value travels with every read and write and tells the
//! server when to refuse the operation instead of performing it. The server
//! evaluates the rules against the current stored object atomically with the
//! operation they gate: check and commit are a single indivisible step as far
//! as any client can observe.
//!
//! Two kinds of condition exist:
//! - an existence requirement (`must_exist`), rejecting when no object is
//!   stored at the key;
//! - at most one version guard, stating what the stored version must satisfy
//!   for the operation to proceed. `version_equals(v)` is compare-and-swap;
//!   `version_less_than(v)` admits writes only in increasing version order.
//!
//! For version guards, a key with no stored object compares as version 0.
//! Stored versions start at 1, so `version_equals(0)` means "only if absent",
//! `version_less_than(v)` admits a first write, and `version_greater_than(v)`
//! never does.
//!
//! The empty rule set (`RejectRules::none()`, also `Default`) permits the
//! operation unconditionally and is the usual choice for exploratory reads
//! and writes.

/// A condition the stored version must satisfy for the operation to proceed
///
/// At most one guard is carried per rule set, which keeps contradictory
/// combinations unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionGuard {
    /// Proceed only if the stored version equals the given one
    /// (compare-and-swap)
    Equals(u64),

    /// Proceed only if the stored version is below the given one
    /// (monotonic-write ordering)
    LessThan(u64),

    /// Proceed only if the stored version is above the given one
    GreaterThan(u64),
}

/// Conditions under which the server rejects an operation instead of
/// performing it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RejectRules {
    require_exists: bool,
    guard: Option<VersionGuard>,
}

impl RejectRules {
    /// No conditions: the operation always proceeds
    pub fn none() -> Self {
        Self::default()
    }

    /// Reject when no object is stored at the key
    pub fn must_exist() -> Self {
        Self {
            require_exists: true,
            guard: None,
        }
    }

    /// Reject unless the stored version equals `version` (compare-and-swap)
    pub fn version_equals(version: u64) -> Self {
        Self {
            require_exists: false,
            guard: Some(VersionGuard::Equals(version)),
        }
    }

    /// Reject unless the stored version is below `version`
    pub fn version_less_than(version: u64) -> Self {
        Self {
            require_exists: false,
            guard: Some(VersionGuard::LessThan(version)),
        }
    }

    /// Reject unless the stored version is above `version`
    pub fn version_greater_than(version: u64) -> Self {
        Self {
            require_exists: false,
            guard: Some(VersionGuard::GreaterThan(version)),
        }
    }

    /// Add the existence requirement to an existing rule set
    pub fn and_must_exist(mut self) -> Self {
        self.require_exists = true;
        self
    }

    /// Whether the rules require an object to be present
    pub fn requires_exists(&self) -> bool {
        self.require_exists
    }

    /// The version guard, if one is set
    pub fn guard(&self) -> Option<VersionGuard> {
        self.guard
    }

    /// Whether this rule set permits everything
    pub fn is_unconditional(&self) -> bool {
        !self.require_exists && self.guard.is_none()
    }

    /// Evaluate the rules against the stored version at a key
    ///
    /// `stored` is `Some(version)` when an object exists, `None` otherwise.
    /// Returns true when the gated operation may proceed. Callers must hold
    /// whatever lock makes the subsequent mutation atomic with this check.
    pub fn permits(&self, stored: Option<u64>) -> bool {
        if self.require_exists && stored.is_none() {
            return false;
        }

        // A missing object compares as version 0; real versions start at 1
        let current = stored.unwrap_or(0);

        match self.guard {
            None => true,
            Some(VersionGuard::Equals(v)) => current == v,
            Some(VersionGuard::LessThan(v)) => current < v,
            Some(VersionGuard::GreaterThan(v)) => current > v,
        }
    }
}
