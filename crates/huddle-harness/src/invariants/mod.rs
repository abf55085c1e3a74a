//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must hold after every processed input,
//! whatever the interleaving. The cluster extracts a [`SystemSnapshot`] from
//! every client and runs the registered [`Invariant`]s against it.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.check_all(&cluster.snapshot())?;
//! ```

mod checks;
mod snapshot;

pub use checks::{
    CallIdMatchesState, IdleCallHoldsNoMedia, TimelineMatchesActiveRoom, TimelineSorted,
};
pub use snapshot::{ClientSnapshot, SystemSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against system state.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against a snapshot.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with the call and timeline invariants.
    ///
    /// Includes:
    /// - [`IdleCallHoldsNoMedia`]: idle clients own no streams or peers
    /// - [`CallIdMatchesState`]: a call ID exists exactly when not idle
    /// - [`TimelineSorted`]: timeline ordered by creation time
    /// - [`TimelineMatchesActiveRoom`]: timeline holds only the active room
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(IdleCallHoldsNoMedia);
        registry.add(CallIdMatchesState);
        registry.add(TimelineSorted);
        registry.add(TimelineMatchesActiveRoom);
        registry
    }

    /// Add an invariant.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants, collecting every violation.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
