//! Cross-service state vocabularies
//!
//! Literal status strings reported by the different CDP services, grouped by
//! what they mean for a caller waiting on a state transition.

/// A fixed set of service status strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSet(&'static [&'static str]);

impl StateSet {
    pub const fn new(states: &'static [&'static str]) -> Self {
        Self(states)
    }

    pub fn contains(&self, state: &str) -> bool {
        self.0.iter().any(|s| *s == state)
    }

    pub fn states(&self) -> &'static [&'static str] {
        self.0
    }
}

pub const CREATION_STATES: StateSet = StateSet::new(&[
    "REQUESTED",
    "EXTERNAL_DATABASE_CREATION_IN_PROGRESS",
    "STACK_CREATION_IN_PROGRESS",
    "CREATION_INITIATED",
    "FREEIPA_CREATION_IN_PROGRESS",
    "STARTING",
    "ENABLING",             // DF
    "provision:started",    // ML
    "installation:started", // ML
]);

pub const TERMINATION_STATES: StateSet = StateSet::new(&[
    "EXTERNAL_DATABASE_DELETION_IN_PROGRESS",
    "STACK_DELETION_IN_PROGRESS",
    "FREEIPA_DELETE_IN_PROGRESS",
    "STOPPING",
    "deprovision:started", // ML
    "DISABLING",           // DF
]);

pub const STARTED_STATES: StateSet = StateSet::new(&[
    "EXTERNAL_DATABASE_START_IN_PROGRESS",
    "AVAILABLE",
    "START_IN_PROGRESS",
    "RUNNING",
    "installation:finished", // ML
    "Running",               // DW
    "GOOD_HEALTH",           // DF
    "ClusterCreationCompleted", // DE
]);

pub const STOPPED_STATES: StateSet = StateSet::new(&[
    "EXTERNAL_DATABASE_STOP_IN_PROGRESS",
    "STOP_IN_PROGRESS",
    "STOPPED",
    "ENV_STOPPED",
    "NOT_ENABLED", // DF
]);

pub const FAILED_STATES: StateSet = StateSet::new(&[
    "PROVISIONING_FAILED",
    "CREATE_FAILED",
    "REJECTED",
    "FAILED",
    "TIMEDOUT",
    "DELETE_FAILED",
    "Error",               // DW
    "installation:failed", // ML
    "deprovision:failed",  // ML
    "BAD_HEALTH",          // DF
]);

/// States in which an object may be cleaned up
pub const REMOVABLE_STATES: StateSet = StateSet::new(&[
    "AVAILABLE",
    "UPDATE_FAILED",
    "CREATE_FAILED",
    "ENABLE_SECURITY_FAILED",
    "DELETE_FAILED",
    "DELETE_COMPLETED",
    "DELETED_ON_PROVIDER_SIDE",
    "STOPPED",
    "START_FAILED",
    "STOP_FAILED",
    "installation:failed",   // ML
    "deprovision:failed",    // ML
    "installation:finished", // ML
    "Error",                 // DW
    "Running",               // DW
    "GOOD_HEALTH",           // DF
    "CONCERNING_HEALTH",     // DF
    "BAD_HEALTH",            // DF
]);
