//! Synchronization layer: the add-show pipeline and the flag-job
//! executor, generic over the service traits so both can run against
//! mocks in tests.

pub mod add_show;
pub mod flag_job;

mod error;

pub use error::SyncError;

/// Network reachability probe, injected so pipelines are testable.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// The trivial probe for environments without a reachability signal.
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Probe that always reports offline. Lets callers exercise the
/// offline-abort paths deliberately (e.g. a `--offline` CLI run).
pub struct ForcedOffline;

impl Connectivity for ForcedOffline {
    fn is_online(&self) -> bool {
        false
    }
}
