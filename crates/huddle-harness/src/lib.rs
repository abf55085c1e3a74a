//! Deterministic simulation harness for Huddle client testing.
//!
//! In-memory implementations of the platform traits ([`SimDriver`],
//! [`SimMedia`], [`FakeUploader`]), a virtual-time [`SimEnv`] and a
//! [`SimRelay`] standing in for the coordination service. [`SimCluster`]
//! wires several real [`huddle_app::Runtime`]s to one relay and pumps events
//! between them until quiescent.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold after every
//! processed input, across all execution paths. Use
//! [`InvariantRegistry::standard()`] for the call and timeline invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cluster;
pub mod invariants;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_media;
pub mod sim_relay;
pub mod sim_upload;

pub use cluster::{SimClient, SimCluster, SimRuntime};
pub use invariants::{
    CallIdMatchesState, ClientSnapshot, IdleCallHoldsNoMedia, Invariant, InvariantRegistry,
    InvariantResult, SystemSnapshot, TimelineMatchesActiveRoom, TimelineSorted, Violation,
};
pub use sim_driver::{SimDriver, SimDriverError};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_media::{PeerFault, SimMedia};
pub use sim_relay::SimRelay;
pub use sim_upload::FakeUploader;

/// Install a `fmt` subscriber for test debugging.
///
/// Filter comes from `RUST_LOG` (default `warn`). Safe to call from every
/// test; only the first call installs.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}
