//! sitepm Lifecycle - Per-app state machine over provisioning, supervision,
//! port leases and health monitoring
//!
//! [`LifecycleController`] is the only entry point callers use. It owns one
//! instance of every other component and drives them on behalf of requests.

pub mod controller;
pub mod env;
pub mod monitor;
pub mod ports;
pub mod provision;
pub mod supervisor;

pub use controller::{Collaborators, LifecycleController, StatusChange};
pub use monitor::{HealthRegistry, HealthSignal};
pub use ports::{PortAllocator, PortProbe};
pub use provision::{Phase, Pipeline};
pub use supervisor::{ProcessExit, Supervisor, SupervisorConfig, Termination};
