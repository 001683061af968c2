pub mod backfill;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod metrics_server;
pub mod observability;
pub mod portal;
pub mod transform;

pub use coordinator::{AccountCoordinator, ConnectError, ConnectedAccount};
