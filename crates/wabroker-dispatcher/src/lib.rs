pub mod error;
pub mod in_flight;
pub mod pool;
pub mod tenant_directory;
pub mod worker;

pub use error::{DispatchError, Result};
pub use in_flight::InFlightSet;
pub use pool::{PoolHealth, WorkerPool};
pub use tenant_directory::TenantDirectory;
pub use worker::{run_turn, WorkerContext};
