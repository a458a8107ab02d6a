pub mod monitor;
pub mod store;

pub use monitor::{MonitorStats, StoreMonitor};
pub use store::{Store, StoreStatus};
