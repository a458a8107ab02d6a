pub mod config;

pub use config::{BackendKind, ConsistencyLevel, DiscoveryMode, PoolType, StoreConfig};
