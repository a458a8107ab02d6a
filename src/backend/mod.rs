pub mod bulk;
pub mod column_family;
pub mod composite;
pub mod counter;
pub mod port;
pub mod relational;

pub use bulk::{Page, Pager};
pub use column_family::ColumnFamilyBackend;
pub use composite::CompositeStore;
pub use counter::{CounterCells, MAX_COUNTER_ATTEMPTS};
pub use port::{records, PageFetch, StoragePort};
pub use relational::RelationalBackend;
