pub mod engine;
pub mod memory;
pub mod table;

pub use engine::{FamilyKind, Mutation, MutationBatch, RowPage, WideColumnStore};
pub use memory::{MemoryStore, StatsSnapshot};
pub use table::{Table, TableRow, TableSchema};
