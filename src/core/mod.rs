pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, Result};
pub use types::{Cell, Record, StoredRow};
pub use value::Value;
