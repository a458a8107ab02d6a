pub mod cursor;

pub use cursor::EntityCursor;
