pub mod builder;
pub mod table;

pub use builder::{build, Builder};
pub use table::{StateHandle, StateRow, Table};
