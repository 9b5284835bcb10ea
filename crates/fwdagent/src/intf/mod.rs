//! Router interface table.

mod table;

pub use table::{IntfEntry, IntfTable};
