//! Cell-related types
//!
//! - [`CellValue`] - The value stored in a cell
//! - [`CellAddress`] - A cell's location (e.g., "A1")
//! - [`CellRange`] - A rectangular block of cells (e.g., "G10:AK10")

mod address;
mod value;

pub use address::{CellAddress, CellRange};
pub use value::CellValue;
