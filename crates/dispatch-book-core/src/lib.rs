//! # dispatch-book-core
//!
//! Cell addressing and the in-memory workbook model used by dispatch-book.
//!
//! This crate provides:
//! - [`CellAddress`] and [`CellRange`] - A1-style addressing (0-based internally)
//! - [`CellValue`] - Values read from or written to a sheet
//! - [`Workbook`], [`Worksheet`] - Named sheets holding sparse cells
//!
//! ## Example
//!
//! ```rust
//! use dispatch_book_core::{CellValue, Workbook};
//!
//! let mut workbook = Workbook::empty();
//! let idx = workbook.add_worksheet_with_name("Water Quantity").unwrap();
//! let sheet = workbook.worksheet_mut(idx).unwrap();
//!
//! sheet.set_cell_value("E8", 150.0).unwrap();
//! sheet.set_cell_value_at(7, 3, CellValue::Number(120.0)).unwrap();
//!
//! assert_eq!(sheet.get_value("D8").unwrap().as_number(), Some(120.0));
//! ```

pub mod cell;
pub mod error;
pub mod workbook;
pub mod worksheet;

pub use cell::{CellAddress, CellRange, CellValue};
pub use error::{Error, Result};
pub use workbook::Workbook;
pub use worksheet::Worksheet;

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;
