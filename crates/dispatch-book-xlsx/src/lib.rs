//! # dispatch-book-xlsx
//!
//! XLSX (Office Open XML) support for dispatch-book.
//!
//! Workbooks handled here are operator-maintained templates: styles, merged
//! cells, charts and everything else must survive an update untouched. The
//! crate therefore never regenerates a package. It reads the cell model
//! ([`XlsxReader`]) for lookups, and rewrites only the `<c>` elements named in
//! a [`CellPatches`] set, copying every other part byte-for-byte.
//!
//! ```no_run
//! use dispatch_book_core::{CellAddress, CellValue};
//! use dispatch_book_xlsx::{CellPatches, XlsxDocument};
//!
//! let mut doc = XlsxDocument::open("Dispatch order.xlsx").unwrap();
//! let mut patches = CellPatches::default();
//! patches.set("Water Quantity", CellAddress::parse("E8").unwrap(), CellValue::Number(150.0));
//! doc.set_cells(&patches).unwrap();
//! std::fs::write("Dispatch order.xlsx", doc.to_bytes().unwrap()).unwrap();
//! ```

pub mod document;
pub mod error;
pub mod package;
pub mod patch;
pub mod reader;

mod xml;

pub use document::XlsxDocument;
pub use error::{XlsxError, XlsxResult};
pub use package::XlsxPackage;
pub use patch::CellPatches;
pub use reader::{SheetPart, XlsxReader};
