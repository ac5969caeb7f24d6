//! # dispatch-book
//!
//! Writes daily dispatch quantities and water-meter readings into a
//! fixed-layout workbook, or into a flat JSON document.
//!
//! Coordinates come from a [`Layout`] table. Requests are decoded into
//! [`Command`]s, and a [`RecordUpdater`] applies each request as one
//! load-mutate-save cycle against its [`RecordStore`].
//!
//! ## Example
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use dispatch_book::{Layout, RecordUpdater};
//! use rust_decimal::Decimal;
//!
//! let updater = RecordUpdater::xlsx("Dispatch order.xlsx", Layout::default());
//!
//! // ' Daily Dispatch': Dibba's row, column 6 + 3
//! updater.update_dispatch("Dibba", Decimal::new(425, 1), 3).unwrap();
//!
//! // 'Water Quantity' row 8: D=120, E=150, F=30
//! let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
//! updater
//!     .update_water_quantity(2, Decimal::from(150), Decimal::from(120), date)
//!     .unwrap();
//!
//! let response = updater.handle_json(br#"{"type":"dispatch","location":"Kalba","quantity":"7","dayOfMonth":1}"#);
//! println!("{}", response.message);
//! ```

pub mod error;
pub mod fs;
pub mod layout;
pub mod request;
pub mod store;
pub mod updater;

pub use error::{Result, StorageError, UpdateError};
pub use layout::{DerivedMode, DispatchLayout, Layout, ShipColumn, ShipColumnLayout, TotalsLayout, WaterQuantityLayout};
pub use request::{Command, Loose, SaveRequest, SaveResponse};
pub use store::{AppliedWrite, JsonStore, RecordStore, XlsxStore};
pub use updater::RecordUpdater;
