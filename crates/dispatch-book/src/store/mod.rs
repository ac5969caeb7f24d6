//! Record stores
//!
//! A store loads its document, applies a batch of [`Command`]s and saves the
//! document again. Either every command of a batch lands or none does.

mod json;
mod xlsx;

pub use json::{DispatchRecord, JsonDocument, JsonStore, WaterRecord};
pub use xlsx::{resolve_commands, XlsxStore};

use std::fmt;

use rust_decimal::Decimal;

use crate::error::{Result, UpdateError};
use crate::request::Command;

/// One value written by an applied command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedWrite {
    /// Where the value went, e.g. `'Water Quantity'!E8`
    pub target: String,
    /// The value as written
    pub value: String,
}

impl fmt::Display for AppliedWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.target, self.value)
    }
}

/// A persisted document that commands can be applied to
pub trait RecordStore: Send {
    /// Load the document, apply `commands` in order, and save it once
    fn apply(&mut self, commands: &[Command]) -> Result<Vec<AppliedWrite>>;

    /// Human-readable description of where the store lives
    fn describe(&self) -> String;
}

/// Volume through meter 1: `final - previous`, which may be negative
pub(crate) fn meter_volume(final_reading: Decimal, previous_reading: Decimal) -> Result<Decimal> {
    final_reading.checked_sub(previous_reading).ok_or_else(|| {
        UpdateError::invalid(format!(
            "volume {} - {} is out of range",
            final_reading, previous_reading
        ))
    })
}
