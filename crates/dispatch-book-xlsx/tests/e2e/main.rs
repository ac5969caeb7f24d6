//! End-to-end tests for dispatch-book-xlsx.
//!
//! Each test builds the workbook it needs as a zip of hand-written parts,
//! the way Excel lays them out, then opens, patches and re-reads it.

mod common;
mod patching;
mod reading;

pub use common::*;
