//! The workbook store: commands become cell patches on the dispatch workbook

use std::path::{Path, PathBuf};

use chrono::Datelike;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use dispatch_book_core::{CellAddress, CellValue, Workbook, Worksheet};
use dispatch_book_xlsx::{CellPatches, XlsxDocument};

use crate::error::{Result, UpdateError};
use crate::fs::atomic_write_bytes;
use crate::layout::{DerivedMode, DispatchLayout, Layout, ShipColumnLayout};
use crate::request::Command;
use crate::store::{meter_volume, AppliedWrite, RecordStore};

/// Store backed by an existing xlsx workbook
///
/// The workbook must already have every sheet the layout names, with the
/// location names filled in. Only the cells a command targets are rewritten.
#[derive(Debug, Clone)]
pub struct XlsxStore {
    path: PathBuf,
    layout: Layout,
}

impl XlsxStore {
    pub fn new<P: Into<PathBuf>>(path: P, layout: Layout) -> Self {
        Self {
            path: path.into(),
            layout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for XlsxStore {
    fn apply(&mut self, commands: &[Command]) -> Result<Vec<AppliedWrite>> {
        let mut doc =
            XlsxDocument::open(&self.path).map_err(|e| UpdateError::storage(&self.path, e))?;

        let patches = resolve_commands(&self.layout, doc.workbook(), commands)?;
        doc.set_cells(&patches)
            .map_err(|e| UpdateError::storage(&self.path, e))?;

        let bytes = doc
            .to_bytes()
            .map_err(|e| UpdateError::storage(&self.path, e))?;
        atomic_write_bytes(&self.path, &bytes).map_err(|e| UpdateError::storage(&self.path, e))?;

        Ok(patches
            .iter()
            .map(|(sheet, addr, value)| AppliedWrite {
                target: format!("'{}'!{}", sheet, addr),
                value: match value.formula_text() {
                    Some(text) => text.to_string(),
                    None => value.to_string(),
                },
            })
            .collect())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Resolve commands to the cells they write
///
/// Nothing is written here; a failing command fails the whole batch. Later
/// commands see the values written by earlier ones, so running totals stay
/// right when a batch touches the same row twice.
pub fn resolve_commands(
    layout: &Layout,
    workbook: &Workbook,
    commands: &[Command],
) -> Result<CellPatches> {
    let mut patches = CellPatches::new();

    for command in commands {
        match command {
            Command::Dispatch {
                location,
                quantity,
                day,
            } => resolve_dispatch(layout, workbook, &mut patches, location, *quantity, *day)?,
            Command::WaterQuantity {
                ship,
                final_reading,
                previous_reading,
                ..
            } => {
                let section = &layout.water_quantity;
                require_sheet(workbook, &section.sheet)?;
                let row = section.row_for_ship(*ship)?;
                let volume = meter_volume(*final_reading, *previous_reading)?;
                for (column, value) in [
                    (section.final_column, *final_reading),
                    (section.previous_column, *previous_reading),
                    (section.volume_column, volume),
                ] {
                    patches.set(section.sheet.as_str(), address(row, column)?, number(value)?);
                }
                tracing::debug!(ship, row, %volume, "resolved water quantity");
            }
            Command::MonthlyProduction { ship, reading, date } => {
                let section = optional_section(&layout.monthly_production, "monthly production")?;
                resolve_ship_column(workbook, &mut patches, section, *ship, *reading, date.day())?;
            }
            Command::SecondMeter { ship, reading, date } => {
                let section = optional_section(&layout.second_meter, "second meter")?;
                resolve_ship_column(workbook, &mut patches, section, *ship, *reading, date.day())?;
            }
        }
    }

    Ok(patches)
}

fn resolve_dispatch(
    layout: &Layout,
    workbook: &Workbook,
    patches: &mut CellPatches,
    location: &str,
    quantity: Decimal,
    day: u32,
) -> Result<()> {
    let section = &layout.dispatch;
    let sheet = require_sheet(workbook, &section.sheet)?;

    let row = section
        .find_row(sheet, location)
        .ok_or_else(|| UpdateError::KeyNotFound {
            sheet: section.sheet.clone(),
            key: format!("Location '{}'", location),
        })?;
    let column = section.day_column(day)?;
    let target = address(row, column)?;
    patches.set(section.sheet.as_str(), target, number(quantity)?);
    tracing::debug!(location, row, column, "resolved dispatch cell {}", target);

    if let Some(totals) = &section.totals {
        let total = row_total(section, sheet, patches, row)?;
        let allocated_addr = address(row, totals.allocated_column)?;
        let allocated = cell_number(sheet, patches, allocated_addr).unwrap_or_default();
        let balance = allocated.checked_sub(total).ok_or_else(|| {
            UpdateError::invalid(format!("balance of {} is out of range", location))
        })?;

        let total_addr = address(row, totals.total_column)?;
        let balance_addr = address(row, totals.balance_column)?;
        let (total_value, balance_value) = match layout.derived_mode {
            DerivedMode::Formula => {
                let columns = section.day_columns();
                let days = address(row, *columns.start())?.to(address(row, *columns.end())?);
                (
                    CellValue::formula_with_cached(format!("=SUM({})", days), number(total)?),
                    CellValue::formula_with_cached(
                        format!("={}-{}", allocated_addr, total_addr),
                        number(balance)?,
                    ),
                )
            }
            DerivedMode::Value => (number(total)?, number(balance)?),
        };
        patches.set(section.sheet.as_str(), total_addr, total_value);
        patches.set(section.sheet.as_str(), balance_addr, balance_value);
    }

    Ok(())
}

fn resolve_ship_column(
    workbook: &Workbook,
    patches: &mut CellPatches,
    section: &ShipColumnLayout,
    ship: u32,
    reading: Decimal,
    day: u32,
) -> Result<()> {
    require_sheet(workbook, &section.sheet)?;
    let row = section.row_for_day(day)?;
    let column = section.column_for_ship(ship)?;
    patches.set(section.sheet.as_str(), address(row, column)?, number(reading)?);
    tracing::debug!(sheet = %section.sheet, ship, day, row, column, "resolved meter reading");
    Ok(())
}

/// Sum of the numeric day cells of a row, with pending patches applied
fn row_total(
    section: &DispatchLayout,
    sheet: &Worksheet,
    patches: &CellPatches,
    row: u32,
) -> Result<Decimal> {
    let mut total = Decimal::ZERO;
    for column in section.day_columns() {
        if let Some(value) = cell_number(sheet, patches, address(row, column)?) {
            total = total.checked_add(value).ok_or_else(|| {
                UpdateError::invalid(format!("total of row {} is out of range", row))
            })?;
        }
    }
    Ok(total)
}

/// Numeric value of a cell as `SUM` sees it; text, booleans and errors are skipped
fn cell_number(sheet: &Worksheet, patches: &CellPatches, addr: CellAddress) -> Option<Decimal> {
    let value = patches
        .get(sheet.name(), addr)
        .unwrap_or_else(|| sheet.value(addr));
    match value.effective_value() {
        CellValue::Number(n) => Decimal::from_f64(*n),
        _ => None,
    }
}

fn require_sheet<'a>(workbook: &'a Workbook, name: &str) -> Result<&'a Worksheet> {
    workbook
        .worksheet_by_name(name)
        .ok_or_else(|| UpdateError::SheetMissing(name.to_string()))
}

fn optional_section<'a>(
    section: &'a Option<ShipColumnLayout>,
    name: &str,
) -> Result<&'a ShipColumnLayout> {
    section
        .as_ref()
        .ok_or_else(|| UpdateError::Layout(format!("no {} sheet is configured", name)))
}

fn address(row: u32, column: u32) -> Result<CellAddress> {
    CellAddress::from_one_based(row, column).map_err(|e| UpdateError::invalid(e.to_string()))
}

fn number(value: Decimal) -> Result<CellValue> {
    value
        .to_f64()
        .map(CellValue::Number)
        .ok_or_else(|| UpdateError::invalid(format!("{} cannot be stored as a number", value)))
}
