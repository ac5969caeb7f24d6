//! The positional layout of the dispatch workbook
//!
//! Every coordinate the updater writes comes from this table. Row and column
//! numbers are 1-based, as shown in a spreadsheet, and converted to
//! [`CellAddress`] only when a target is resolved.
//!
//! The built-in [`Layout::default`] matches the production "Dispatch order"
//! workbook. A TOML file with the same shape can replace it:
//!
//! ```toml
//! derived_mode = "formula"
//!
//! [dispatch]
//! sheet = " Daily Dispatch"
//! id_column = 2
//! first_row = 4
//! last_row = 79
//! day_base_column = 6
//!
//! [water_quantity]
//! sheet = "Water Quantity"
//! base_row = 6
//! max_ship = 4
//! previous_column = 4
//! final_column = 5
//! volume_column = 6
//! ```

use std::collections::HashSet;
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};

use dispatch_book_core::{CellAddress, Worksheet};

use crate::error::{Result, UpdateError};

/// Days addressable in a month
pub const DAYS_IN_MONTH: u32 = 31;

/// How derived dispatch totals are stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedMode {
    /// Native formulas with their computed result cached
    #[default]
    Formula,
    /// The computed number only
    Value,
}

/// The complete workbook layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Layout {
    #[serde(default)]
    pub derived_mode: DerivedMode,
    pub dispatch: DispatchLayout,
    pub water_quantity: WaterQuantityLayout,
    /// Absent when the workbook has no monthly production sheet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_production: Option<ShipColumnLayout>,
    /// Absent when the workbook has no second meter sheet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_meter: Option<ShipColumnLayout>,
}

/// Daily dispatch sheet: one row per location, one column per day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchLayout {
    pub sheet: String,
    /// Column holding the location names
    pub id_column: u32,
    /// First row scanned for a location
    pub first_row: u32,
    /// Last row scanned for a location (inclusive)
    pub last_row: u32,
    /// Day `d` is written to column `day_base_column + d`
    pub day_base_column: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<TotalsLayout>,
}

/// Per-row running total and balance columns of the dispatch sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TotalsLayout {
    /// Quantity allocated to the location for the month
    pub allocated_column: u32,
    /// Sum of the day columns
    pub total_column: u32,
    /// Allocated minus total
    pub balance_column: u32,
}

/// Water quantity sheet: one row per ship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaterQuantityLayout {
    pub sheet: String,
    /// Ship `n` is on row `base_row + n`
    pub base_row: u32,
    /// Ships are numbered `1..=max_ship`
    pub max_ship: u32,
    pub previous_column: u32,
    pub final_column: u32,
    pub volume_column: u32,
}

/// A sheet with one row per day and one column per ship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShipColumnLayout {
    pub sheet: String,
    /// Day `d` is on row `base_row + d`
    pub base_row: u32,
    pub ship_columns: Vec<ShipColumn>,
}

/// Column assigned to one ship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShipColumn {
    pub ship: u32,
    pub column: u32,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            derived_mode: DerivedMode::Formula,
            dispatch: DispatchLayout {
                sheet: " Daily Dispatch".into(),
                id_column: 2,
                first_row: 4,
                last_row: 79,
                day_base_column: 6,
                totals: Some(TotalsLayout {
                    allocated_column: 3,
                    total_column: 38,
                    balance_column: 39,
                }),
            },
            water_quantity: WaterQuantityLayout {
                sheet: "Water Quantity".into(),
                base_row: 6,
                max_ship: 4,
                previous_column: 4,
                final_column: 5,
                volume_column: 6,
            },
            monthly_production: Some(ShipColumnLayout::per_day(" Monthly production")),
            second_meter: Some(ShipColumnLayout::per_day("Second meter production")),
        }
    }
}

impl Layout {
    /// Parse and validate a layout from TOML
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let layout: Layout =
            toml::from_str(s).map_err(|e| UpdateError::Layout(e.to_string()))?;
        layout.validate()?;
        Ok(layout)
    }

    /// Load and validate a layout file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            UpdateError::Layout(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Render the layout as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| UpdateError::Layout(e.to_string()))
    }

    /// Check the table for coordinates that cannot be written
    pub fn validate(&self) -> Result<()> {
        self.dispatch.validate()?;
        self.water_quantity.validate()?;
        for section in [&self.monthly_production, &self.second_meter]
            .into_iter()
            .flatten()
        {
            section.validate()?;
        }
        Ok(())
    }

    /// Names of every sheet the layout writes to
    pub fn sheet_names(&self) -> Vec<&str> {
        let mut names = vec![self.dispatch.sheet.as_str(), self.water_quantity.sheet.as_str()];
        names.extend(
            [&self.monthly_production, &self.second_meter]
                .into_iter()
                .flatten()
                .map(|section| section.sheet.as_str()),
        );
        names
    }
}

impl DispatchLayout {
    /// Rows scanned for a location
    pub fn scan_rows(&self) -> RangeInclusive<u32> {
        self.first_row..=self.last_row
    }

    /// Column of a day of the month
    pub fn day_column(&self, day: u32) -> Result<u32> {
        check_day(day)?;
        offset(&self.sheet, "day_base_column", self.day_base_column, day)
    }

    /// Columns of every day of the month
    pub fn day_columns(&self) -> RangeInclusive<u32> {
        self.day_base_column.saturating_add(1)..=self.day_base_column.saturating_add(DAYS_IN_MONTH)
    }

    /// Find the row whose identifier cell, trimmed, equals `location`
    ///
    /// Returns the 1-based row number of the first match.
    pub fn find_row(&self, sheet: &Worksheet, location: &str) -> Option<u32> {
        self.scan_rows().find(|&row| {
            let Ok(addr) = CellAddress::from_one_based(row, self.id_column) else {
                return false;
            };
            let value = sheet.value(addr);
            !value.is_empty() && value.to_string().trim() == location
        })
    }

    fn validate(&self) -> Result<()> {
        check_sheet(&self.sheet)?;
        check_positive(&self.sheet, "id_column", self.id_column)?;
        check_positive(&self.sheet, "first_row", self.first_row)?;
        if self.first_row > self.last_row {
            return Err(UpdateError::Layout(format!(
                "{}: first_row {} is after last_row {}",
                self.sheet.trim(),
                self.first_row,
                self.last_row
            )));
        }
        check_address(&self.sheet, self.last_row, self.id_column)?;
        let last_day = offset(&self.sheet, "day_base_column", self.day_base_column, DAYS_IN_MONTH)?;
        check_address(&self.sheet, self.last_row, last_day)?;

        if self.day_columns().contains(&self.id_column) {
            return Err(UpdateError::Layout(format!(
                "{}: day columns overlap the identifier column {}",
                self.sheet.trim(),
                self.id_column
            )));
        }

        if let Some(totals) = &self.totals {
            let columns = [
                ("allocated_column", totals.allocated_column),
                ("total_column", totals.total_column),
                ("balance_column", totals.balance_column),
            ];
            let mut seen = HashSet::new();
            for (name, column) in columns {
                check_positive(&self.sheet, name, column)?;
                check_address(&self.sheet, self.last_row, column)?;
                if column == self.id_column || self.day_columns().contains(&column) {
                    return Err(UpdateError::Layout(format!(
                        "{}: {} {} overlaps the identifier or day columns",
                        self.sheet.trim(),
                        name,
                        column
                    )));
                }
                if !seen.insert(column) {
                    return Err(UpdateError::Layout(format!(
                        "{}: totals columns must be distinct",
                        self.sheet.trim()
                    )));
                }
            }
        }

        Ok(())
    }
}

impl WaterQuantityLayout {
    /// Row of a ship
    pub fn row_for_ship(&self, ship: u32) -> Result<u32> {
        if ship == 0 || ship > self.max_ship {
            return Err(UpdateError::KeyNotFound {
                sheet: self.sheet.clone(),
                key: format!("Ship {}", ship),
            });
        }
        offset(&self.sheet, "base_row", self.base_row, ship)
    }

    fn validate(&self) -> Result<()> {
        check_sheet(&self.sheet)?;
        check_positive(&self.sheet, "max_ship", self.max_ship)?;
        let last_row = offset(&self.sheet, "base_row", self.base_row, self.max_ship)?;
        let columns = [
            ("previous_column", self.previous_column),
            ("final_column", self.final_column),
            ("volume_column", self.volume_column),
        ];
        let mut seen = HashSet::new();
        for (name, column) in columns {
            check_positive(&self.sheet, name, column)?;
            check_address(&self.sheet, last_row, column)?;
            if !seen.insert(column) {
                return Err(UpdateError::Layout(format!(
                    "{}: reading columns must be distinct",
                    self.sheet
                )));
            }
        }
        Ok(())
    }
}

impl ShipColumnLayout {
    fn per_day(sheet: &str) -> Self {
        Self {
            sheet: sheet.into(),
            base_row: 8,
            ship_columns: [(1, 3), (2, 5), (3, 7), (4, 9)]
                .into_iter()
                .map(|(ship, column)| ShipColumn { ship, column })
                .collect(),
        }
    }

    /// Row of a day of the month
    pub fn row_for_day(&self, day: u32) -> Result<u32> {
        check_day(day)?;
        offset(&self.sheet, "base_row", self.base_row, day)
    }

    /// Column assigned to a ship
    pub fn column_for_ship(&self, ship: u32) -> Result<u32> {
        self.ship_columns
            .iter()
            .find(|entry| entry.ship == ship)
            .map(|entry| entry.column)
            .ok_or_else(|| UpdateError::KeyNotFound {
                sheet: self.sheet.clone(),
                key: format!("Ship {}", ship),
            })
    }

    fn validate(&self) -> Result<()> {
        check_sheet(&self.sheet)?;
        if self.ship_columns.is_empty() {
            return Err(UpdateError::Layout(format!(
                "{}: no ship columns",
                self.sheet.trim()
            )));
        }

        let last_row = offset(&self.sheet, "base_row", self.base_row, DAYS_IN_MONTH)?;
        let mut ships = HashSet::new();
        let mut columns = HashSet::new();
        for entry in &self.ship_columns {
            check_positive(&self.sheet, "ship", entry.ship)?;
            check_positive(&self.sheet, "column", entry.column)?;
            check_address(&self.sheet, last_row, entry.column)?;
            if !ships.insert(entry.ship) {
                return Err(UpdateError::Layout(format!(
                    "{}: ship {} is mapped twice",
                    self.sheet.trim(),
                    entry.ship
                )));
            }
            if !columns.insert(entry.column) {
                return Err(UpdateError::Layout(format!(
                    "{}: column {} is mapped to more than one ship",
                    self.sheet.trim(),
                    entry.column
                )));
            }
        }
        Ok(())
    }
}

fn check_day(day: u32) -> Result<()> {
    if (1..=DAYS_IN_MONTH).contains(&day) {
        Ok(())
    } else {
        Err(UpdateError::invalid(format!(
            "day of month {} is outside 1..={}",
            day, DAYS_IN_MONTH
        )))
    }
}

fn check_sheet(sheet: &str) -> Result<()> {
    if sheet.trim().is_empty() {
        return Err(UpdateError::Layout("sheet name cannot be empty".into()));
    }
    Ok(())
}

fn check_positive(sheet: &str, field: &str, value: u32) -> Result<()> {
    if value == 0 {
        return Err(UpdateError::Layout(format!(
            "{}: {} must be at least 1",
            sheet.trim(),
            field
        )));
    }
    Ok(())
}

/// `base + by`, as a layout error when it does not fit
fn offset(sheet: &str, field: &str, base: u32, by: u32) -> Result<u32> {
    base.checked_add(by).ok_or_else(|| {
        UpdateError::Layout(format!("{}: {} {} is out of range", sheet.trim(), field, base))
    })
}

fn check_address(sheet: &str, row: u32, column: u32) -> Result<()> {
    CellAddress::from_one_based(row, column)
        .map(|_| ())
        .map_err(|e| UpdateError::Layout(format!("{}: {}", sheet.trim(), e)))
}
