//! The flat JSON store
//!
//! ```json
//! {
//!   "dispatch": { "Dibba|3": { "location": "Dibba", "day_of_month": 3, ... } },
//!   "water": { "2|2024-05-01": { "ship_number": 2, "date": "2024-05-01", ... } }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UpdateError};
use crate::fs::atomic_write_bytes;
use crate::layout::{Layout, ShipColumnLayout};
use crate::request::Command;
use crate::store::{meter_volume, AppliedWrite, RecordStore};

/// The whole JSON document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonDocument {
    #[serde(default)]
    pub dispatch: BTreeMap<String, DispatchRecord>,
    #[serde(default)]
    pub water: BTreeMap<String, WaterRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub location: String,
    pub day_of_month: u32,
    pub quantity: f64,
    pub updated_at: DateTime<Utc>,
}

/// Readings of one ship on one date; each command fills in its own fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterRecord {
    pub ship_number: u32,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meter1_previous: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meter1_final: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meter2_final: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl WaterRecord {
    fn new(ship_number: u32, date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            ship_number,
            date,
            meter1_previous: None,
            meter1_final: None,
            volume: None,
            production: None,
            meter2_final: None,
            updated_at: now,
        }
    }
}

impl JsonDocument {
    /// Read a document; a missing file is an empty document
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("{} does not exist yet, starting empty", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(UpdateError::storage(path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| UpdateError::storage(path, e))
    }

    /// Write the document atomically as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(self).map_err(|e| UpdateError::storage(path, e))?;
        bytes.push(b'\n');
        atomic_write_bytes(path, &bytes).map_err(|e| UpdateError::storage(path, e))
    }

    pub fn dispatch_key(location: &str, day: u32) -> String {
        format!("{}|{}", location, day)
    }

    pub fn water_key(ship: u32, date: NaiveDate) -> String {
        format!("{}|{}", ship, date.format("%Y-%m-%d"))
    }

    fn water_entry(&mut self, ship: u32, date: NaiveDate, now: DateTime<Utc>) -> &mut WaterRecord {
        let entry = self
            .water
            .entry(Self::water_key(ship, date))
            .or_insert_with(|| WaterRecord::new(ship, date, now));
        entry.updated_at = now;
        entry
    }
}

/// Store backed by a JSON file
///
/// Records are created on first write. The layout is only used to reject the
/// same keys the workbook store would reject (days outside the month, ships
/// without a row or column), so either backend accepts the same requests.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
    layout: Layout,
}

impl JsonStore {
    pub fn new<P: Into<PathBuf>>(path: P, layout: Layout) -> Self {
        Self {
            path: path.into(),
            layout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply commands to a document in memory
    pub fn apply_to(
        &self,
        doc: &mut JsonDocument,
        commands: &[Command],
        now: DateTime<Utc>,
    ) -> Result<Vec<AppliedWrite>> {
        let mut writes = Vec::new();

        for command in commands {
            match command {
                Command::Dispatch {
                    location,
                    quantity,
                    day,
                } => {
                    self.layout.dispatch.day_column(*day)?;
                    let key = JsonDocument::dispatch_key(location, *day);
                    doc.dispatch.insert(
                        key.clone(),
                        DispatchRecord {
                            location: location.clone(),
                            day_of_month: *day,
                            quantity: number(*quantity)?,
                            updated_at: now,
                        },
                    );
                    writes.push(write("dispatch", &key, "quantity", quantity));
                }
                Command::WaterQuantity {
                    ship,
                    final_reading,
                    previous_reading,
                    date,
                } => {
                    self.layout.water_quantity.row_for_ship(*ship)?;
                    let volume = meter_volume(*final_reading, *previous_reading)?;
                    let (previous, fin, vol) =
                        (number(*previous_reading)?, number(*final_reading)?, number(volume)?);

                    let record = doc.water_entry(*ship, *date, now);
                    record.meter1_previous = Some(previous);
                    record.meter1_final = Some(fin);
                    record.volume = Some(vol);

                    let key = JsonDocument::water_key(*ship, *date);
                    writes.push(write("water", &key, "meter1_previous", previous_reading));
                    writes.push(write("water", &key, "meter1_final", final_reading));
                    writes.push(write("water", &key, "volume", &volume));
                }
                Command::MonthlyProduction { ship, reading, date } => {
                    check_ship(&self.layout.monthly_production, "monthly production", *ship)?;
                    let value = number(*reading)?;
                    doc.water_entry(*ship, *date, now).production = Some(value);
                    let key = JsonDocument::water_key(*ship, *date);
                    writes.push(write("water", &key, "production", reading));
                }
                Command::SecondMeter { ship, reading, date } => {
                    check_ship(&self.layout.second_meter, "second meter", *ship)?;
                    let value = number(*reading)?;
                    doc.water_entry(*ship, *date, now).meter2_final = Some(value);
                    let key = JsonDocument::water_key(*ship, *date);
                    writes.push(write("water", &key, "meter2_final", reading));
                }
            }
        }

        Ok(writes)
    }
}

impl RecordStore for JsonStore {
    fn apply(&mut self, commands: &[Command]) -> Result<Vec<AppliedWrite>> {
        let mut doc = JsonDocument::load(&self.path)?;
        let writes = self.apply_to(&mut doc, commands, Utc::now())?;
        doc.save(&self.path)?;
        Ok(writes)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn check_ship(section: &Option<ShipColumnLayout>, name: &str, ship: u32) -> Result<()> {
    let section = section
        .as_ref()
        .ok_or_else(|| UpdateError::Layout(format!("no {} sheet is configured", name)))?;
    section.column_for_ship(ship).map(|_| ())
}

fn write(category: &str, key: &str, field: &str, value: &Decimal) -> AppliedWrite {
    AppliedWrite {
        target: format!("{}[{}].{}", category, key, field),
        value: value.to_string(),
    }
}

fn number(value: Decimal) -> Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| UpdateError::invalid(format!("{} cannot be stored as a number", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_meter_commands_share_a_record() {
        let store = JsonStore::new("unused.json", Layout::default());
        let mut doc = JsonDocument::default();

        let writes = store
            .apply_to(
                &mut doc,
                &[
                    Command::WaterQuantity {
                        ship: 2,
                        final_reading: dec("150"),
                        previous_reading: dec("120.5"),
                        date: date(),
                    },
                    Command::MonthlyProduction {
                        ship: 2,
                        reading: dec("150"),
                        date: date(),
                    },
                ],
                now(),
            )
            .unwrap();

        assert_eq!(writes.len(), 4);
        assert_eq!(writes[2].to_string(), "water[2|2024-05-01].volume = 29.5");

        let record = &doc.water["2|2024-05-01"];
        assert_eq!(record.meter1_previous, Some(120.5));
        assert_eq!(record.meter1_final, Some(150.0));
        assert_eq!(record.volume, Some(29.5));
        assert_eq!(record.production, Some(150.0));
        assert_eq!(record.meter2_final, None);
    }

    #[test]
    fn test_second_meter_keeps_other_fields() {
        let store = JsonStore::new("unused.json", Layout::default());
        let mut doc = JsonDocument::default();
        let mut record = WaterRecord::new(1, date(), now());
        record.meter1_final = Some(10.0);
        doc.water.insert(JsonDocument::water_key(1, date()), record);

        store
            .apply_to(
                &mut doc,
                &[Command::SecondMeter {
                    ship: 1,
                    reading: dec("4"),
                    date: date(),
                }],
                now(),
            )
            .unwrap();

        let record = &doc.water["1|2024-05-01"];
        assert_eq!(record.meter1_final, Some(10.0));
        assert_eq!(record.meter2_final, Some(4.0));
    }

    #[test]
    fn test_rejects_keys_outside_layout() {
        let store = JsonStore::new("unused.json", Layout::default());
        let mut doc = JsonDocument::default();

        let err = store
            .apply_to(
                &mut doc,
                &[Command::Dispatch {
                    location: "Dibba".into(),
                    quantity: dec("1"),
                    day: 32,
                }],
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, UpdateError::InvalidInput(_)));

        let err = store
            .apply_to(
                &mut doc,
                &[Command::MonthlyProduction {
                    ship: 5,
                    reading: dec("1"),
                    date: date(),
                }],
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, UpdateError::KeyNotFound { .. }));
    }

    #[test]
    fn test_store_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let mut store = JsonStore::new(&path, Layout::default());

        store
            .apply(&[Command::Dispatch {
                location: "Dibba".into(),
                quantity: dec("42.5"),
                day: 3,
            }])
            .unwrap();

        let doc = JsonDocument::load(&path).unwrap();
        assert_eq!(doc.dispatch.len(), 1);
        assert_eq!(doc.dispatch["Dibba|3"].quantity, 42.5);
        assert!(doc.water.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        fs::write(&path, b"{not json").unwrap();

        let err = JsonDocument::load(&path).unwrap_err();
        assert!(matches!(err, UpdateError::StorageIo { .. }));
    }

    #[test]
    fn test_meter_volume_out_of_range() {
        let store = JsonStore::new("unused.json", Layout::default());
        let mut doc = JsonDocument::default();

        let err = store
            .apply_to(
                &mut doc,
                &[Command::WaterQuantity {
                    ship: 1,
                    final_reading: Decimal::MAX,
                    previous_reading: dec("-1"),
                    date: date(),
                }],
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, UpdateError::InvalidInput(_)));
        assert!(doc.water.is_empty());
    }
}
