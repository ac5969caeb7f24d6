//! The record updater: request in, one serialized store update, response out

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::{Result, UpdateError};
use crate::layout::Layout;
use crate::request::{Command, SaveRequest, SaveResponse};
use crate::store::{AppliedWrite, JsonStore, RecordStore, XlsxStore};

/// Applies updates to one store
///
/// Every update is a full load-mutate-save cycle. The store sits behind a
/// mutex, so concurrent updates to the same document run one after another.
pub struct RecordUpdater {
    layout: Layout,
    store: Mutex<Box<dyn RecordStore>>,
}

impl RecordUpdater {
    pub fn new(layout: Layout, store: Box<dyn RecordStore>) -> Self {
        Self {
            layout,
            store: Mutex::new(store),
        }
    }

    /// Updater over an xlsx workbook
    pub fn xlsx<P: Into<PathBuf>>(path: P, layout: Layout) -> Self {
        let store = XlsxStore::new(path, layout.clone());
        Self::new(layout, Box::new(store))
    }

    /// Updater over a JSON document
    pub fn json<P: Into<PathBuf>>(path: P, layout: Layout) -> Self {
        let store = JsonStore::new(path, layout.clone());
        Self::new(layout, Box::new(store))
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn describe_store(&self) -> String {
        self.store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .describe()
    }

    pub fn update_dispatch(&self, location: &str, quantity: Decimal, day: u32) -> Result<Vec<AppliedWrite>> {
        self.apply(&[Command::Dispatch {
            location: location.to_string(),
            quantity,
            day,
        }])
    }

    pub fn update_water_quantity(
        &self,
        ship: u32,
        final_reading: Decimal,
        previous_reading: Decimal,
        date: NaiveDate,
    ) -> Result<Vec<AppliedWrite>> {
        self.apply(&[Command::WaterQuantity {
            ship,
            final_reading,
            previous_reading,
            date,
        }])
    }

    pub fn update_monthly_production(
        &self,
        ship: u32,
        reading: Decimal,
        date: NaiveDate,
    ) -> Result<Vec<AppliedWrite>> {
        self.apply(&[Command::MonthlyProduction { ship, reading, date }])
    }

    pub fn update_second_meter(
        &self,
        ship: u32,
        reading: Decimal,
        date: NaiveDate,
    ) -> Result<Vec<AppliedWrite>> {
        self.apply(&[Command::SecondMeter { ship, reading, date }])
    }

    /// Apply a batch of commands as one store update
    pub fn apply(&self, commands: &[Command]) -> Result<Vec<AppliedWrite>> {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        let result = store.apply(commands);

        match &result {
            Ok(writes) => {
                for command in commands {
                    tracing::info!(store = %store.describe(), "applied {} update: {:?}", command.name(), command);
                }
                for write in writes {
                    tracing::debug!("wrote {write}");
                }
            }
            Err(e) => log_failure(e),
        }
        result
    }

    /// Decode and apply a save request
    pub fn handle(&self, request: &SaveRequest) -> SaveResponse {
        let commands = match request.to_commands(&self.layout) {
            Ok(commands) => commands,
            Err(e) => {
                log_failure(&e);
                return SaveResponse::failed(e);
            }
        };

        match self.apply(&commands) {
            Ok(_) => SaveResponse::saved(),
            Err(e) => SaveResponse::failed(e),
        }
    }

    /// Decode a raw `POST /save_data` body and apply it
    pub fn handle_json(&self, body: &[u8]) -> SaveResponse {
        match serde_json::from_slice::<SaveRequest>(body) {
            Ok(request) => self.handle(&request),
            Err(e) => {
                let e = UpdateError::invalid(e.to_string());
                log_failure(&e);
                SaveResponse::failed(e)
            }
        }
    }
}

impl std::fmt::Debug for RecordUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordUpdater")
            .field("layout", &self.layout)
            .field("store", &self.describe_store())
            .finish()
    }
}

fn log_failure(e: &UpdateError) {
    match e {
        UpdateError::InvalidInput(_)
        | UpdateError::KeyNotFound { .. } => tracing::warn!("rejected update: {e}"),
        UpdateError::SheetMissing(_)
        | UpdateError::StorageIo { .. }
        | UpdateError::Layout(_) => tracing::error!("update failed: {e}"),
    }
}
