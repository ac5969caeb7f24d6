//! Save requests as they arrive over HTTP, and the commands they decode into

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UpdateError};
use crate::layout::Layout;

/// A number sent either as a JSON number or as a numeric string
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Loose {
    Number(serde_json::Number),
    Text(String),
}

impl Loose {
    /// Coerce to an exact decimal
    pub fn to_decimal(&self, field: &str) -> Result<Decimal> {
        let text = match self {
            Loose::Number(n) => n.to_string(),
            Loose::Text(s) => s.trim().to_string(),
        };
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|_| UpdateError::invalid(format!("{} is not a number: '{}'", field, text)))
    }

    /// Coerce to a non-negative whole number
    pub fn to_integer(&self, field: &str) -> Result<u32> {
        let value = self.to_decimal(field)?;
        if !value.fract().is_zero() {
            return Err(UpdateError::invalid(format!(
                "{} must be a whole number, got {}",
                field, value
            )));
        }
        value
            .to_u32()
            .ok_or_else(|| UpdateError::invalid(format!("{} is out of range: {}", field, value)))
    }
}

impl fmt::Display for Loose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loose::Number(n) => write!(f, "{}", n),
            Loose::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Loose {
    fn from(n: f64) -> Self {
        match serde_json::Number::from_f64(n) {
            Some(n) => Loose::Number(n),
            None => Loose::Text(n.to_string()),
        }
    }
}

impl From<u32> for Loose {
    fn from(n: u32) -> Self {
        Loose::Number(n.into())
    }
}

impl From<&str> for Loose {
    fn from(s: &str) -> Self {
        Loose::Text(s.to_string())
    }
}

/// Body of `POST /save_data`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    /// `dispatch` or `meter`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub quantity: Option<Loose>,
    #[serde(default)]
    pub day_of_month: Option<Loose>,
    #[serde(default)]
    pub ship_number: Option<Loose>,
    #[serde(default)]
    pub meter1_final: Option<Loose>,
    #[serde(default)]
    pub meter2_final: Option<Loose>,
    #[serde(default)]
    pub meter1_previous: Option<Loose>,
    #[serde(default)]
    pub date: Option<String>,
}

/// Reply to `POST /save_data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    pub message: String,
}

impl SaveResponse {
    pub fn saved() -> Self {
        Self {
            success: true,
            message: "Saved to the workbook".into(),
        }
    }

    pub fn failed(reason: impl fmt::Display) -> Self {
        Self {
            success: false,
            message: format!("Failed to save: {}", reason),
        }
    }
}

/// One record update, with every field coerced
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Dispatch {
        location: String,
        quantity: Decimal,
        day: u32,
    },
    WaterQuantity {
        ship: u32,
        final_reading: Decimal,
        previous_reading: Decimal,
        date: NaiveDate,
    },
    MonthlyProduction {
        ship: u32,
        reading: Decimal,
        date: NaiveDate,
    },
    SecondMeter {
        ship: u32,
        reading: Decimal,
        date: NaiveDate,
    },
}

impl Command {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Dispatch { .. } => "dispatch",
            Command::WaterQuantity { .. } => "water quantity",
            Command::MonthlyProduction { .. } => "monthly production",
            Command::SecondMeter { .. } => "second meter",
        }
    }
}

impl SaveRequest {
    /// Decode into the commands the request stands for
    ///
    /// A `meter` request always updates the water quantity sheet, then the
    /// monthly production and second meter sheets when the layout has them
    /// (the second meter only when `meter2Final` is given).
    pub fn to_commands(&self, layout: &Layout) -> Result<Vec<Command>> {
        match self.kind.as_str() {
            "dispatch" => {
                let location = self
                    .location
                    .clone()
                    .filter(|l| !l.is_empty())
                    .ok_or_else(|| missing("location"))?;
                Ok(vec![Command::Dispatch {
                    location,
                    quantity: required(&self.quantity, "quantity")?.to_decimal("quantity")?,
                    day: required(&self.day_of_month, "dayOfMonth")?.to_integer("dayOfMonth")?,
                }])
            }
            "meter" => {
                let ship = required(&self.ship_number, "shipNumber")?.to_integer("shipNumber")?;
                let final_reading =
                    required(&self.meter1_final, "meter1Final")?.to_decimal("meter1Final")?;
                let previous_reading =
                    required(&self.meter1_previous, "meter1Previous")?.to_decimal("meter1Previous")?;
                let date = parse_date(self.date.as_deref().ok_or_else(|| missing("date"))?)?;

                let mut commands = vec![Command::WaterQuantity {
                    ship,
                    final_reading,
                    previous_reading,
                    date,
                }];
                if layout.monthly_production.is_some() {
                    commands.push(Command::MonthlyProduction {
                        ship,
                        reading: final_reading,
                        date,
                    });
                }
                if let (Some(meter2), Some(_)) = (&self.meter2_final, &layout.second_meter) {
                    commands.push(Command::SecondMeter {
                        ship,
                        reading: meter2.to_decimal("meter2Final")?,
                        date,
                    });
                }
                Ok(commands)
            }
            other => Err(UpdateError::invalid(format!("unknown request type '{}'", other))),
        }
    }
}

fn required<'a>(value: &'a Option<Loose>, field: &str) -> Result<&'a Loose> {
    value.as_ref().ok_or_else(|| missing(field))
}

fn missing(field: &str) -> UpdateError {
    UpdateError::invalid(format!("missing field '{}'", field))
}

/// Parse `YYYY-MM-DD` or an RFC 3339 timestamp
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.date_naive()))
        .map_err(|_| UpdateError::invalid(format!("invalid date '{}'", s)))
}
