//! Location samples reported by a sharing browser.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::StoreError;

/// One stored location fix. `captured_at` is always assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LocationSample {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

/// Validated coordinates waiting to be stamped by the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
}

impl LocationFix {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            accuracy: None,
            heading: None,
            speed: None,
        }
    }

    pub fn captured_at(self, captured_at: DateTime<Utc>) -> LocationSample {
        LocationSample {
            lat: self.lat,
            lng: self.lng,
            accuracy: self.accuracy,
            heading: self.heading,
            speed: self.speed,
            captured_at,
        }
    }
}

/// Raw body of a location update. Fields are kept loosely typed so that a
/// missing or malformed coordinate becomes an `InvalidInput` instead of a
/// deserialization rejection.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LocationInput {
    #[schema(value_type = Option<f64>)]
    pub lat: Option<Value>,
    #[schema(value_type = Option<f64>)]
    pub lng: Option<Value>,
    #[schema(value_type = Option<f64>)]
    pub accuracy: Option<Value>,
    #[schema(value_type = Option<f64>)]
    pub heading: Option<Value>,
    #[schema(value_type = Option<f64>)]
    pub speed: Option<Value>,
}

impl LocationInput {
    /// Parses a request body leniently; anything that is not a JSON object
    /// yields an empty input.
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<LocationFix, StoreError> {
        let lat = required(&self.lat)?;
        let lng = required(&self.lng)?;
        Ok(LocationFix {
            lat,
            lng,
            accuracy: optional("accuracy", &self.accuracy)?,
            heading: optional("heading", &self.heading)?,
            speed: optional("speed", &self.speed)?,
        })
    }
}

impl From<LocationFix> for LocationInput {
    fn from(fix: LocationFix) -> Self {
        let number = |v: f64| Some(Value::from(v));
        Self {
            lat: number(fix.lat),
            lng: number(fix.lng),
            accuracy: fix.accuracy.and_then(number),
            heading: fix.heading.and_then(number),
            speed: fix.speed.and_then(number),
        }
    }
}

fn required(value: &Option<Value>) -> Result<f64, StoreError> {
    match value.as_ref().filter(|v| !v.is_null()) {
        None => Err(StoreError::InvalidInput("lat/lng is required".to_string())),
        Some(v) => {
            coerce(v).ok_or_else(|| StoreError::InvalidInput("lat/lng must be numeric".to_string()))
        }
    }
}

fn optional(field: &str, value: &Option<Value>) -> Result<Option<f64>, StoreError> {
    match value.as_ref().filter(|v| !v.is_null()) {
        None => Ok(None),
        Some(v) => coerce(v)
            .map(Some)
            .ok_or_else(|| StoreError::InvalidInput(format!("{} must be numeric", field))),
    }
}

fn coerce(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}
