//! Trip basecamp
//!
//! The basecamp is the shared home location of a trip. Updating it requires
//! connectivity; it is never queued for later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::SharedError;

/// Shared home location of a trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Basecamp {
    pub trip_id: String,
    pub name: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub updated_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Basecamp {
    pub fn new(
        trip_id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            trip_id: trip_id.into(),
            name: name.into(),
            address: address.into(),
            latitude: None,
            longitude: None,
            updated_by: None,
            updated_at: None,
        }
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn validate(&self) -> Result<(), SharedError> {
        if self.address.trim().is_empty() {
            return Err(SharedError::validation("address", "A basecamp needs an address"));
        }
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                    return Err(SharedError::validation(
                        "coordinates",
                        "Coordinates are out of range",
                    ));
                }
            }
            (None, None) => {}
            _ => {
                return Err(SharedError::validation(
                    "coordinates",
                    "Latitude and longitude must be set together",
                ))
            }
        }
        Ok(())
    }
}
