use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, Time};
use uuid::Uuid;

use crate::account::Party;
use crate::errors::BackendError;
use crate::times::Times;

pub const MIN_DURATION: i64 = 1;
pub const MAX_DURATION: i64 = 12;
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

time::serde::format_description!(hour_minute, Time, "[hour]:[minute]");

/// Where a reservation is in its lifecycle.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,

    #[serde(alias = "accepted")]
    Confirmed,

    #[serde(alias = "rejected", alias = "declined")]
    Cancelled,

    Completed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        use ReservationStatus::*;

        match self {
            Pending => "pending",
            Confirmed => "confirmed",
            Cancelled => "cancelled",
            Completed => "completed",
        }
    }

    /// Whether `self → next` is an edge of the lifecycle. The only
    /// edges are `pending → confirmed`, `pending → cancelled` and
    /// `confirmed → completed`.
    pub fn can_become(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;

        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed)
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use ReservationStatus::*;

        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Pending),
            "confirmed" | "accepted" => Ok(Confirmed),
            "cancelled" | "rejected" | "declined" => Ok(Cancelled),
            "completed" => Ok(Completed),
            other => Err(format!("unknown status {:?}", other)),
        }
    }
}

/// A booking of one babysitter by one parent.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Reservation {
    pub id: Uuid,
    pub parent: Party,
    pub babysitter: Party,
    pub date: Date,

    #[serde(with = "hour_minute")]
    pub time: Time,

    /// Whole hours, between 1 and 12.
    pub duration: i16,

    /// The babysitter's hourly rate at booking time multiplied by
    /// `duration`. This is a snapshot: it is stored once and never
    /// recomputed when the rate changes afterwards.
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,

    pub status: ReservationStatus,
    pub description: Option<String>,

    #[serde(flatten)]
    pub times: Times,
}

/// A request to book a babysitter, as submitted by a parent.
#[derive(Clone, Debug, Deserialize)]
pub struct ReservationRequest {
    #[serde(alias = "babysitter_id", alias = "babysitterId")]
    pub babysitter: Uuid,

    pub date: Date,

    pub time: String,

    pub duration: i64,

    #[serde(default)]
    pub description: Option<String>,
}

/// A validated request, ready for pricing and storage.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedRequest {
    pub babysitter: Uuid,
    pub date: Date,
    pub time: Time,
    pub duration: i16,
    pub description: Option<String>,
}

impl ReservationRequest {
    pub fn validate(self) -> Result<ValidatedRequest, BackendError> {
        let duration = validate_duration(self.duration)?;
        let time = parse_time_of_day(&self.time)?;

        let description = self
            .description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        if let Some(d) = &description {
            if d.chars().count() > MAX_DESCRIPTION_LENGTH {
                return Err(BackendError::validation(
                    "description",
                    format!("must be at most {} characters", MAX_DESCRIPTION_LENGTH),
                ));
            }
        }

        Ok(ValidatedRequest {
            babysitter: self.babysitter,
            date: self.date,
            time,
            duration,
            description,
        })
    }
}

/// A priced reservation about to be stored.
#[derive(Clone, Debug)]
pub struct NewReservation {
    pub parent: Uuid,
    pub babysitter: Uuid,
    pub date: Date,
    pub time: Time,
    pub duration: i16,
    pub total: Decimal,
    pub description: Option<String>,
}

impl NewReservation {
    pub fn new(parent: Uuid, request: ValidatedRequest, hourly_rate: Decimal) -> Self {
        NewReservation {
            parent,
            babysitter: request.babysitter,
            date: request.date,
            time: request.time,
            duration: request.duration,
            total: compute_total(hourly_rate, request.duration),
            description: request.description,
        }
    }
}

/// A request to move a reservation to another status.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct StatusRequest {
    pub status: ReservationStatus,
}

/// Exact decimal product of the hourly rate and the number of hours.
pub fn compute_total(hourly_rate: Decimal, duration: i16) -> Decimal {
    hourly_rate * Decimal::from(duration)
}

pub fn validate_duration(duration: i64) -> Result<i16, BackendError> {
    if (MIN_DURATION..=MAX_DURATION).contains(&duration) {
        // bounded above, so this cannot truncate
        Ok(duration as i16)
    } else {
        Err(BackendError::validation(
            "duration",
            format!(
                "must be between {} and {} hours",
                MIN_DURATION, MAX_DURATION
            ),
        ))
    }
}

/// Parses a 24-hour `HH:MM` time of day. Single-digit hours are accepted.
pub fn parse_time_of_day(s: &str) -> Result<Time, BackendError> {
    use time::macros::format_description;

    let s = s.trim();

    Time::parse(s, format_description!("[hour]:[minute]"))
        .or_else(|_| Time::parse(s, format_description!("[hour padding:none]:[minute]")))
        .map_err(|_| BackendError::validation("time", "must be a 24-hour time as HH:MM"))
}
