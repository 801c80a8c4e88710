use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::BackendError;
use crate::normalization;
use crate::times::Times;

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_BIO_LENGTH: usize = 500;
const MAX_HOURLY_RATE: i64 = 10_000;

/// The two kinds of account.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Parent,
    Babysitter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Parent => "parent",
            Role::Babysitter => "babysitter",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parent" => Ok(Role::Parent),
            "babysitter" => Ok(Role::Babysitter),
            other => Err(format!("unknown role {:?}", other)),
        }
    }
}

/// An authenticated account as resolved from a session token.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Identity {
    pub id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn new(id: Uuid, role: Role) -> Self {
        Identity { id, role }
    }
}

/// Whoever is making a request. Every lifecycle operation receives
/// this explicitly.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Requester {
    /// An authenticated parent or babysitter.
    Party(Identity),

    /// An operator calling through the admin server.
    Administrator,
}

impl Requester {
    pub fn party(&self) -> Option<&Identity> {
        match self {
            Requester::Party(identity) => Some(identity),
            Requester::Administrator => None,
        }
    }
}

/// The minimal public view of an account, attached to reservations
/// and reviews for display.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Party {
    pub id: Uuid,
    pub name: String,
    pub photo: String,
}

/// A single account. Credentials are never part of this type.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub age: i16,
    pub contact: String,
    pub address: String,
    pub photo: String,

    #[serde(flatten)]
    pub times: Times,
}

impl Account {
    pub fn identity(&self) -> Identity {
        Identity::new(self.id, self.role)
    }

    pub fn party(&self) -> Party {
        Party {
            id: self.id,
            name: self.name.clone(),
            photo: self.photo.clone(),
        }
    }
}

/// The babysitter-specific part of an account.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BabysitterProfile {
    /// The hourly rate charged for new bookings.
    #[serde(with = "rust_decimal::serde::float")]
    pub hourly_rate: Decimal,

    /// Years of experience.
    pub experience: i32,

    pub skills: Vec<String>,

    /// Whether the babysitter currently takes bookings.
    pub available: bool,

    /// The average of all review ratings, to two decimal places.
    #[serde(with = "rust_decimal::serde::float")]
    pub rating: Decimal,

    pub total_reviews: i32,

    pub bio: Option<String>,
}

/// A babysitter account as listed publicly.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Babysitter {
    #[serde(flatten)]
    pub account: Account,

    #[serde(flatten)]
    pub profile: BabysitterProfile,
}

impl Babysitter {
    pub fn id(&self) -> Uuid {
        self.account.id
    }
}

/// A sign-up request.
#[derive(Clone, Debug, Deserialize)]
pub struct Registration {
    pub role: Role,

    #[serde(deserialize_with = "normalization::deserialize")]
    pub name: String,

    #[serde(deserialize_with = "normalization::deserialize_email")]
    pub email: String,

    pub password: String,

    pub age: i16,

    pub contact: String,

    #[serde(alias = "adresse")]
    pub address: String,

    pub photo: String,

    #[serde(default, alias = "tarif", with = "rust_decimal::serde::float_option")]
    pub hourly_rate: Option<Decimal>,

    #[serde(default)]
    pub experience: Option<i32>,

    #[serde(default, alias = "competances")]
    pub skills: Vec<String>,

    #[serde(default, alias = "disponibilite")]
    pub available: Option<bool>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub bio: Option<String>,
}

/// A validated sign-up, ready to be stored.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub role: Role,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub age: i16,
    pub contact: String,
    pub address: String,
    pub photo: String,
    pub profile: Option<BabysitterProfile>,
}

impl Registration {
    /// Checks every field and builds the record to store. The password
    /// is hashed by the caller and passed in.
    pub fn validate(&self) -> Result<(), BackendError> {
        require("name", &self.name)?;
        require("email", &self.email)?;

        if !self.email.contains('@') {
            return Err(BackendError::validation("email", "must be an email address"));
        }

        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(BackendError::validation(
                "password",
                format!("must be at least {} characters", MIN_PASSWORD_LENGTH),
            ));
        }

        if !(1..=120).contains(&self.age) {
            return Err(BackendError::validation("age", "must be between 1 and 120"));
        }

        require("contact", &self.contact)?;
        require("address", &self.address)?;
        require("photo", &self.photo)?;

        if let Some(rate) = self.hourly_rate {
            if rate.is_sign_negative() {
                return Err(BackendError::validation("hourly_rate", "must not be negative"));
            }

            if rate.round_dp(2) > Decimal::from(MAX_HOURLY_RATE) {
                return Err(BackendError::validation(
                    "hourly_rate",
                    format!("must be at most {}", MAX_HOURLY_RATE),
                ));
            }
        }

        if let Some(experience) = self.experience {
            if experience < 0 {
                return Err(BackendError::validation("experience", "must not be negative"));
            }
        }

        if let Some(bio) = &self.bio {
            if bio.chars().count() > MAX_BIO_LENGTH {
                return Err(BackendError::validation(
                    "bio",
                    format!("must be at most {} characters", MAX_BIO_LENGTH),
                ));
            }
        }

        Ok(())
    }

    pub fn into_new_account(self, password_hash: String) -> NewAccount {
        let profile = match self.role {
            Role::Parent => None,
            Role::Babysitter => Some(BabysitterProfile {
                hourly_rate: self.hourly_rate.unwrap_or_default().round_dp(2),
                experience: self.experience.unwrap_or(0),
                skills: self
                    .skills
                    .into_iter()
                    .map(|s| s.trim().to_owned())
                    .filter(|s| !s.is_empty())
                    .collect(),
                available: self.available.unwrap_or(true),
                rating: Decimal::ZERO,
                total_reviews: 0,
                bio: self.bio,
            }),
        };

        NewAccount {
            role: self.role,
            name: self.name,
            email: self.email,
            password_hash,
            age: self.age,
            contact: self.contact.trim().to_owned(),
            address: self.address.trim().to_owned(),
            photo: self.photo.trim().to_owned(),
            profile,
        }
    }
}

/// A login request.
#[derive(Clone, Debug, Deserialize)]
pub struct Credentials {
    #[serde(deserialize_with = "normalization::deserialize_email")]
    pub email: String,

    pub password: String,
}

/// A babysitter's availability update.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct AvailabilityUpdate {
    #[serde(alias = "disponibilite")]
    pub available: bool,
}

fn require(field: &'static str, value: &str) -> Result<(), BackendError> {
    if value.trim().is_empty() {
        Err(BackendError::validation(field, "is required"))
    } else {
        Ok(())
    }
}
