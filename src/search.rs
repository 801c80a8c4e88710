use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::Babysitter;
use crate::errors::BackendError;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// The raw query string of a babysitter search. Every value is kept
/// as a string so that a malformed one can be reported by name.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BabysitterQuery {
    pub location: Option<String>,

    #[serde(alias = "minPrice")]
    pub min_rate: Option<String>,

    #[serde(alias = "maxPrice")]
    pub max_rate: Option<String>,

    #[serde(alias = "experience")]
    pub min_experience: Option<String>,

    pub skills: Option<String>,

    #[serde(alias = "availability")]
    pub available: Option<String>,

    pub page: Option<String>,

    #[serde(alias = "limit")]
    pub page_size: Option<String>,
}

/// Criteria a babysitter must meet to be listed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BabysitterFilter {
    /// Case-insensitive substring of the address.
    pub location: Option<String>,
    pub min_rate: Option<Decimal>,
    pub max_rate: Option<Decimal>,
    pub min_experience: Option<i32>,

    /// At least one of these must be among the babysitter's skills.
    pub skills: Vec<String>,

    pub available: Option<bool>,
}

impl BabysitterFilter {
    pub fn matches(&self, babysitter: &Babysitter) -> bool {
        let profile = &babysitter.profile;

        if let Some(location) = &self.location {
            if !babysitter
                .account
                .address
                .to_lowercase()
                .contains(&location.to_lowercase())
            {
                return false;
            }
        }

        if matches!(self.min_rate, Some(min) if profile.hourly_rate < min) {
            return false;
        }

        if matches!(self.max_rate, Some(max) if profile.hourly_rate > max) {
            return false;
        }

        if matches!(self.min_experience, Some(min) if profile.experience < min) {
            return false;
        }

        if !self.skills.is_empty() && !profile.skills.iter().any(|s| self.skills.contains(s)) {
            return false;
        }

        if matches!(self.available, Some(a) if profile.available != a) {
            return false;
        }

        true
    }
}

/// A 1-indexed page of results.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.page_size as u64)
    }
}

/// One page of a babysitter search.
#[derive(Debug, Serialize)]
pub struct BabysitterListing {
    pub items: Vec<Babysitter>,
    pub page: u32,
    pub total_pages: u64,
    pub total: u64,
}

impl BabysitterListing {
    pub fn new(items: Vec<Babysitter>, page: Page, total: u64) -> Self {
        BabysitterListing {
            items,
            page: page.page,
            total_pages: page.total_pages(total),
            total,
        }
    }
}

impl BabysitterQuery {
    /// Validates every parameter, naming the first malformed one.
    pub fn parse(self) -> Result<(BabysitterFilter, Page), BackendError> {
        let filter = BabysitterFilter {
            location: non_blank(self.location),
            min_rate: parse("min_rate", self.min_rate, parse_rate)?,
            max_rate: parse("max_rate", self.max_rate, parse_rate)?,
            min_experience: parse("min_experience", self.min_experience, |s| {
                s.parse::<i32>().ok().filter(|e| *e >= 0)
            })?,
            skills: self.skills.map(|s| parse_skills(&s)).unwrap_or_default(),
            available: parse("available", self.available, parse_bool)?,
        };

        let page = Page {
            page: parse("page", self.page, |s| s.parse::<u32>().ok().filter(|p| *p >= 1))?
                .unwrap_or(1),
            page_size: parse("page_size", self.page_size, |s| {
                s.parse::<u32>()
                    .ok()
                    .filter(|p| (1..=MAX_PAGE_SIZE).contains(p))
            })?
            .unwrap_or(DEFAULT_PAGE_SIZE),
        };

        Ok((filter, page))
    }
}

/// Splits a comma-separated list, dropping blank entries.
pub fn parse_skills(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse<T>(
    field: &'static str,
    value: Option<String>,
    parser: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, BackendError> {
    match non_blank(value) {
        None => Ok(None),
        Some(s) => parser(&s)
            .map(Some)
            .ok_or_else(|| BackendError::validation(field, format!("cannot use {:?}", s))),
    }
}

fn parse_rate(s: &str) -> Option<Decimal> {
    s.parse::<Decimal>().ok().filter(|d| !d.is_sign_negative())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}
