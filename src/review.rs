use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::Party;
use crate::errors::BackendError;
use crate::times::Times;

pub const MAX_COMMENT_LENGTH: usize = 500;

/// A parent's review of a babysitter.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Review {
    pub id: Uuid,
    pub babysitter: Uuid,
    pub parent: Party,
    pub rating: i16,
    pub comment: String,

    #[serde(flatten)]
    pub times: Times,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: i64,
    pub comment: String,
}

/// A validated review, ready to be stored.
#[derive(Clone, Debug, PartialEq)]
pub struct NewReview {
    pub babysitter: Uuid,
    pub parent: Uuid,
    pub rating: i16,
    pub comment: String,
}

impl ReviewRequest {
    pub fn validate(self, babysitter: Uuid, parent: Uuid) -> Result<NewReview, BackendError> {
        if !(1..=5).contains(&self.rating) {
            return Err(BackendError::validation("rating", "must be between 1 and 5"));
        }

        let comment = self.comment.trim().to_owned();
        let length = comment.chars().count();

        if length == 0 || length > MAX_COMMENT_LENGTH {
            return Err(BackendError::validation(
                "comment",
                format!("must be between 1 and {} characters", MAX_COMMENT_LENGTH),
            ));
        }

        Ok(NewReview {
            babysitter,
            parent,
            rating: self.rating as i16,
            comment,
        })
    }
}

/// The average of `ratings` rounded to two decimal places, or zero
/// when there are none.
pub fn average_rating(ratings: impl IntoIterator<Item = i16>) -> Decimal {
    let (sum, count) = ratings
        .into_iter()
        .fold((0i64, 0i64), |(sum, count), r| (sum + r as i64, count + 1));

    if count == 0 {
        Decimal::ZERO
    } else {
        (Decimal::from(sum) / Decimal::from(count)).round_dp(2)
    }
}
