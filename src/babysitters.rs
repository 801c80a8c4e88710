use log::{info, Logger};
use uuid::Uuid;

use crate::account::{Babysitter, Identity, Role};
use crate::db::Db;
use crate::errors::BackendError;
use crate::review::{Review, ReviewRequest};
use crate::search::{BabysitterListing, BabysitterQuery};

pub async fn list_babysitters(
    db: &(dyn Db + Send + Sync),
    query: BabysitterQuery,
) -> Result<BabysitterListing, BackendError> {
    let (filter, page) = query.parse()?;
    let (items, total) = db.search_babysitters(&filter, page).await?;

    Ok(BabysitterListing::new(items, page, total))
}

pub async fn retrieve_babysitter(
    db: &(dyn Db + Send + Sync),
    id: &Uuid,
) -> Result<Babysitter, BackendError> {
    db.retrieve_babysitter(id)
        .await?
        .ok_or(BackendError::NonExistentBabysitter(*id))
}

/// Lets a babysitter open or close their own listing to bookings.
pub async fn update_availability(
    logger: &Logger,
    db: &(dyn Db + Send + Sync),
    identity: &Identity,
    available: bool,
) -> Result<Babysitter, BackendError> {
    if identity.role != Role::Babysitter {
        return Err(BackendError::Forbidden {
            reason: "only babysitters have an availability",
        });
    }

    let babysitter = db
        .update_availability(&identity.id, available)
        .await?
        .ok_or(BackendError::NonExistentBabysitter(identity.id))?;

    info!(logger, "Updated availability"; "babysitter" => %identity.id, "available" => available);

    Ok(babysitter)
}

pub async fn create_review(
    logger: &Logger,
    db: &(dyn Db + Send + Sync),
    identity: &Identity,
    babysitter: &Uuid,
    request: ReviewRequest,
) -> Result<Review, BackendError> {
    if identity.role != Role::Parent {
        return Err(BackendError::Forbidden {
            reason: "only parents can review babysitters",
        });
    }

    let review = request.validate(*babysitter, identity.id)?;

    retrieve_babysitter(db, babysitter).await?;
    let review = db.insert_review(review).await?;

    info!(logger, "Reviewed babysitter"; "babysitter" => %babysitter, "rating" => review.rating);

    Ok(review)
}

/// Reviews of a babysitter, newest first.
pub async fn list_reviews(
    db: &(dyn Db + Send + Sync),
    babysitter: &Uuid,
) -> Result<Vec<Review>, BackendError> {
    retrieve_babysitter(db, babysitter).await?;

    db.list_reviews(babysitter).await
}
