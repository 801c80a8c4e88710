//! Booking, listing, status changes and deletion of reservations.
//!
//! Every operation receives the requester explicitly and checks it
//! through [`authorize`] before touching the store.

use log::{debug, info, o, warn, Logger};
use uuid::Uuid;

use crate::account::{Identity, Requester, Role};
use crate::db::Db;
use crate::errors::BackendError;
use crate::reservation::{NewReservation, Reservation, ReservationRequest, ReservationStatus};

/// Something a requester wants to do with reservations.
#[derive(Clone, Copy, Debug)]
pub enum Operation<'a> {
    Create,
    List,
    Transition {
        reservation: &'a Reservation,
        to: ReservationStatus,
    },
    Delete {
        reservation: &'a Reservation,
    },
}

/// The single place where reservation permissions are decided.
///
/// For status changes the checks run in a fixed order: a requester
/// unrelated to the reservation is refused first, then a change that
/// is not an edge of the lifecycle is a conflict, and only then is the
/// edge checked against the requester's role.
pub fn authorize(requester: &Requester, operation: Operation<'_>) -> Result<(), BackendError> {
    use ReservationStatus::*;

    match operation {
        Operation::Create => match requester {
            Requester::Party(Identity {
                role: Role::Parent, ..
            }) => Ok(()),
            _ => Err(forbidden("only parents can book a babysitter")),
        },

        Operation::List => match requester {
            Requester::Party(_) => Ok(()),
            Requester::Administrator => Err(forbidden("administrators have no reservations")),
        },

        Operation::Transition { reservation, to } => {
            let relation = relation(requester, reservation)?;
            let from = reservation.status;

            if !from.can_become(to) {
                return Err(BackendError::InvalidTransition { from, to });
            }

            let allowed = match (from, to) {
                (Pending, Confirmed) => relation == Relation::Babysitter,
                (Pending, Cancelled) => true,
                (Confirmed, Completed) => relation != Relation::Parent,
                _ => false,
            };

            if allowed {
                Ok(())
            } else {
                Err(forbidden("this status change is not permitted to the requester"))
            }
        }

        Operation::Delete { reservation } => match relation(requester, reservation)? {
            Relation::Administrator => Ok(()),
            Relation::Parent if reservation.status == Pending => Ok(()),
            Relation::Parent => Err(BackendError::NotPending(reservation.status)),
            Relation::Babysitter => Err(forbidden(
                "babysitters decline reservations instead of deleting them",
            )),
        },
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Relation {
    Parent,
    Babysitter,
    Administrator,
}

fn relation(requester: &Requester, reservation: &Reservation) -> Result<Relation, BackendError> {
    match requester {
        Requester::Administrator => Ok(Relation::Administrator),
        Requester::Party(identity) if identity.id == reservation.parent.id => Ok(Relation::Parent),
        Requester::Party(identity) if identity.id == reservation.babysitter.id => {
            Ok(Relation::Babysitter)
        }
        Requester::Party(_) => Err(forbidden("not a party to this reservation")),
    }
}

fn forbidden(reason: &'static str) -> BackendError {
    BackendError::Forbidden { reason }
}

/// Books a babysitter for the requesting parent. The total is priced
/// from the babysitter's current rate and stored with the reservation.
pub async fn create_reservation(
    logger: &Logger,
    db: &(dyn Db + Send + Sync),
    requester: &Requester,
    request: ReservationRequest,
) -> Result<Reservation, BackendError> {
    authorize(requester, Operation::Create)?;
    let parent = requester
        .party()
        .ok_or_else(|| forbidden("only parents can book a babysitter"))?;

    let request = request.validate()?;

    let babysitter = db
        .retrieve_babysitter(&request.babysitter)
        .await?
        .ok_or(BackendError::NonExistentBabysitter(request.babysitter))?;

    db.retrieve_account(&parent.id)
        .await?
        .ok_or(BackendError::NonExistentAccount(parent.id))?;

    let new_reservation = NewReservation::new(parent.id, request, babysitter.profile.hourly_rate);
    let reservation = db.insert_reservation(new_reservation).await?;

    info!(logger, "Created reservation";
        "id" => %reservation.id,
        "parent" => %reservation.parent.id,
        "babysitter" => %reservation.babysitter.id,
        "total" => %reservation.total);

    Ok(reservation)
}

/// The reservations the requester takes part in, most recent date first.
pub async fn list_reservations(
    db: &(dyn Db + Send + Sync),
    requester: &Requester,
) -> Result<Vec<Reservation>, BackendError> {
    authorize(requester, Operation::List)?;
    let identity = requester
        .party()
        .ok_or_else(|| forbidden("administrators have no reservations"))?;

    db.list_reservations(identity).await
}

pub async fn update_status(
    logger: &Logger,
    db: &(dyn Db + Send + Sync),
    requester: &Requester,
    id: &Uuid,
    to: ReservationStatus,
) -> Result<Reservation, BackendError> {
    let logger = logger.new(o!("reservation" => id.to_string()));

    let reservation = retrieve(db, id).await?;
    let from = reservation.status;

    authorize(
        requester,
        Operation::Transition {
            reservation: &reservation,
            to,
        },
    )?;

    debug!(logger, "Changing status"; "from" => %from, "to" => %to);

    match db.transition_reservation(id, from, to).await? {
        Some(updated) => {
            info!(logger, "Changed status"; "from" => %from, "to" => %updated.status);
            Ok(updated)
        }
        None => {
            // the write matched nothing, so someone else got there first
            let current = retrieve(db, id).await?;
            warn!(logger, "Lost status update"; "expected" => %from, "found" => %current.status);

            Err(BackendError::StaleStatus { expected: from })
        }
    }
}

pub async fn delete_reservation(
    logger: &Logger,
    db: &(dyn Db + Send + Sync),
    requester: &Requester,
    id: &Uuid,
) -> Result<(), BackendError> {
    let logger = logger.new(o!("reservation" => id.to_string()));

    let reservation = retrieve(db, id).await?;

    authorize(
        requester,
        Operation::Delete {
            reservation: &reservation,
        },
    )?;

    let expected = match requester {
        Requester::Administrator => None,
        Requester::Party(_) => Some(reservation.status),
    };

    if db.delete_reservation(id, expected).await? {
        info!(logger, "Deleted reservation"; "status" => %reservation.status);
        return Ok(());
    }

    match db.retrieve_reservation(id).await? {
        None => Err(BackendError::NonExistentReservation(*id)),
        Some(current) => {
            warn!(logger, "Lost deletion"; "expected" => %reservation.status, "found" => %current.status);
            Err(BackendError::StaleStatus {
                expected: reservation.status,
            })
        }
    }
}

async fn retrieve(db: &(dyn Db + Send + Sync), id: &Uuid) -> Result<Reservation, BackendError> {
    db.retrieve_reservation(id)
        .await?
        .ok_or(BackendError::NonExistentReservation(*id))
}
