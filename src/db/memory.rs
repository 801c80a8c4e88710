use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::{self, BoxFuture, FutureExt};
use rust_decimal::Decimal;
use time::{Date, OffsetDateTime, Time};
use uuid::Uuid;

use super::{Db, StoredCredentials};
use crate::account::{
    Account, Babysitter, BabysitterProfile, Identity, NewAccount, Party, Role,
};
use crate::errors::BackendError;
use crate::reservation::{NewReservation, Reservation, ReservationStatus};
use crate::review::{average_rating, NewReview, Review};
use crate::search::{BabysitterFilter, Page};
use crate::times::Times;

/// A store that keeps everything in process memory. Every compare and
/// write happens under a single write lock.
#[derive(Default)]
pub struct MemoryDb {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    accounts: HashMap<Uuid, StoredAccount>,
    sessions: HashMap<Uuid, Session>,
    reservations: HashMap<Uuid, StoredReservation>,
    reviews: Vec<StoredReview>,
}

struct StoredAccount {
    account: Account,
    password_hash: String,
    profile: Option<BabysitterProfile>,
}

struct Session {
    identity: Identity,
    expires_at: OffsetDateTime,
}

#[derive(Clone)]
struct StoredReservation {
    id: Uuid,
    parent: Uuid,
    babysitter: Uuid,
    date: Date,
    time: Time,
    duration: i16,
    total: Decimal,
    status: ReservationStatus,
    description: Option<String>,
    times: Times,
}

struct StoredReview {
    id: Uuid,
    babysitter: Uuid,
    parent: Uuid,
    rating: i16,
    comment: String,
    times: Times,
}

impl MemoryDb {
    pub fn new() -> Self {
        Default::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, BackendError> {
        self.state
            .read()
            .map_err(|_| BackendError::Store("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, BackendError> {
        self.state
            .write()
            .map_err(|_| BackendError::Store("memory store lock poisoned"))
    }
}

impl State {
    fn party(&self, id: &Uuid) -> Result<Party, BackendError> {
        self.accounts
            .get(id)
            .map(|stored| stored.account.party())
            .ok_or(BackendError::NonExistentAccount(*id))
    }

    fn babysitter(&self, id: &Uuid) -> Option<Babysitter> {
        let stored = self.accounts.get(id)?;
        let profile = stored.profile.as_ref()?;

        Some(Babysitter {
            account: stored.account.clone(),
            profile: profile.clone(),
        })
    }

    fn project(&self, r: &StoredReservation) -> Result<Reservation, BackendError> {
        Ok(Reservation {
            id: r.id,
            parent: self.party(&r.parent)?,
            babysitter: self.party(&r.babysitter)?,
            date: r.date,
            time: r.time,
            duration: r.duration,
            total: r.total,
            status: r.status,
            description: r.description.clone(),
            times: r.times,
        })
    }

    fn project_review(&self, r: &StoredReview) -> Result<Review, BackendError> {
        Ok(Review {
            id: r.id,
            babysitter: r.babysitter,
            parent: self.party(&r.parent)?,
            rating: r.rating,
            comment: r.comment.clone(),
            times: r.times,
        })
    }
}

impl Db for MemoryDb {
    fn insert_account(&self, new: NewAccount) -> BoxFuture<Result<Account, BackendError>> {
        future::ready(insert_account(self, new)).boxed()
    }

    fn retrieve_account(&self, id: &Uuid) -> BoxFuture<Result<Option<Account>, BackendError>> {
        let result = self
            .read()
            .map(|state| state.accounts.get(id).map(|s| s.account.clone()));

        future::ready(result).boxed()
    }

    fn retrieve_credentials(
        &self,
        email: &str,
    ) -> BoxFuture<Result<Option<StoredCredentials>, BackendError>> {
        let result = self.read().map(|state| {
            state
                .accounts
                .values()
                .find(|s| s.account.email == email)
                .map(|s| StoredCredentials {
                    identity: s.account.identity(),
                    password_hash: s.password_hash.clone(),
                })
        });

        future::ready(result).boxed()
    }

    fn retrieve_babysitter(
        &self,
        id: &Uuid,
    ) -> BoxFuture<Result<Option<Babysitter>, BackendError>> {
        let result = self.read().map(|state| state.babysitter(id));

        future::ready(result).boxed()
    }

    fn search_babysitters(
        &self,
        filter: &BabysitterFilter,
        page: Page,
    ) -> BoxFuture<Result<(Vec<Babysitter>, u64), BackendError>> {
        let result = self.read().map(|state| {
            let mut matching = state
                .accounts
                .keys()
                .filter_map(|id| state.babysitter(id))
                .filter(|b| filter.matches(b))
                .collect::<Vec<_>>();

            matching.sort_by(|a, b| {
                b.profile
                    .rating
                    .cmp(&a.profile.rating)
                    .then_with(|| a.id().cmp(&b.id()))
            });

            let total = matching.len() as u64;
            let items = matching
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.page_size as usize)
                .collect();

            (items, total)
        });

        future::ready(result).boxed()
    }

    fn update_availability(
        &self,
        id: &Uuid,
        available: bool,
    ) -> BoxFuture<Result<Option<Babysitter>, BackendError>> {
        let result = self.write().map(|mut state| {
            let stored = state.accounts.get_mut(id)?;
            let profile = stored.profile.as_mut()?;

            profile.available = available;

            state.babysitter(id)
        });

        future::ready(result).boxed()
    }

    fn create_session(
        &self,
        account: &Uuid,
        expires_at: OffsetDateTime,
    ) -> BoxFuture<Result<Uuid, BackendError>> {
        let result = self.write().and_then(|mut state| {
            let identity = state
                .accounts
                .get(account)
                .map(|s| s.account.identity())
                .ok_or(BackendError::NonExistentAccount(*account))?;
            let token = Uuid::new_v4();

            state.sessions.insert(
                token,
                Session {
                    identity,
                    expires_at,
                },
            );

            Ok(token)
        });

        future::ready(result).boxed()
    }

    fn retrieve_session(&self, token: &Uuid) -> BoxFuture<Result<Option<Identity>, BackendError>> {
        let now = OffsetDateTime::now_utc();
        let result = self.read().map(|state| {
            state
                .sessions
                .get(token)
                .filter(|s| s.expires_at > now)
                .map(|s| s.identity)
        });

        future::ready(result).boxed()
    }

    fn remove_session(&self, token: &Uuid) -> BoxFuture<Result<(), BackendError>> {
        let result = self.write().map(|mut state| {
            state.sessions.remove(token);
        });

        future::ready(result).boxed()
    }

    fn insert_reservation(
        &self,
        new: NewReservation,
    ) -> BoxFuture<Result<Reservation, BackendError>> {
        let result = self.write().and_then(|mut state| {
            if !state.accounts.contains_key(&new.parent) {
                return Err(BackendError::NonExistentAccount(new.parent));
            }

            if !state.accounts.contains_key(&new.babysitter) {
                return Err(BackendError::NonExistentBabysitter(new.babysitter));
            }

            let stored = StoredReservation {
                id: Uuid::new_v4(),
                parent: new.parent,
                babysitter: new.babysitter,
                date: new.date,
                time: new.time,
                duration: new.duration,
                total: new.total,
                status: ReservationStatus::Pending,
                description: new.description,
                times: Times::now(),
            };

            let reservation = state.project(&stored)?;
            state.reservations.insert(stored.id, stored);

            Ok(reservation)
        });

        future::ready(result).boxed()
    }

    fn retrieve_reservation(
        &self,
        id: &Uuid,
    ) -> BoxFuture<Result<Option<Reservation>, BackendError>> {
        let result = self.read().and_then(|state| {
            state
                .reservations
                .get(id)
                .map(|r| state.project(r))
                .transpose()
        });

        future::ready(result).boxed()
    }

    fn list_reservations(
        &self,
        identity: &Identity,
    ) -> BoxFuture<Result<Vec<Reservation>, BackendError>> {
        let identity = *identity;

        let result: Result<Vec<Reservation>, BackendError> = self.read().and_then(|state| {
            let mut owned = state
                .reservations
                .values()
                .filter(|r| match identity.role {
                    Role::Parent => r.parent == identity.id,
                    Role::Babysitter => r.babysitter == identity.id,
                })
                .collect::<Vec<_>>();

            owned.sort_by(|a, b| {
                b.date
                    .cmp(&a.date)
                    .then_with(|| b.times.created_at.cmp(&a.times.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            });

            owned.into_iter().map(|r| state.project(r)).collect()
        });

        future::ready(result).boxed()
    }

    fn transition_reservation(
        &self,
        id: &Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> BoxFuture<Result<Option<Reservation>, BackendError>> {
        let result = self.write().and_then(|mut state| {
            let updated = match state.reservations.get_mut(id) {
                Some(r) if r.status == from => {
                    r.status = to;
                    r.times.touch();
                    r.clone()
                }
                _ => return Ok(None),
            };

            state.project(&updated).map(Some)
        });

        future::ready(result).boxed()
    }

    fn delete_reservation(
        &self,
        id: &Uuid,
        expected: Option<ReservationStatus>,
    ) -> BoxFuture<Result<bool, BackendError>> {
        let result = self.write().map(|mut state| {
            let matches = match (state.reservations.get(id), expected) {
                (Some(r), Some(expected)) => r.status == expected,
                (Some(_), None) => true,
                (None, _) => false,
            };

            if matches {
                state.reservations.remove(id);
            }

            matches
        });

        future::ready(result).boxed()
    }

    fn insert_review(&self, new: NewReview) -> BoxFuture<Result<Review, BackendError>> {
        let result = self.write().and_then(|mut state| {
            if state.babysitter(&new.babysitter).is_none() {
                return Err(BackendError::NonExistentBabysitter(new.babysitter));
            }

            let stored = StoredReview {
                id: Uuid::new_v4(),
                babysitter: new.babysitter,
                parent: new.parent,
                rating: new.rating,
                comment: new.comment,
                times: Times::now(),
            };
            let review = state.project_review(&stored)?;
            state.reviews.push(stored);

            let ratings = state
                .reviews
                .iter()
                .filter(|r| r.babysitter == new.babysitter)
                .map(|r| r.rating)
                .collect::<Vec<_>>();

            if let Some(profile) = state
                .accounts
                .get_mut(&new.babysitter)
                .and_then(|s| s.profile.as_mut())
            {
                profile.total_reviews = ratings.len() as i32;
                profile.rating = average_rating(ratings);
            }

            Ok(review)
        });

        future::ready(result).boxed()
    }

    fn list_reviews(&self, babysitter: &Uuid) -> BoxFuture<Result<Vec<Review>, BackendError>> {
        let result: Result<Vec<Review>, BackendError> = self.read().and_then(|state| {
            let mut reviews = state
                .reviews
                .iter()
                .filter(|r| r.babysitter == *babysitter)
                .collect::<Vec<_>>();

            reviews.sort_by(|a, b| {
                b.times
                    .created_at
                    .cmp(&a.times.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            });

            reviews.into_iter().map(|r| state.project_review(r)).collect()
        });

        future::ready(result).boxed()
    }
}

fn insert_account(db: &MemoryDb, new: NewAccount) -> Result<Account, BackendError> {
    let mut state = db.write()?;

    if state.accounts.values().any(|s| s.account.email == new.email) {
        return Err(BackendError::EmailAlreadyExists);
    }

    let account = Account {
        id: Uuid::new_v4(),
        role: new.role,
        name: new.name,
        email: new.email,
        age: new.age,
        contact: new.contact,
        address: new.address,
        photo: new.photo,
        times: Times::now(),
    };

    state.accounts.insert(
        account.id,
        StoredAccount {
            account: account.clone(),
            password_hash: new.password_hash,
            profile: new.profile,
        },
    );

    Ok(account)
}
