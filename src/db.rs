use futures::future::BoxFuture;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::account::{Account, Babysitter, Identity, NewAccount};
use crate::errors::BackendError;
use crate::reservation::{NewReservation, Reservation, ReservationStatus};
use crate::review::{NewReview, Review};
use crate::search::{BabysitterFilter, Page};

pub mod memory;

/// What is needed to check a login attempt.
#[derive(Clone, Debug)]
pub struct StoredCredentials {
    pub identity: Identity,
    pub password_hash: String,
}

pub trait Db {
    fn insert_account(&self, account: NewAccount) -> BoxFuture<Result<Account, BackendError>>;

    fn retrieve_account(&self, id: &Uuid) -> BoxFuture<Result<Option<Account>, BackendError>>;

    fn retrieve_credentials(
        &self,
        email: &str,
    ) -> BoxFuture<Result<Option<StoredCredentials>, BackendError>>;

    fn retrieve_babysitter(&self, id: &Uuid)
        -> BoxFuture<Result<Option<Babysitter>, BackendError>>;

    /// Returns the requested page of matching babysitters, best rated
    /// first, and the number of matches across all pages.
    fn search_babysitters(
        &self,
        filter: &BabysitterFilter,
        page: Page,
    ) -> BoxFuture<Result<(Vec<Babysitter>, u64), BackendError>>;

    fn update_availability(
        &self,
        id: &Uuid,
        available: bool,
    ) -> BoxFuture<Result<Option<Babysitter>, BackendError>>;

    fn create_session(
        &self,
        account: &Uuid,
        expires_at: OffsetDateTime,
    ) -> BoxFuture<Result<Uuid, BackendError>>;

    /// Resolves a token, ignoring sessions that have expired.
    fn retrieve_session(&self, token: &Uuid) -> BoxFuture<Result<Option<Identity>, BackendError>>;

    fn remove_session(&self, token: &Uuid) -> BoxFuture<Result<(), BackendError>>;

    fn insert_reservation(
        &self,
        reservation: NewReservation,
    ) -> BoxFuture<Result<Reservation, BackendError>>;

    fn retrieve_reservation(
        &self,
        id: &Uuid,
    ) -> BoxFuture<Result<Option<Reservation>, BackendError>>;

    /// Reservations in which `identity` takes part in its role, most
    /// recent date first.
    fn list_reservations(
        &self,
        identity: &Identity,
    ) -> BoxFuture<Result<Vec<Reservation>, BackendError>>;

    /// Moves a reservation from `from` to `to` only if its status is
    /// still `from`. Returns `None` if nothing matched.
    fn transition_reservation(
        &self,
        id: &Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> BoxFuture<Result<Option<Reservation>, BackendError>>;

    /// Deletes a reservation, only if its status is still `expected`
    /// when that is given. Returns whether a row was deleted.
    fn delete_reservation(
        &self,
        id: &Uuid,
        expected: Option<ReservationStatus>,
    ) -> BoxFuture<Result<bool, BackendError>>;

    /// Stores a review and refreshes the babysitter's rating and
    /// review count in the same transaction.
    fn insert_review(&self, review: NewReview) -> BoxFuture<Result<Review, BackendError>>;

    fn list_reviews(&self, babysitter: &Uuid) -> BoxFuture<Result<Vec<Review>, BackendError>>;
}

pub use self::postgres::*;

mod postgres {
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use rust_decimal::Decimal;
    use sqlx::{
        self,
        postgres::{PgPool, PgRow},
    };
    use time::{Date, OffsetDateTime, Time};
    use uuid::Uuid;

    use super::StoredCredentials;
    use crate::account::{
        Account, Babysitter, BabysitterProfile, Identity, NewAccount, Party, Role,
    };
    use crate::errors::BackendError;
    use crate::reservation::{NewReservation, Reservation, ReservationStatus};
    use crate::review::{NewReview, Review};
    use crate::search::{BabysitterFilter, Page};
    use crate::times::Times;

    const ACCOUNTS_EMAIL_CONSTRAINT: &str = "accounts_email";
    const RESERVATIONS_PARENT_CONSTRAINT: &str = "reservations_parent";
    const RESERVATIONS_BABYSITTER_CONSTRAINT: &str = "reservations_babysitter";

    pub struct PgDb {
        pool: PgPool,
    }

    impl PgDb {
        pub fn new(pool: PgPool) -> Self {
            PgDb { pool }
        }

        async fn fetch_reservation(&self, id: Uuid) -> Result<Option<Reservation>, BackendError> {
            sqlx::query(include_str!("queries/retrieve_reservation.sql"))
                .bind(id)
                .try_map(|row: PgRow| reservation_from_row(&row))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)
        }

        async fn fetch_babysitter(&self, id: Uuid) -> Result<Option<Babysitter>, BackendError> {
            sqlx::query(include_str!("queries/retrieve_babysitter.sql"))
                .bind(id)
                .try_map(|row: PgRow| babysitter_from_row(&row))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Db for PgDb {
        fn insert_account(&self, account: NewAccount) -> BoxFuture<Result<Account, BackendError>> {
            async move {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

                let (id, created_at, updated_at): (Uuid, OffsetDateTime, OffsetDateTime) =
                    sqlx::query_as(include_str!("queries/insert_account.sql"))
                        .bind(account.role.as_str())
                        .bind(&account.name)
                        .bind(&account.email)
                        .bind(&account.password_hash)
                        .bind(account.age)
                        .bind(&account.contact)
                        .bind(&account.address)
                        .bind(&account.photo)
                        .fetch_one(&mut tx)
                        .await
                        .map_err(map_sqlx_error)?;

                if let Some(profile) = &account.profile {
                    sqlx::query(include_str!("queries/insert_babysitter_profile.sql"))
                        .bind(id)
                        .bind(profile.hourly_rate)
                        .bind(profile.experience)
                        .bind(&profile.skills)
                        .bind(profile.available)
                        .bind(&profile.bio)
                        .execute(&mut tx)
                        .await
                        .map_err(map_sqlx_error)?;
                }

                tx.commit().await.map_err(map_sqlx_error)?;

                Ok(Account {
                    id,
                    role: account.role,
                    name: account.name,
                    email: account.email,
                    age: account.age,
                    contact: account.contact,
                    address: account.address,
                    photo: account.photo,
                    times: Times {
                        created_at,
                        updated_at,
                    },
                })
            }
            .boxed()
        }

        fn retrieve_account(&self, id: &Uuid) -> BoxFuture<Result<Option<Account>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/retrieve_account.sql"));

                let account = query
                    .bind(id)
                    .try_map(|row: PgRow| account_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(account)
            }
            .boxed()
        }

        fn retrieve_credentials(
            &self,
            email: &str,
        ) -> BoxFuture<Result<Option<StoredCredentials>, BackendError>> {
            let email = email.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/retrieve_credentials.sql"));

                let credentials = query
                    .bind(email)
                    .try_map(|row: PgRow| {
                        Ok(StoredCredentials {
                            identity: Identity::new(try_get(&row, "id")?, role_from_row(&row)?),
                            password_hash: try_get(&row, "password_hash")?,
                        })
                    })
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(credentials)
            }
            .boxed()
        }

        fn retrieve_babysitter(
            &self,
            id: &Uuid,
        ) -> BoxFuture<Result<Option<Babysitter>, BackendError>> {
            let id = *id;

            async move { self.fetch_babysitter(id).await }.boxed()
        }

        fn search_babysitters(
            &self,
            filter: &BabysitterFilter,
            page: Page,
        ) -> BoxFuture<Result<(Vec<Babysitter>, u64), BackendError>> {
            let filter = filter.clone();

            async move {
                let (total,): (i64,) =
                    sqlx::query_as(include_str!("queries/count_babysitters.sql"))
                        .bind(&filter.location)
                        .bind(filter.min_rate)
                        .bind(filter.max_rate)
                        .bind(filter.min_experience)
                        .bind(&filter.skills)
                        .bind(filter.available)
                        .fetch_one(&self.pool)
                        .await
                        .map_err(map_sqlx_error)?;

                let babysitters = sqlx::query(include_str!("queries/search_babysitters.sql"))
                    .bind(&filter.location)
                    .bind(filter.min_rate)
                    .bind(filter.max_rate)
                    .bind(filter.min_experience)
                    .bind(&filter.skills)
                    .bind(filter.available)
                    .bind(page.page_size as i64)
                    .bind(page.offset() as i64)
                    .try_map(|row: PgRow| babysitter_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok((babysitters, total.max(0) as u64))
            }
            .boxed()
        }

        fn update_availability(
            &self,
            id: &Uuid,
            available: bool,
        ) -> BoxFuture<Result<Option<Babysitter>, BackendError>> {
            let id = *id;

            async move {
                let count = sqlx::query(include_str!("queries/update_availability.sql"))
                    .bind(id)
                    .bind(available)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                if count == 0 {
                    Ok(None)
                } else {
                    self.fetch_babysitter(id).await
                }
            }
            .boxed()
        }

        fn create_session(
            &self,
            account: &Uuid,
            expires_at: OffsetDateTime,
        ) -> BoxFuture<Result<Uuid, BackendError>> {
            let account = *account;

            async move {
                let query = sqlx::query_as(include_str!("queries/create_session.sql"));

                let (token,): (Uuid,) = query
                    .bind(account)
                    .bind(expires_at)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(token)
            }
            .boxed()
        }

        fn retrieve_session(
            &self,
            token: &Uuid,
        ) -> BoxFuture<Result<Option<Identity>, BackendError>> {
            let token = *token;

            async move {
                let query = sqlx::query(include_str!("queries/retrieve_session.sql"));

                let identity = query
                    .bind(token)
                    .try_map(|row: PgRow| Ok(Identity::new(try_get(&row, "id")?, role_from_row(&row)?)))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(identity)
            }
            .boxed()
        }

        fn remove_session(&self, token: &Uuid) -> BoxFuture<Result<(), BackendError>> {
            let token = *token;

            async move {
                let query = sqlx::query(include_str!("queries/remove_session.sql"));

                query
                    .bind(token)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(())
            }
            .boxed()
        }

        fn insert_reservation(
            &self,
            reservation: NewReservation,
        ) -> BoxFuture<Result<Reservation, BackendError>> {
            async move {
                let query = sqlx::query_as(include_str!("queries/insert_reservation.sql"));

                let (id,): (Uuid,) = query
                    .bind(reservation.parent)
                    .bind(reservation.babysitter)
                    .bind(reservation.date)
                    .bind(reservation.time)
                    .bind(reservation.duration)
                    .bind(reservation.total)
                    .bind(&reservation.description)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| match e {
                        sqlx::Error::Database(ref d)
                            if d.constraint() == Some(RESERVATIONS_PARENT_CONSTRAINT) =>
                        {
                            BackendError::NonExistentAccount(reservation.parent)
                        }
                        sqlx::Error::Database(ref d)
                            if d.constraint() == Some(RESERVATIONS_BABYSITTER_CONSTRAINT) =>
                        {
                            BackendError::NonExistentBabysitter(reservation.babysitter)
                        }
                        e => map_sqlx_error(e),
                    })?;

                self.fetch_reservation(id)
                    .await?
                    .ok_or(BackendError::NonExistentReservation(id))
            }
            .boxed()
        }

        fn retrieve_reservation(
            &self,
            id: &Uuid,
        ) -> BoxFuture<Result<Option<Reservation>, BackendError>> {
            let id = *id;

            async move { self.fetch_reservation(id).await }.boxed()
        }

        fn list_reservations(
            &self,
            identity: &Identity,
        ) -> BoxFuture<Result<Vec<Reservation>, BackendError>> {
            let identity = *identity;

            async move {
                let query = match identity.role {
                    Role::Parent => {
                        sqlx::query(include_str!("queries/list_reservations_for_parent.sql"))
                    }
                    Role::Babysitter => {
                        sqlx::query(include_str!("queries/list_reservations_for_babysitter.sql"))
                    }
                };

                let reservations = query
                    .bind(identity.id)
                    .try_map(|row: PgRow| reservation_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(reservations)
            }
            .boxed()
        }

        fn transition_reservation(
            &self,
            id: &Uuid,
            from: ReservationStatus,
            to: ReservationStatus,
        ) -> BoxFuture<Result<Option<Reservation>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query_as(include_str!("queries/transition_reservation.sql"));

                let updated: Option<(Uuid,)> = query
                    .bind(id)
                    .bind(from.as_str())
                    .bind(to.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                match updated {
                    Some(_) => self.fetch_reservation(id).await,
                    None => Ok(None),
                }
            }
            .boxed()
        }

        fn delete_reservation(
            &self,
            id: &Uuid,
            expected: Option<ReservationStatus>,
        ) -> BoxFuture<Result<bool, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/delete_reservation.sql"));

                let count = query
                    .bind(id)
                    .bind(expected.map(|s| s.as_str()))
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                Ok(count > 0)
            }
            .boxed()
        }

        fn insert_review(&self, review: NewReview) -> BoxFuture<Result<Review, BackendError>> {
            async move {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

                let (id,): (Uuid,) = sqlx::query_as(include_str!("queries/insert_review.sql"))
                    .bind(review.babysitter)
                    .bind(review.parent)
                    .bind(review.rating)
                    .bind(&review.comment)
                    .fetch_one(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                sqlx::query(include_str!("queries/update_rating.sql"))
                    .bind(review.babysitter)
                    .execute(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                let stored = sqlx::query(include_str!("queries/retrieve_review.sql"))
                    .bind(id)
                    .try_map(|row: PgRow| review_from_row(&row))
                    .fetch_one(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                tx.commit().await.map_err(map_sqlx_error)?;

                Ok(stored)
            }
            .boxed()
        }

        fn list_reviews(&self, babysitter: &Uuid) -> BoxFuture<Result<Vec<Review>, BackendError>> {
            let babysitter = *babysitter;

            async move {
                let query = sqlx::query(include_str!("queries/list_reviews.sql"));

                let reviews = query
                    .bind(babysitter)
                    .try_map(|row: PgRow| review_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(reviews)
            }
            .boxed()
        }
    }

    fn times_from_row(row: &PgRow) -> Result<Times, sqlx::Error> {
        Ok(Times {
            created_at: try_get(row, "created_at")?,
            updated_at: try_get(row, "updated_at")?,
        })
    }

    fn role_from_row(row: &PgRow) -> Result<Role, sqlx::Error> {
        let role: String = try_get(row, "role")?;

        role.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))
    }

    fn party_from_row(row: &PgRow, prefix: &str) -> Result<Party, sqlx::Error> {
        Ok(Party {
            id: try_get(row, &format!("{}_id", prefix))?,
            name: try_get(row, &format!("{}_name", prefix))?,
            photo: try_get(row, &format!("{}_photo", prefix))?,
        })
    }

    fn account_from_row(row: &PgRow) -> Result<Account, sqlx::Error> {
        Ok(Account {
            id: try_get(row, "id")?,
            role: role_from_row(row)?,
            name: try_get(row, "name")?,
            email: try_get(row, "email")?,
            age: try_get(row, "age")?,
            contact: try_get(row, "contact")?,
            address: try_get(row, "address")?,
            photo: try_get(row, "photo")?,
            times: times_from_row(row)?,
        })
    }

    fn babysitter_from_row(row: &PgRow) -> Result<Babysitter, sqlx::Error> {
        let rating: Decimal = try_get(row, "rating")?;

        Ok(Babysitter {
            account: account_from_row(row)?,
            profile: BabysitterProfile {
                hourly_rate: try_get(row, "hourly_rate")?,
                experience: try_get(row, "experience")?,
                skills: try_get(row, "skills")?,
                available: try_get(row, "available")?,
                rating: rating.round_dp(2),
                total_reviews: try_get(row, "total_reviews")?,
                bio: try_get(row, "bio")?,
            },
        })
    }

    fn reservation_from_row(row: &PgRow) -> Result<Reservation, sqlx::Error> {
        let status: String = try_get(row, "status")?;
        let status: ReservationStatus = status
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;
        let date: Date = try_get(row, "date")?;
        let time: Time = try_get(row, "time")?;

        Ok(Reservation {
            id: try_get(row, "id")?,
            parent: party_from_row(row, "parent")?,
            babysitter: party_from_row(row, "babysitter")?,
            date,
            time,
            duration: try_get(row, "duration")?,
            total: try_get(row, "total")?,
            status,
            description: try_get(row, "description")?,
            times: times_from_row(row)?,
        })
    }

    fn review_from_row(row: &PgRow) -> Result<Review, sqlx::Error> {
        Ok(Review {
            id: try_get(row, "id")?,
            babysitter: try_get(row, "babysitter_id")?,
            parent: party_from_row(row, "parent")?,
            rating: try_get(row, "rating")?,
            comment: try_get(row, "comment")?,
            times: times_from_row(row)?,
        })
    }

    fn try_get<'a, T: sqlx::Type<sqlx::Postgres> + sqlx::decode::Decode<'a, sqlx::Postgres>>(
        row: &'a PgRow,
        column: &str,
    ) -> Result<T, sqlx::Error> {
        use sqlx::prelude::*;

        row.try_get(column)
    }

    fn map_sqlx_error(error: sqlx::Error) -> BackendError {
        use sqlx::Error;

        match error {
            Error::Database(ref e) if e.constraint() == Some(ACCOUNTS_EMAIL_CONSTRAINT) => {
                BackendError::EmailAlreadyExists
            }
            _ => BackendError::Sqlx { source: error },
        }
    }
}
