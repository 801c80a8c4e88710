use std::time::{Duration, Instant};

use bytes::Bytes;
use log::debug;
use serde::de::DeserializeOwned;
use uuid::Uuid;
use warp::{
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::account::{AvailabilityUpdate, Credentials, Identity, Registration, Requester};
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::reservation::{ReservationRequest, StatusRequest};
use crate::review::ReviewRequest;
use crate::routes::{
    rejection::{Context, Rejection},
    response::SuccessResponse,
};
use crate::search::BabysitterQuery;
use crate::{auth, babysitters, lifecycle};

pub(crate) const SERVER_TIMING_HEADER: &str = "server-timing";
pub(crate) type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($body:tt)*) => {
        let start = Instant::now();

        let result = async { Ok::<_, Rejection>({ $($body)* }) }.await;

        match result {
            Ok(reply) => Ok(Box::new(with_header(
                reply,
                SERVER_TIMING_HEADER,
                format_server_timing(start.elapsed()),
            )) as Box<dyn Reply>),
            Err(rejection) => Err(reject::custom(rejection.timed(start.elapsed()))),
        }
    };
}

pub async fn signup(environment: Environment, body: Bytes) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::signup(), e);

        let registration: Registration = parse_body(&body).map_err(error_handler)?;
        debug!(environment.logger, "Registering account..."; "role" => %registration.role);

        let session = auth::register(
            &environment.logger,
            &*environment.db,
            &environment.config,
            registration,
        )
        .await
        .map_err(error_handler)?;

        with_status(
            json(&SuccessResponse::Session {
                message: Some("account created"),
                token: session.token,
                user: &session.user,
            }),
            StatusCode::CREATED,
        )
    }
}

pub async fn login(environment: Environment, body: Bytes) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::login(), e);

        let credentials: Credentials = parse_body(&body).map_err(error_handler)?;

        let session = auth::login(
            &environment.logger,
            &*environment.db,
            &environment.config,
            credentials,
        )
        .await
        .map_err(error_handler)?;

        json(&SuccessResponse::Session {
            message: None,
            token: session.token,
            user: &session.user,
        })
    }
}

pub async fn logout(environment: Environment, authorization: Option<String>) -> RouteResult {
    timed! {
        auth::logout(&*environment.db, authorization.as_deref())
            .await
            .map_err(|e| Rejection::new(Context::logout(), e))?;

        json(&SuccessResponse::Message {
            message: "logged out",
        })
    }
}

pub async fn account(environment: Environment, authorization: Option<String>) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::account(), e);

        let identity = authenticate(&environment, authorization)
            .await
            .map_err(error_handler)?;

        let account = environment
            .db
            .retrieve_account(&identity.id)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| error_handler(BackendError::NonExistentAccount(identity.id)))?;

        json(&account)
    }
}

pub async fn babysitters(environment: Environment, query: BabysitterQuery) -> RouteResult {
    timed! {
        let listing = babysitters::list_babysitters(&*environment.db, query)
            .await
            .map_err(|e| Rejection::new(Context::babysitters(), e))?;

        json(&listing)
    }
}

pub async fn babysitter(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::babysitter(id.clone()), e);

        let id = parse_id(&id).map_err(error_handler)?;
        debug!(environment.logger, "Retrieving babysitter..."; "id" => %id);

        let babysitter = babysitters::retrieve_babysitter(&*environment.db, &id)
            .await
            .map_err(error_handler)?;

        json(&babysitter)
    }
}

pub async fn availability(
    environment: Environment,
    authorization: Option<String>,
    body: Bytes,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::availability(), e);

        let identity = authenticate(&environment, authorization)
            .await
            .map_err(error_handler)?;
        let update: AvailabilityUpdate = parse_body(&body).map_err(error_handler)?;

        let babysitter = babysitters::update_availability(
            &environment.logger,
            &*environment.db,
            &identity,
            update.available,
        )
        .await
        .map_err(error_handler)?;

        json(&babysitter)
    }
}

pub async fn reviews(environment: Environment, babysitter: String) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::babysitter(babysitter.clone()), e);

        let id = parse_id(&babysitter).map_err(error_handler)?;

        let reviews = babysitters::list_reviews(&*environment.db, &id)
            .await
            .map_err(error_handler)?;

        json(&reviews)
    }
}

pub async fn review(
    environment: Environment,
    babysitter: String,
    authorization: Option<String>,
    body: Bytes,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::babysitter(babysitter.clone()), e);

        let id = parse_id(&babysitter).map_err(error_handler)?;
        let identity = authenticate(&environment, authorization)
            .await
            .map_err(error_handler)?;
        let request: ReviewRequest = parse_body(&body).map_err(error_handler)?;

        let review = babysitters::create_review(
            &environment.logger,
            &*environment.db,
            &identity,
            &id,
            request,
        )
        .await
        .map_err(error_handler)?;

        with_status(json(&review), StatusCode::CREATED)
    }
}

pub async fn create_reservation(
    environment: Environment,
    authorization: Option<String>,
    body: Bytes,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::reservations(), e);

        let identity = authenticate(&environment, authorization)
            .await
            .map_err(error_handler)?;
        let request: ReservationRequest = parse_body(&body).map_err(error_handler)?;

        let reservation = lifecycle::create_reservation(
            &environment.logger,
            &*environment.db,
            &Requester::Party(identity),
            request,
        )
        .await
        .map_err(error_handler)?;

        with_header(
            with_status(json(&reservation), StatusCode::CREATED),
            "location",
            environment.urls.reservation(&reservation.id).as_str(),
        )
    }
}

pub async fn reservations(environment: Environment, authorization: Option<String>) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::reservations(), e);

        let identity = authenticate(&environment, authorization)
            .await
            .map_err(error_handler)?;

        let reservations =
            lifecycle::list_reservations(&*environment.db, &Requester::Party(identity))
                .await
                .map_err(error_handler)?;

        json(&reservations)
    }
}

pub async fn status(
    environment: Environment,
    id: String,
    authorization: Option<String>,
    body: Bytes,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::reservation(id.clone()), e);

        let identity = authenticate(&environment, authorization)
            .await
            .map_err(error_handler)?;

        change_status(&environment, Requester::Party(identity), &id, &body)
            .await
            .map_err(error_handler)?
    }
}

pub async fn delete(environment: Environment, id: String, authorization: Option<String>) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::reservation(id.clone()), e);

        let identity = authenticate(&environment, authorization)
            .await
            .map_err(error_handler)?;

        remove(&environment, Requester::Party(identity), &id)
            .await
            .map_err(error_handler)?
    }
}

pub async fn admin_status(environment: Environment, id: String, body: Bytes) -> RouteResult {
    timed! {
        change_status(&environment, Requester::Administrator, &id, &body)
            .await
            .map_err(|e| Rejection::new(Context::reservation(id.clone()), e))?
    }
}

pub async fn admin_delete(environment: Environment, id: String) -> RouteResult {
    timed! {
        remove(&environment, Requester::Administrator, &id)
            .await
            .map_err(|e| Rejection::new(Context::reservation(id.clone()), e))?
    }
}

async fn change_status(
    environment: &Environment,
    requester: Requester,
    id: &str,
    body: &[u8],
) -> Result<warp::reply::Json, BackendError> {
    let id = parse_id(id)?;
    let StatusRequest { status } = parse_body(body)?;

    let reservation = lifecycle::update_status(
        &environment.logger,
        &*environment.db,
        &requester,
        &id,
        status,
    )
    .await?;

    Ok(json(&reservation))
}

async fn remove(
    environment: &Environment,
    requester: Requester,
    id: &str,
) -> Result<warp::reply::Json, BackendError> {
    let id = parse_id(id)?;

    lifecycle::delete_reservation(&environment.logger, &*environment.db, &requester, &id).await?;

    Ok(json(&SuccessResponse::Deleted {
        message: "reservation deleted",
        id,
    }))
}

async fn authenticate(
    environment: &Environment,
    authorization: Option<String>,
) -> Result<Identity, BackendError> {
    auth::authenticate(&*environment.db, authorization.as_deref()).await
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, BackendError> {
    serde_json::from_slice(body).map_err(BackendError::MalformedBody)
}

fn parse_id(id: &str) -> Result<Uuid, BackendError> {
    Uuid::parse_str(id).map_err(|_| BackendError::InvalidId(id.to_owned()))
}

pub(crate) fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
