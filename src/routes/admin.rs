use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::path::{end, param};
use warp::reject;
use warp::reply::{json, Reply};
use warp::Filter;

use super::response::SuccessResponse;
use super::{handlers, MAX_CONTENT_LENGTH};
use crate::environment::Environment;

pub fn make_healthz_route<'a>(
    _environment: Environment,
) -> impl warp::Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone + 'a {
    warp::path("healthz").and(warp::get()).map(move || {
        json(&SuccessResponse::Healthz {
            revision: info::REVISION,
            timestamp: info::BUILD_TIMESTAMP,
            version: info::VERSION,
        })
    })
}

type TerminationFuture<'a> = BoxFuture<'a, ()>;

pub type TerminationFunctionWrapper<'a> =
    Arc<dyn Fn() -> TerminationFuture<'a> + Send + Sync + 'a>;

pub fn make_termination_route<'a>(
    _environment: Environment,
    terminate: TerminationFunctionWrapper<'a>,
) -> impl warp::Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone + 'a {
    let terminate = terminate.clone();

    let handler = move || -> BoxFuture<Result<StatusCode, std::convert::Infallible>> {
        let terminate = terminate.clone();

        async move {
            let future = terminate();
            future.await;
            Ok(StatusCode::NO_CONTENT)
        }
        .boxed()
    };

    warp::path("terminate").and(warp::post()).and_then(handler)
}

/// Moves any reservation along its lifecycle as the administrator.
/// The admin port is expected to be reachable only from operators.
pub fn make_status_route(environment: Environment) -> BoxedFilter<(Box<dyn Reply>,)> {
    warp::any()
        .map(move || environment.clone())
        .and(warp::path("reservations"))
        .and(param::<String>())
        .and(warp::path("status"))
        .and(end())
        .and(warp::patch())
        .and(warp::body::content_length_limit(MAX_CONTENT_LENGTH))
        .and(warp::body::bytes())
        .and_then(handlers::admin_status)
        .boxed()
}

/// Deletes any reservation regardless of its status.
pub fn make_delete_route(environment: Environment) -> BoxedFilter<(Box<dyn Reply>,)> {
    warp::any()
        .map(move || environment.clone())
        .and(warp::path("reservations"))
        .and(param::<String>())
        .and(end())
        .and(warp::delete())
        .and_then(handlers::admin_delete)
        .boxed()
}
