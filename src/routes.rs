use std::sync::Arc;

use log::{error, info, Logger};
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_header, with_status, Reply};

use crate::errors::BackendError;

pub mod admin;
mod handlers;
mod rejection;
mod response;

pub use internal::*;

/// The largest JSON body to accept. Every request body in the API is a
/// small form, so anything bigger is refused outright.
const MAX_CONTENT_LENGTH: u64 = 64 * 1024;

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<Box<dyn Reply>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        let status = status_code_for(e);

        if status.is_server_error() {
            error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status, "message" => %r.error);
        } else {
            info!(logger, "Request refused"; "context" => ?r.context, "status" => %status, "message" => %r.error);
        }

        let reply = with_status(json(&r.flatten()), status);

        return Ok(match r.elapsed {
            Some(elapsed) => Box::new(with_header(
                reply,
                handlers::SERVER_TIMING_HEADER,
                handlers::format_server_timing(elapsed),
            )),
            None => Box::new(reply),
        });
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        Validation { .. } | MalformedBody(..) | InvalidId(..) => StatusCode::BAD_REQUEST,
        MissingCredentials | InvalidToken | InvalidCredentials => StatusCode::UNAUTHORIZED,
        Forbidden { .. } => StatusCode::FORBIDDEN,
        NonExistentReservation(..) | NonExistentBabysitter(..) | NonExistentAccount(..) => {
            StatusCode::NOT_FOUND
        }
        InvalidTransition { .. } | StaleStatus { .. } | NotPending(..) | EmailAlreadyExists => {
            StatusCode::CONFLICT
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}


mod internal {
    use warp::body::{bytes, content_length_limit as limit};
    use warp::filters::BoxedFilter;
    use warp::header::optional;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{delete, get as g, patch, path as p, path::param as par, post, put, query};

    use super::{handlers, MAX_CONTENT_LENGTH};
    use crate::environment::Environment;
    use crate::search::BabysitterQuery;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    macro_rules! route_filter {
    ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
    ($route_variable:ident; $first:expr, $($rest:expr),+) => (
        let $route_variable = $route_variable.and($first);
        route_filter!($route_variable; $($rest),+);
    )
}

    macro_rules! route {
    ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
        pub fn $name(environment: Environment) -> Route {
            let r = environment.urls.api_path.clone();

            let $route_variable = warp::any()
                .map(move || environment.clone())
                .and(p(r));

            route_filter!($route_variable; $($filters),+);

            $route_variable.and_then(handlers::$handler)
                .boxed()
        }
    );
}

    fn authorization() -> impl Filter<Extract = (Option<String>,), Error = warp::Rejection> + Clone {
        optional::<String>("authorization")
    }

    route!(make_signup_route => signup, rt; p("auth"), p("signup"), end(), post(), limit(MAX_CONTENT_LENGTH), bytes());
    route!(make_login_route => login, rt; p("auth"), p("login"), end(), post(), limit(MAX_CONTENT_LENGTH), bytes());
    route!(make_logout_route => logout, rt; p("auth"), p("logout"), end(), post(), authorization());
    route!(make_account_route => account, rt; p("me"), end(), g(), authorization());
    route!(make_babysitters_route => babysitters, rt; p("babysitters"), end(), g(), query::<BabysitterQuery>());
    route!(make_availability_route => availability, rt; p("babysitters"), p("availability"), end(), put(), authorization(), limit(MAX_CONTENT_LENGTH), bytes());
    route!(make_babysitter_route => babysitter, rt; p("babysitters"), par::<String>(), end(), g());
    route!(make_reviews_route => reviews, rt; p("babysitters"), par::<String>(), p("reviews"), end(), g());
    route!(make_review_route => review, rt; p("babysitters"), par::<String>(), p("reviews"), end(), post(), authorization(), limit(MAX_CONTENT_LENGTH), bytes());
    route!(make_create_reservation_route => create_reservation, rt; p("reservations"), end(), post(), authorization(), limit(MAX_CONTENT_LENGTH), bytes());
    route!(make_reservations_route => reservations, rt; p("reservations"), end(), g(), authorization());
    route!(make_status_route => status, rt; p("reservations"), par::<String>(), p("status"), end(), patch(), authorization(), limit(MAX_CONTENT_LENGTH), bytes());
    route!(make_delete_route => delete, rt; p("reservations"), par::<String>(), end(), delete(), authorization());

    /// Every public route, ready to be served once a rejection handler
    /// is attached.
    pub fn api(environment: Environment) -> Route {
        make_signup_route(environment.clone())
            .or(make_login_route(environment.clone()))
            .unify()
            .or(make_logout_route(environment.clone()))
            .unify()
            .or(make_account_route(environment.clone()))
            .unify()
            .or(make_babysitters_route(environment.clone()))
            .unify()
            .or(make_availability_route(environment.clone()))
            .unify()
            .or(make_babysitter_route(environment.clone()))
            .unify()
            .or(make_reviews_route(environment.clone()))
            .unify()
            .or(make_review_route(environment.clone()))
            .unify()
            .or(make_create_reservation_route(environment.clone()))
            .unify()
            .or(make_reservations_route(environment.clone()))
            .unify()
            .or(make_status_route(environment.clone()))
            .unify()
            .or(make_delete_route(environment))
            .unify()
            .boxed()
    }
}
