use std::sync::Arc;

use bytes::Bytes;
use log::o;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde_json::{json, Value};
use warp::http::{Response, StatusCode};
use warp::{Filter, Reply};

use sitterhub::db::memory::MemoryDb;
use sitterhub::environment::{Config, Environment};
use sitterhub::routes;
use sitterhub::urls::Urls;

const API_PATH: &str = "api";

static SLOG_SCOPE_GUARD: OnceCell<slog_scope::GlobalLoggerGuard> = OnceCell::new();

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionResponse {
    message: Option<String>,
    token: String,
    user: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ErrorResponse {
    message: String,
    field: Option<String>,

    // context fields
    id: Option<String>,
    babysitter: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeletionResponse {
    message: String,
    id: String,
}

fn initialize_global_logger() {
    SLOG_SCOPE_GUARD.get_or_init(|| slog_envlogger::init().expect("initialize slog-envlogger"));
}

fn make_environment(test: &'static str) -> Environment {
    initialize_global_logger();

    let logger = Arc::new(slog_scope::logger().new(o!("test" => test)));

    Environment::new(
        logger,
        Arc::new(MemoryDb::new()),
        Arc::new(Urls::new("https://sitters.example.com/", API_PATH)),
        Config::default(),
    )
}

fn api(
    environment: Environment,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone + 'static {
    let logger = environment.logger.clone();

    routes::api(environment).recover(move |r| routes::format_rejection(logger.clone(), r))
}

fn admin(
    environment: Environment,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone + 'static {
    let logger = environment.logger.clone();

    routes::admin::make_healthz_route(environment.clone())
        .or(routes::admin::make_status_route(environment.clone()))
        .or(routes::admin::make_delete_route(environment))
        .recover(move |r| routes::format_rejection(logger.clone(), r))
}

fn url(path: &str) -> String {
    format!("/{}/{}", API_PATH, path)
}

fn request(method: &str, path: &str, token: Option<&str>) -> warp::test::RequestBuilder {
    let builder = warp::test::request().method(method).path(&url(path));

    match token {
        Some(token) => builder.header("authorization", format!("Bearer {}", token)),
        None => builder,
    }
}

fn parse<T: for<'de> Deserialize<'de>>(response: &Response<Bytes>) -> T {
    serde_json::from_slice(response.body()).unwrap_or_else(|e| {
        panic!(
            "parse {:?} as JSON: {}",
            String::from_utf8_lossy(response.body()),
            e
        )
    })
}

fn assert_failed(response: &Response<Bytes>, expected: StatusCode, field: Option<&str>) {
    assert_eq!(
        response.status(),
        expected,
        "unexpected status for {:?}",
        String::from_utf8_lossy(response.body())
    );

    let timing = response
        .headers()
        .get("server-timing")
        .expect("refusals must be timed too")
        .to_str()
        .unwrap();
    assert!(timing.starts_with("handler;dur="), "{:?}", timing);

    let error: ErrorResponse = parse(response);
    assert!(!error.message.is_empty(), "error must carry a message");
    assert_eq!(error.field.as_deref(), field);
}

fn parent_registration(email: &str) -> Value {
    json!({
        "role": "parent",
        "name": "Claire Martin",
        "email": email,
        "password": "correct horse",
        "age": 38,
        "contact": "+33 6 12 34 56 78",
        "address": "8 Rue Mercière, Lyon",
        "photo": "https://img.example.com/claire.png"
    })
}

fn babysitter_registration(email: &str, rate: f64, skills: &[&str]) -> Value {
    json!({
        "role": "babysitter",
        "name": "Ines Laurent",
        "email": email,
        "password": "battery staple",
        "age": 22,
        "contact": "+33 6 98 76 54 32",
        "address": "3 Quai Saint-Vincent, Lyon",
        "photo": "https://img.example.com/ines.png",
        "hourly_rate": rate,
        "experience": 3,
        "skills": skills,
        "bio": "Student nurse, loves board games."
    })
}

/// Signs up and returns the session token and account ID.
async fn sign_up<F>(filter: &F, registration: &Value) -> (String, String)
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    let response = request("POST", "auth/signup", None)
        .json(registration)
        .reply(filter)
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let session: SessionResponse = parse(&response);

    let id = session.user["id"]
        .as_str()
        .expect("user must have an ID")
        .to_owned();

    (session.token, id)
}

fn reservation_request(babysitter: &str, duration: Value) -> Value {
    json!({
        "babysitter_id": babysitter,
        "date": "2025-03-14",
        "time": "18:30",
        "duration": duration,
        "description": "Two kids, bedtime at nine"
    })
}

async fn book<F>(filter: &F, token: &str, babysitter: &str, duration: i64) -> Value
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    let response = request("POST", "reservations", Some(token))
        .json(&reservation_request(babysitter, json!(duration)))
        .reply(filter)
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);

    parse(&response)
}

async fn change_status<F>(filter: &F, token: &str, id: &str, status: &str) -> Response<Bytes>
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    request("PATCH", &format!("reservations/{}/status", id), Some(token))
        .json(&json!({ "status": status }))
        .reply(filter)
        .await
}

#[tokio::test]
async fn accounts_and_sessions_work() {
    let filter = api(make_environment("accounts_and_sessions_work"));

    let response = request("POST", "auth/signup", None)
        .json(&parent_registration("  Claire@Example.COM "))
        .reply(&filter)
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key("server-timing"));

    let session: SessionResponse = parse(&response);
    assert_eq!(session.message.as_deref(), Some("account created"));
    assert_eq!(session.user["email"], "claire@example.com");
    assert_eq!(session.user["role"], "parent");
    assert!(session.user.get("password").is_none());
    assert!(session.user.get("password_hash").is_none());

    let me = request("GET", "me", Some(&session.token))
        .reply(&filter)
        .await;
    assert_eq!(me.status(), StatusCode::OK);
    let account: Value = parse(&me);
    assert_eq!(account["name"], "Claire Martin");

    // the same address, differently cased, is taken
    let duplicate = request("POST", "auth/signup", None)
        .json(&parent_registration("claire@example.com"))
        .reply(&filter)
        .await;
    assert_failed(&duplicate, StatusCode::CONFLICT, None);

    let wrong_password = request("POST", "auth/login", None)
        .json(&json!({ "email": "claire@example.com", "password": "incorrect horse" }))
        .reply(&filter)
        .await;
    assert_failed(&wrong_password, StatusCode::UNAUTHORIZED, None);

    let login = request("POST", "auth/login", None)
        .json(&json!({ "email": "CLAIRE@example.com", "password": "correct horse" }))
        .reply(&filter)
        .await;
    assert_eq!(login.status(), StatusCode::OK);
    let second: SessionResponse = parse(&login);
    assert_ne!(second.token, session.token);
    assert!(second.message.is_none());

    let logout = request("POST", "auth/logout", Some(&session.token))
        .reply(&filter)
        .await;
    assert_eq!(logout.status(), StatusCode::OK);

    let revoked = request("GET", "me", Some(&session.token))
        .reply(&filter)
        .await;
    assert_failed(&revoked, StatusCode::UNAUTHORIZED, None);

    let still_valid = request("GET", "me", Some(&second.token))
        .reply(&filter)
        .await;
    assert_eq!(still_valid.status(), StatusCode::OK);

    let anonymous = request("GET", "me", None).reply(&filter).await;
    assert_failed(&anonymous, StatusCode::UNAUTHORIZED, None);
}

#[tokio::test]
async fn bad_registrations_fail() {
    let filter = api(make_environment("bad_registrations_fail"));

    let mut short_password = parent_registration("short@example.com");
    short_password["password"] = json!("short");
    let response = request("POST", "auth/signup", None)
        .json(&short_password)
        .reply(&filter)
        .await;
    assert_failed(&response, StatusCode::BAD_REQUEST, Some("password"));

    let mut bad_role = parent_registration("role@example.com");
    bad_role["role"] = json!("administrator");
    let response = request("POST", "auth/signup", None)
        .json(&bad_role)
        .reply(&filter)
        .await;
    assert_failed(&response, StatusCode::BAD_REQUEST, None);

    let response = request("POST", "auth/signup", None)
        .header("content-type", "application/json")
        .body("{ not json")
        .reply(&filter)
        .await;
    assert_failed(&response, StatusCode::BAD_REQUEST, None);

    // beyond what the profile can store
    let mut registration = babysitter_registration("rich@example.com", 15.0, &[]);
    registration["tarif"] = json!(1e9);
    registration.as_object_mut().unwrap().remove("hourly_rate");
    let response = request("POST", "auth/signup", None)
        .json(&registration)
        .reply(&filter)
        .await;
    assert_failed(&response, StatusCode::BAD_REQUEST, Some("hourly_rate"));

    let response = request("GET", "reservations", None).reply(&filter).await;
    assert_failed(&response, StatusCode::UNAUTHORIZED, None);
}

#[tokio::test]
async fn reservation_lifecycle_works() {
    let filter = api(make_environment("reservation_lifecycle_works"));

    let (parent, parent_id) = sign_up(&filter, &parent_registration("parent@example.com")).await;
    let (sitter, sitter_id) = sign_up(
        &filter,
        &babysitter_registration("sitter@example.com", 12.5, &["CPR"]),
    )
    .await;

    let response = request("POST", "reservations", Some(&parent))
        .json(&reservation_request(&sitter_id, json!(3)))
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let reservation: Value = parse(&response);
    let id = reservation["id"].as_str().expect("reservation ID").to_owned();
    assert_eq!(
        response.headers()["location"].to_str().unwrap(),
        format!("https://sitters.example.com/api/reservations/{}", id)
    );
    assert_eq!(reservation["status"], "pending");
    assert_eq!(reservation["total"], 37.5);
    assert_eq!(reservation["date"], "2025-03-14");
    assert_eq!(reservation["time"], "18:30");
    assert_eq!(reservation["parent"]["id"], parent_id.as_str());
    assert_eq!(reservation["babysitter"]["id"], sitter_id.as_str());
    assert_eq!(reservation["babysitter"]["name"], "Ines Laurent");

    // both parties see it
    for token in [&parent, &sitter] {
        let listed = request("GET", "reservations", Some(token))
            .reply(&filter)
            .await;
        assert_eq!(listed.status(), StatusCode::OK);
        let listed: Vec<Value> = parse(&listed);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["id"], id.as_str());
    }

    // parents cannot accept their own booking
    let response = change_status(&filter, &parent, &id, "confirmed").await;
    assert_failed(&response, StatusCode::FORBIDDEN, None);

    let response = change_status(&filter, &sitter, &id, "accepted").await;
    assert_eq!(response.status(), StatusCode::OK);
    let confirmed: Value = parse(&response);
    assert_eq!(confirmed["status"], "confirmed");
    assert_eq!(confirmed["total"], 37.5);

    // only pending reservations can be withdrawn
    let response = request("DELETE", &format!("reservations/{}", id), Some(&parent))
        .reply(&filter)
        .await;
    assert_failed(&response, StatusCode::CONFLICT, None);

    let response = change_status(&filter, &sitter, &id, "pending").await;
    assert_failed(&response, StatusCode::CONFLICT, None);

    let response = change_status(&filter, &sitter, &id, "completed").await;
    assert_eq!(response.status(), StatusCode::OK);
    let completed: Value = parse(&response);
    assert_eq!(completed["status"], "completed");

    let response = change_status(&filter, &sitter, &id, "cancelled").await;
    assert_failed(&response, StatusCode::CONFLICT, None);
}

#[tokio::test]
async fn pending_reservations_can_be_declined_or_withdrawn() {
    let filter = api(make_environment("pending_reservations_can_be_declined_or_withdrawn"));

    let (parent, _) = sign_up(&filter, &parent_registration("parent@example.com")).await;
    let (sitter, sitter_id) = sign_up(
        &filter,
        &babysitter_registration("sitter@example.com", 15.0, &[]),
    )
    .await;

    let declined = book(&filter, &parent, &sitter_id, 2).await;
    let declined_id = declined["id"].as_str().expect("reservation ID");
    let response = change_status(&filter, &sitter, declined_id, "declined").await;
    assert_eq!(response.status(), StatusCode::OK);
    let reply: Value = parse(&response);
    assert_eq!(reply["status"], "cancelled");

    let withdrawn = book(&filter, &parent, &sitter_id, 4).await;
    assert_eq!(withdrawn["total"], 60.0);
    let withdrawn_id = withdrawn["id"].as_str().expect("reservation ID");

    // the babysitter cannot delete, only decline
    let response = request("DELETE", &format!("reservations/{}", withdrawn_id), Some(&sitter))
        .reply(&filter)
        .await;
    assert_failed(&response, StatusCode::FORBIDDEN, None);

    let response = request("DELETE", &format!("reservations/{}", withdrawn_id), Some(&parent))
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let deleted: DeletionResponse = parse(&response);
    assert_eq!(deleted.id, withdrawn_id);
    assert_eq!(deleted.message, "reservation deleted");

    let response = change_status(&filter, &sitter, withdrawn_id, "confirmed").await;
    assert_failed(&response, StatusCode::NOT_FOUND, None);

    let listed = request("GET", "reservations", Some(&parent))
        .reply(&filter)
        .await;
    let listed: Vec<Value> = parse(&listed);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["status"], "cancelled");
}

#[tokio::test]
async fn bad_reservations_fail() {
    let filter = api(make_environment("bad_reservations_fail"));

    let (parent, parent_id) = sign_up(&filter, &parent_registration("parent@example.com")).await;
    let (sitter, sitter_id) = sign_up(
        &filter,
        &babysitter_registration("sitter@example.com", 15.0, &[]),
    )
    .await;
    let (stranger, _) = sign_up(&filter, &parent_registration("other@example.com")).await;

    for duration in [0, 13, -2] {
        let response = request("POST", "reservations", Some(&parent))
            .json(&reservation_request(&sitter_id, json!(duration)))
            .reply(&filter)
            .await;
        assert_failed(&response, StatusCode::BAD_REQUEST, Some("duration"));
    }

    let response = request("POST", "reservations", Some(&parent))
        .json(&reservation_request(&sitter_id, json!("three")))
        .reply(&filter)
        .await;
    assert_failed(&response, StatusCode::BAD_REQUEST, None);

    let mut late = reservation_request(&sitter_id, json!(2));
    late["time"] = json!("25:00");
    let response = request("POST", "reservations", Some(&parent))
        .json(&late)
        .reply(&filter)
        .await;
    assert_failed(&response, StatusCode::BAD_REQUEST, Some("time"));

    let response = request("POST", "reservations", None)
        .json(&reservation_request(&sitter_id, json!(2)))
        .reply(&filter)
        .await;
    assert_failed(&response, StatusCode::UNAUTHORIZED, None);

    let response = request("POST", "reservations", Some(&sitter))
        .json(&reservation_request(&sitter_id, json!(2)))
        .reply(&filter)
        .await;
    assert_failed(&response, StatusCode::FORBIDDEN, None);

    // booking a parent as if they were a babysitter
    let response = request("POST", "reservations", Some(&parent))
        .json(&reservation_request(&parent_id, json!(2)))
        .reply(&filter)
        .await;
    assert_failed(&response, StatusCode::NOT_FOUND, None);

    let reservation = book(&filter, &parent, &sitter_id, 2).await;
    let id = reservation["id"].as_str().expect("reservation ID");

    let response = change_status(&filter, &stranger, id, "cancelled").await;
    assert_failed(&response, StatusCode::FORBIDDEN, None);

    let response = change_status(&filter, &sitter, "not-an-id", "confirmed").await;
    assert_failed(&response, StatusCode::BAD_REQUEST, None);
    let error: ErrorResponse = parse(&response);
    assert_eq!(error.id.as_deref(), Some("not-an-id"));

    let response = change_status(&filter, &sitter, id, "finished").await;
    assert_failed(&response, StatusCode::BAD_REQUEST, None);

    let listed = request("GET", "reservations", Some(&stranger))
        .reply(&filter)
        .await;
    let listed: Vec<Value> = parse(&listed);
    assert!(listed.is_empty());
}

#[tokio::test]
async fn babysitters_can_be_searched_and_reviewed() {
    let filter = api(make_environment("babysitters_can_be_searched_and_reviewed"));

    let (parent, _) = sign_up(&filter, &parent_registration("parent@example.com")).await;

    let mut sitters = vec![];
    for n in 0..12 {
        let skills: &[&str] = if n % 3 == 0 { &["CPR", "Music"] } else { &["Cooking"] };
        let (token, id) = sign_up(
            &filter,
            &babysitter_registration(&format!("sitter{}@example.com", n), 10.0 + n as f64, skills),
        )
        .await;
        sitters.push((token, id));
    }

    let response = request("GET", "babysitters?page=2&page_size=5", None)
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let listing: Value = parse(&response);
    assert_eq!(listing["total"], 12);
    assert_eq!(listing["total_pages"], 3);
    assert_eq!(listing["page"], 2);
    assert_eq!(listing["items"].as_array().map(Vec::len), Some(5));

    let response = request("GET", "babysitters?minPrice=12&maxPrice=15&skills=CPR", None)
        .reply(&filter)
        .await;
    let listing: Value = parse(&response);
    let rates = listing["items"]
        .as_array()
        .expect("items")
        .iter()
        .map(|b| b["hourly_rate"].as_f64().expect("hourly rate"))
        .collect::<Vec<_>>();
    assert_eq!(listing["total"], 1);
    assert_eq!(rates, vec![13.0]);

    let response = request("GET", "babysitters?page=0", None).reply(&filter).await;
    assert_failed(&response, StatusCode::BAD_REQUEST, Some("page"));

    // closing a listing hides it from available-only searches
    let (sitter, sitter_id) = &sitters[0];
    let response = request("PUT", "babysitters/availability", Some(sitter))
        .json(&json!({ "available": false }))
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = parse(&response);
    assert_eq!(updated["available"], false);

    let response = request("GET", "babysitters?available=true", None)
        .reply(&filter)
        .await;
    let listing: Value = parse(&response);
    assert_eq!(listing["total"], 11);

    let response = request("PUT", "babysitters/availability", Some(&parent))
        .json(&json!({ "available": true }))
        .reply(&filter)
        .await;
    assert_failed(&response, StatusCode::FORBIDDEN, None);

    for rating in [5, 4] {
        let response = request("POST", &format!("babysitters/{}/reviews", sitter_id), Some(&parent))
            .json(&json!({ "rating": rating, "comment": "Punctual and kind" }))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = request("POST", &format!("babysitters/{}/reviews", sitter_id), Some(&parent))
        .json(&json!({ "rating": 6, "comment": "Too good" }))
        .reply(&filter)
        .await;
    assert_failed(&response, StatusCode::BAD_REQUEST, Some("rating"));

    let response = request("GET", &format!("babysitters/{}", sitter_id), None)
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let profile: Value = parse(&response);
    assert_eq!(profile["rating"], 4.5);
    assert_eq!(profile["total_reviews"], 2);
    assert_eq!(profile["skills"], json!(["CPR", "Music"]));

    let response = request("GET", &format!("babysitters/{}/reviews", sitter_id), None)
        .reply(&filter)
        .await;
    let reviews: Vec<Value> = parse(&response);
    assert_eq!(reviews.len(), 2);

    let missing = uuid::Uuid::new_v4().to_string();
    let response = request("GET", &format!("babysitters/{}", missing), None)
        .reply(&filter)
        .await;
    assert_failed(&response, StatusCode::NOT_FOUND, None);
    let error: ErrorResponse = parse(&response);
    assert_eq!(error.babysitter.as_deref(), Some(missing.as_str()));
}

#[tokio::test]
async fn administrators_override_the_parties() {
    let environment = make_environment("administrators_override_the_parties");
    let filter = api(environment.clone());
    let admin = admin(environment);

    let (parent, _) = sign_up(&filter, &parent_registration("parent@example.com")).await;
    let (sitter, sitter_id) = sign_up(
        &filter,
        &babysitter_registration("sitter@example.com", 20.0, &[]),
    )
    .await;

    let health = warp::test::request()
        .method("GET")
        .path("/healthz")
        .reply(&admin)
        .await;
    assert_eq!(health.status(), StatusCode::OK);
    let health: Value = parse(&health);
    assert!(health["version"].is_string());

    let reservation = book(&filter, &parent, &sitter_id, 1).await;
    let id = reservation["id"].as_str().expect("reservation ID");

    let response = change_status(&filter, &sitter, id, "confirmed").await;
    assert_eq!(response.status(), StatusCode::OK);

    // no party may delete a confirmed reservation, the administrator may
    let response = warp::test::request()
        .method("DELETE")
        .path(&format!("/reservations/{}", id))
        .reply(&admin)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let deleted: DeletionResponse = parse(&response);
    assert_eq!(deleted.id, id);

    let response = warp::test::request()
        .method("DELETE")
        .path(&format!("/reservations/{}", id))
        .reply(&admin)
        .await;
    assert_failed(&response, StatusCode::NOT_FOUND, None);

    let reservation = book(&filter, &parent, &sitter_id, 1).await;
    let id = reservation["id"].as_str().expect("reservation ID");

    let response = warp::test::request()
        .method("PATCH")
        .path(&format!("/reservations/{}/status", id))
        .json(&json!({ "status": "completed" }))
        .reply(&admin)
        .await;
    assert_failed(&response, StatusCode::CONFLICT, None);

    let response = warp::test::request()
        .method("PATCH")
        .path(&format!("/reservations/{}/status", id))
        .json(&json!({ "status": "cancelled" }))
        .reply(&admin)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cancelled: Value = parse(&response);
    assert_eq!(cancelled["status"], "cancelled");
}
