use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use log::{debug, info, o, Logger};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::account::{Account, Credentials, Identity, Registration};
use crate::db::Db;
use crate::environment::Config;
use crate::errors::BackendError;

const BEARER_PREFIX: &str = "Bearer ";

/// A freshly opened session and the account it belongs to.
#[derive(Clone, Debug)]
pub struct Session {
    pub token: Uuid,
    pub user: Account,
}

/// Hashes a password into a PHC string with a random salt.
pub fn hash_password(password: &str) -> Result<String, BackendError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(BackendError::PasswordHash)?;

    Ok(hash.to_string())
}

/// Checks a password against a PHC string produced by `hash_password`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, BackendError> {
    let parsed = PasswordHash::new(hash).map_err(BackendError::PasswordHash)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(BackendError::PasswordHash(e)),
    }
}

/// Extracts the session token from an `Authorization: Bearer <token>`
/// header value.
pub fn parse_bearer(header: Option<&str>) -> Result<Uuid, BackendError> {
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(BackendError::MissingCredentials)?;

    let token = header
        .strip_prefix(BEARER_PREFIX)
        .or_else(|| header.strip_prefix("bearer "))
        .ok_or(BackendError::InvalidToken)?;

    Uuid::parse_str(token.trim()).map_err(|_| BackendError::InvalidToken)
}

/// Resolves the `Authorization` header to the account making the request.
pub async fn authenticate(
    db: &(dyn Db + Send + Sync),
    header: Option<&str>,
) -> Result<Identity, BackendError> {
    let token = parse_bearer(header)?;

    db.retrieve_session(&token)
        .await?
        .ok_or(BackendError::InvalidToken)
}

pub async fn register(
    logger: &Logger,
    db: &(dyn Db + Send + Sync),
    config: &Config,
    registration: Registration,
) -> Result<Session, BackendError> {
    registration.validate()?;

    let password_hash = hash_password(&registration.password)?;
    let user = db
        .insert_account(registration.into_new_account(password_hash))
        .await?;

    let logger = logger.new(o!("account" => user.id.to_string()));
    info!(logger, "Registered account"; "role" => %user.role);

    open_session(&logger, db, config, user).await
}

pub async fn login(
    logger: &Logger,
    db: &(dyn Db + Send + Sync),
    config: &Config,
    credentials: Credentials,
) -> Result<Session, BackendError> {
    let stored = db
        .retrieve_credentials(&credentials.email)
        .await?
        .ok_or(BackendError::InvalidCredentials)?;

    if !verify_password(&credentials.password, &stored.password_hash)? {
        debug!(logger, "Rejected password"; "account" => %stored.identity.id);
        return Err(BackendError::InvalidCredentials);
    }

    let user = db
        .retrieve_account(&stored.identity.id)
        .await?
        .ok_or(BackendError::InvalidCredentials)?;

    open_session(logger, db, config, user).await
}

pub async fn logout(db: &(dyn Db + Send + Sync), header: Option<&str>) -> Result<(), BackendError> {
    let token = parse_bearer(header)?;

    db.retrieve_session(&token)
        .await?
        .ok_or(BackendError::InvalidToken)?;

    db.remove_session(&token).await
}

async fn open_session(
    logger: &Logger,
    db: &(dyn Db + Send + Sync),
    config: &Config,
    user: Account,
) -> Result<Session, BackendError> {
    let expires_at = OffsetDateTime::now_utc() + config.session_lifetime;
    let token = db.create_session(&user.id, expires_at).await?;

    debug!(logger, "Opened session"; "account" => %user.id, "expires_at" => %expires_at);

    Ok(Session { token, user })
}
