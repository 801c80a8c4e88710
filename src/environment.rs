use std::sync::Arc;

use log::Logger;

use crate::db::Db;
use crate::urls::Urls;

/// Everything a request handler needs.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub db: Arc<dyn Db + Send + Sync>,
    pub urls: Arc<Urls>,
    pub config: Config,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        db: Arc<dyn Db + Send + Sync>,
        urls: Arc<Urls>,
        config: Config,
    ) -> Self {
        Self {
            logger,
            db,
            urls,
            config,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// How long a session token stays valid after login.
    pub(crate) session_lifetime: time::Duration,
}

impl Config {
    pub fn new(session_hours: u16) -> Self {
        Self {
            session_lifetime: time::Duration::hours(session_hours as i64),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(24)
    }
}
