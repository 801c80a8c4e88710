use std::time::Duration;

use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
    pub(crate) elapsed: Option<Duration>,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection {
            context,
            error,
            elapsed: None,
        }
    }

    /// Records how long the handler ran before failing.
    pub fn timed(self, elapsed: Duration) -> Self {
        Rejection {
            elapsed: Some(elapsed),
            ..self
        }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        FlattenedRejection {
            context: self.context.clone(),
            message: format!("{}", self.error),
            field: self.error.field(),
        }
    }
}

impl reject::Reject for Rejection {}

#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) field: Option<&'static str>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Context {
    Account,
    Availability,
    Babysitter { babysitter: String },
    Babysitters,
    Login,
    Logout,
    Reservation { id: String },
    Reservations,
    Signup,
}

impl Context {
    pub fn account() -> Context {
        Context::Account
    }

    pub fn availability() -> Context {
        Context::Availability
    }

    pub fn babysitter(babysitter: String) -> Context {
        Context::Babysitter { babysitter }
    }

    pub fn babysitters() -> Context {
        Context::Babysitters
    }

    pub fn login() -> Context {
        Context::Login
    }

    pub fn logout() -> Context {
        Context::Logout
    }

    pub fn reservation(id: String) -> Context {
        Context::Reservation { id }
    }

    pub fn reservations() -> Context {
        Context::Reservations
    }

    pub fn signup() -> Context {
        Context::Signup
    }
}
