use serde::Serialize;
use uuid::Uuid;

use crate::account::Account;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SuccessResponse<'a> {
    Deleted {
        message: &'a str,
        id: Uuid,
    },
    Healthz {
        revision: Option<&'a str>,
        timestamp: Option<&'a str>,
        version: &'a str,
    },
    Message {
        message: &'a str,
    },
    Session {
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<&'a str>,
        token: Uuid,
        user: &'a Account,
    },
}
