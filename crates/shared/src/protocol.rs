use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::domain::{Role, UserId};

/// `{message, data}` wrapper used by every successful read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub message: Option<String>,
    pub data: T,
}

/// Success body of calls whose payload the client does not consume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub jwt: String,
    pub user_id: UserId,
    #[serde(default)]
    pub roles: BTreeSet<Role>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuantityRequest {
    pub quantity: u32,
}
