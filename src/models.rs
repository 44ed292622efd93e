use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Данные для OAuth password grant
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
}

/// Авторизованная сессия
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
}

impl Session {
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MastodonAccount {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub acct: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MastodonStatus {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub uri: String,
    pub url: Option<String>,
    pub reblog: Option<Box<MastodonStatus>>,
    #[serde(default)]
    pub account: MastodonAccount,
}

/// Курсор постраничной выдачи
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    pub max_id: Option<String>,
    pub since_id: Option<String>,
    pub min_id: Option<String>,
    pub limit: Option<u32>,
}

/// Запись архива
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub content: String,
    pub url: String,
}
