use crate::error::{AppError, AppResult};
use crate::models::{AccessToken, Credentials, MastodonAccount, MastodonStatus, Pagination, Session};
use async_trait::async_trait;
use reqwest::header::LINK;
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const USER_AGENT: &str = concat!("toot-export/", env!("CARGO_PKG_VERSION"));
const TIMEOUT_SECS: u64 = 30;
const OAUTH_SCOPE: &str = "read";

pub struct MastodonClient {
    http_client: Client,
    server: String,
}

impl MastodonClient {
    pub fn new(server: &str) -> AppResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                error!("Failed to build HTTP client: {}", e);
                AppError::NetworkError(e)
            })?;

        Ok(MastodonClient {
            http_client,
            server: server.trim_end_matches('/').to_owned(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }
}

/// Обновляет курсор по заголовку Link: rel="next" даёт max_id, rel="prev" даёт since_id/min_id.
/// Без ссылки next курсор сбрасывается, т.е. страниц больше нет.
fn apply_link_header(pg: &mut Pagination, link: Option<&str>) {
    pg.max_id = None;
    pg.since_id = None;
    pg.min_id = None;

    let Some(link) = link else {
        return;
    };

    for part in link.split(',') {
        let mut segments = part.split(';');
        let Some(target) = segments.next() else {
            continue;
        };
        let target = target.trim().trim_start_matches('<').trim_end_matches('>');

        let rel = segments
            .map(str::trim)
            .find_map(|s| s.strip_prefix("rel="))
            .map(|r| r.trim_matches('"'));

        let url = match Url::parse(target) {
            Ok(url) => url,
            Err(e) => {
                warn!("Skipping malformed Link target {}: {}", target, e);
                continue;
            }
        };

        let query_value = |key: &str| {
            url.query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        };

        match rel {
            Some("next") => pg.max_id = query_value("max_id"),
            Some("prev") => {
                pg.since_id = query_value("since_id");
                pg.min_id = query_value("min_id");
            }
            _ => {}
        }
    }
}

#[async_trait]
impl super::MastodonApi for MastodonClient {
    async fn authenticate(&self, cred: &Credentials) -> AppResult<Session> {
        debug!("Requesting OAuth token from {} for {}", self.server, cred.username);

        let response = self
            .http_client
            .post(self.endpoint("/oauth/token"))
            .form(&[
                ("grant_type", "password"),
                ("client_id", cred.client_id.as_str()),
                ("client_secret", cred.client_secret.as_str()),
                ("username", cred.username.as_str()),
                ("password", cred.password.as_str()),
                ("scope", OAUTH_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| {
                error!("Failed to request token: {}", e);
                AppError::from_send(e)
            })?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("Mastodon rejected credentials for {}", cred.username);
                return Err(AppError::InvalidCredentials);
            }
            s => {
                return Err(AppError::ApiError(format!("token request returned HTTP {}", s)));
            }
        }

        let token: AccessToken = response.json().await.map_err(|e| {
            error!("Failed to parse token response: {}", e);
            AppError::ApiError("Cannot parse token".to_string())
        })?;

        info!("Authenticated against {}", self.server);
        Ok(Session {
            access_token: token.access_token,
        })
    }

    async fn current_account(&self, session: &Session) -> AppResult<MastodonAccount> {
        let response = self
            .http_client
            .get(self.endpoint("/api/v1/accounts/verify_credentials"))
            .header("Authorization", session.auth_header())
            .send()
            .await
            .map_err(|e| {
                error!("Failed to verify credentials: {}", e);
                AppError::from_send(e)
            })?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AppError::InvalidCredentials);
            }
            s => {
                return Err(AppError::ApiError(format!("account lookup returned HTTP {}", s)));
            }
        }

        let account: MastodonAccount = response.json().await.map_err(|e| {
            error!("Failed to parse account data: {}", e);
            AppError::ApiError("Cannot parse account".to_string())
        })?;

        info!("Exporting toots of {} (id {})", account.acct, account.id);
        Ok(account)
    }

    async fn account_statuses(
        &self,
        session: &Session,
        account_id: &str,
        pg: &mut Pagination,
    ) -> AppResult<Vec<MastodonStatus>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(max_id) = &pg.max_id {
            query.push(("max_id", max_id.clone()));
        }
        if let Some(since_id) = &pg.since_id {
            query.push(("since_id", since_id.clone()));
        }
        if let Some(min_id) = &pg.min_id {
            query.push(("min_id", min_id.clone()));
        }
        if let Some(limit) = pg.limit {
            query.push(("limit", limit.to_string()));
        }

        let endpoint = self.endpoint(&format!("/api/v1/accounts/{}/statuses", account_id));
        debug!("Fetching statuses from {} with {:?}", endpoint, query);

        let response = self
            .http_client
            .get(&endpoint)
            .header("Authorization", session.auth_header())
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to fetch statuses: {}", e);
                AppError::from_send(e)
            })?;

        if !response.status().is_success() {
            error!("API returned status: {}", response.status());
            return Err(AppError::ApiError(format!(
                "statuses request returned HTTP {}",
                response.status()
            )));
        }

        let link = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let statuses: Vec<MastodonStatus> = response.json().await.map_err(|e| {
            error!("Failed to parse statuses JSON: {}", e);
            AppError::ApiError("Cannot parse statuses".to_string())
        })?;

        apply_link_header(pg, link.as_deref());
        debug!("Fetched {} statuses, next max_id: {:?}", statuses.len(), pg.max_id);

        Ok(statuses)
    }
}
