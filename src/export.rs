use crate::api::mastodon::MastodonClient;
use crate::api::MastodonApi;
use crate::archive::{self, is_already_archived};
use crate::config::{Cli, Config};
use crate::error::AppResult;
use crate::models::{Pagination, Session, Toot};
use crate::sanitize::{convert_statuses, HtmlPolicy};
use std::time::Instant;
use tracing::{debug, info};

/// Максимальный размер страницы, который отдаёт Mastodon
const PAGE_LIMIT: u32 = 40;

/// Листает посты аккаунта от новых к старым.
/// Останавливается на пустой странице, на сброшенном курсоре
/// или на первом посте, который уже есть в архиве (он попадает в результат).
pub async fn fetch_new_toots(
    api: &dyn MastodonApi,
    session: &Session,
    account_id: &str,
    historic: &[Toot],
    policy: &HtmlPolicy,
) -> AppResult<Vec<Toot>> {
    let mut pg = Pagination {
        limit: Some(PAGE_LIMIT),
        ..Pagination::default()
    };
    let mut fresh = Vec::new();

    loop {
        debug!("Requesting page with max_id {:?}", pg.max_id);
        let statuses = api.account_statuses(session, account_id, &mut pg).await?;
        if statuses.is_empty() {
            break;
        }

        let mut reached_archive = false;
        for toot in convert_statuses(statuses, policy) {
            reached_archive = is_already_archived(historic, &toot);
            fresh.push(toot);
            if reached_archive {
                break;
            }
        }

        if reached_archive || pg.max_id.is_none() {
            break;
        }

        pg.since_id = None;
        pg.min_id = None;
    }

    Ok(fresh)
}

/// Полный прогон: конфиг, вход, выгрузка, слияние, запись
pub async fn run(cli: &Cli) -> AppResult<()> {
    let started = Instant::now();

    let config = Config::load(&cli.config).await?;
    let policy = HtmlPolicy::strict();
    let historic = archive::load_toots(&cli.statuses).await;

    let client = MastodonClient::new(&config.server)?;
    let merged = export_with(&client, &config, historic, &policy).await?;

    archive::save_toots(&merged.toots, &cli.statuses).await?;

    info!(
        historic = merged.historic,
        new = merged.fetched,
        all = merged.toots.len(),
        duration = ?started.elapsed(),
        "Export finished: {}",
        cli.statuses.display()
    );
    Ok(())
}

pub struct ExportOutcome {
    pub historic: usize,
    pub fetched: usize,
    pub toots: Vec<Toot>,
}

/// Всё, что касается сети, без файловых операций
pub async fn export_with(
    api: &dyn MastodonApi,
    config: &Config,
    historic: Vec<Toot>,
    policy: &HtmlPolicy,
) -> AppResult<ExportOutcome> {
    let session = api.authenticate(&config.credentials()).await?;
    let account = api.current_account(&session).await?;

    let fresh = fetch_new_toots(api, &session, &account.id, &historic, policy).await?;

    let historic_len = historic.len();
    let fetched = fresh.len();
    let toots = archive::merge(historic, fresh);

    Ok(ExportOutcome {
        historic: historic_len,
        fetched,
        toots,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{Credentials, MastodonAccount, MastodonStatus};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Отдаёт заранее заданные страницы; курсор пуст после последней
    struct FakeApi {
        pages: Mutex<VecDeque<AppResult<Vec<MastodonStatus>>>>,
        calls: Mutex<usize>,
    }

    impl FakeApi {
        fn new(pages: Vec<AppResult<Vec<MastodonStatus>>>) -> Self {
            FakeApi {
                pages: Mutex::new(pages.into()),
                calls: Mutex::new(0),
            }
        }

        fn with_pages(pages: &[&[u32]]) -> Self {
            Self::new(pages.iter().map(|ids| Ok(statuses(ids))).collect())
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl MastodonApi for FakeApi {
        async fn authenticate(&self, cred: &Credentials) -> AppResult<Session> {
            if cred.password == "wrong" {
                return Err(AppError::InvalidCredentials);
            }
            Ok(Session {
                access_token: "tok".to_string(),
            })
        }

        async fn current_account(&self, _session: &Session) -> AppResult<MastodonAccount> {
            Ok(MastodonAccount {
                id: "1".to_string(),
                username: "me".to_string(),
                ..MastodonAccount::default()
            })
        }

        async fn account_statuses(
            &self,
            _session: &Session,
            _account_id: &str,
            pg: &mut Pagination,
        ) -> AppResult<Vec<MastodonStatus>> {
            *self.calls.lock().unwrap() += 1;
            assert_eq!(pg.limit, Some(PAGE_LIMIT));
            let mut pages = self.pages.lock().unwrap();
            let page = pages.pop_front().unwrap_or_else(|| Ok(Vec::new()))?;
            pg.max_id = if pages.is_empty() {
                None
            } else {
                page.last().map(|s| s.id.clone())
            };
            Ok(page)
        }
    }

    fn status(id: u32) -> MastodonStatus {
        MastodonStatus {
            id: id.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, id).unwrap(),
            content: format!("<p>toot {}</p>", id),
            uri: format!("https://example.com/users/me/statuses/{}", id),
            url: Some(format!("https://example.com/@me/{}", id)),
            reblog: None,
            account: MastodonAccount::default(),
        }
    }

    fn statuses(ids: &[u32]) -> Vec<MastodonStatus> {
        ids.iter().copied().map(status).collect()
    }

    fn toot(id: u32) -> Toot {
        Toot {
            id: id.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, id).unwrap(),
            content: format!("toot {}", id),
            url: format!("https://example.com/@me/{}", id),
        }
    }

    fn ids(toots: &[Toot]) -> Vec<String> {
        toots.iter().map(|t| t.id.clone()).collect()
    }

    fn session() -> Session {
        Session {
            access_token: "tok".to_string(),
        }
    }

    #[tokio::test]
    async fn test_stops_on_archived_toot() {
        let api = FakeApi::with_pages(&[&[10, 9], &[8, 7], &[6, 5]]);
        let policy = HtmlPolicy::strict();
        let historic = vec![toot(8), toot(7), toot(6)];

        let fresh = fetch_new_toots(&api, &session(), "1", &historic, &policy)
            .await
            .unwrap();

        assert_eq!(ids(&fresh), ["10", "9", "8"]);
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_stops_when_cursor_cleared() {
        let api = FakeApi::with_pages(&[&[4, 3], &[2, 1]]);
        let policy = HtmlPolicy::strict();

        let fresh = fetch_new_toots(&api, &session(), "1", &[], &policy)
            .await
            .unwrap();

        assert_eq!(ids(&fresh), ["4", "3", "2", "1"]);
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_stops_on_empty_page() {
        let api = FakeApi::with_pages(&[&[], &[5]]);
        let policy = HtmlPolicy::strict();

        let fresh = fetch_new_toots(&api, &session(), "1", &[], &policy)
            .await
            .unwrap();

        assert!(fresh.is_empty());
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_discards_page_results() {
        let api = FakeApi::new(vec![
            Ok(statuses(&[3, 2])),
            Err(AppError::ApiError("statuses request returned HTTP 502".to_string())),
            Ok(statuses(&[1])),
        ]);
        let policy = HtmlPolicy::strict();

        let err = fetch_new_toots(&api, &session(), "1", &[], &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ApiError(_)));
    }

    #[tokio::test]
    async fn test_export_merges_with_history() {
        let api = FakeApi::with_pages(&[&[5, 4], &[3, 2]]);
        let policy = HtmlPolicy::strict();
        let historic = vec![toot(3), toot(2), toot(1)];

        let outcome = export_with(&api, &Config::dummy(), historic, &policy)
            .await
            .unwrap();

        assert_eq!(outcome.historic, 3);
        assert_eq!(outcome.fetched, 3);
        assert_eq!(ids(&outcome.toots), ["5", "4", "3", "2", "1"]);
    }

    #[tokio::test]
    async fn test_export_auth_failure_fetches_nothing() {
        let api = FakeApi::with_pages(&[&[1]]);
        let policy = HtmlPolicy::strict();
        let mut config = Config::dummy();
        config.mastodon_passwort = "wrong".to_string();

        let err = export_with(&api, &config, Vec::new(), &policy)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::InvalidCredentials));
        assert_eq!(api.calls(), 0);
    }

    async fn mount_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok",
                "token_type": "Bearer"
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/verify_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "1",
                "username": "me",
                "acct": "me"
            })))
            .mount(server)
            .await;
    }

    fn status_json(id: u32) -> serde_json::Value {
        json!({
            "id": id.to_string(),
            "created_at": format!("2024-01-01T00:00:{:02}Z", id),
            "content": format!("<p>toot {}</p>", id),
            "uri": format!("https://example.com/users/me/statuses/{}", id),
            "url": format!("https://example.com/@me/{}", id),
            "reblog": null,
            "account": { "id": "1", "username": "me", "acct": "me" }
        })
    }

    /// Конфиг, указывающий на mock-сервер, и архив с заданной историей
    async fn workspace(dir: &TempDir, server: &MockServer, historic: &[Toot]) -> Cli {
        let config = Config {
            server: server.uri(),
            ..Config::dummy()
        };
        let config_path = dir.path().join("config.json");
        tokio::fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap())
            .await
            .unwrap();

        let statuses = dir.path().join("statuses.json");
        archive::save_toots(historic, &statuses).await.unwrap();

        Cli {
            config: config_path,
            statuses,
            dummy: false,
        }
    }

    #[tokio::test]
    async fn test_run_saves_merged_archive() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/1/statuses"))
            .and(query_param("limit", "40"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([status_json(3), status_json(2)])),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cli = workspace(&dir, &server, &[toot(2), toot(1)]).await;

        run(&cli).await.unwrap();

        let saved = archive::load_toots(&cli.statuses).await;
        assert_eq!(ids(&saved), ["3", "2", "1"]);
        assert_eq!(saved[0].content, "toot 3");
        assert_eq!(saved[0].url, "https://example.com/@me/3");
    }

    #[tokio::test]
    async fn test_run_keeps_archive_when_fetch_fails() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/1/statuses"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cli = workspace(&dir, &server, &[toot(2), toot(1)]).await;
        let before = tokio::fs::read(&cli.statuses).await.unwrap();

        let err = run(&cli).await.unwrap_err();
        assert!(matches!(err, AppError::ApiError(_)));

        let after = tokio::fs::read(&cli.statuses).await.unwrap();
        assert_eq!(before, after);
        assert!(!dir.path().join("statuses.json.tmp").exists());
    }
}
