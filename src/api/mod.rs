pub mod mastodon;

use crate::error::AppResult;
use crate::models::{Credentials, MastodonAccount, MastodonStatus, Pagination, Session};
use async_trait::async_trait;

/// Абстрактный интерфейс к API Mastodon
#[async_trait]
pub trait MastodonApi: Send + Sync {
    /// Получает токен доступа по логину и паролю
    async fn authenticate(&self, cred: &Credentials) -> AppResult<Session>;

    /// Возвращает аккаунт владельца токена
    async fn current_account(&self, session: &Session) -> AppResult<MastodonAccount>;

    /// Загружает одну страницу постов аккаунта и сдвигает курсор к следующей
    async fn account_statuses(
        &self,
        session: &Session,
        account_id: &str,
        pg: &mut Pagination,
    ) -> AppResult<Vec<MastodonStatus>>;
}
