use crate::error::{AppError, AppResult};
use crate::models::Credentials;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser, Debug, Clone)]
#[command(name = "toot-export")]
#[command(author = "Dabe Vlohn")]
#[command(version)]
#[command(about = "Incremental export of Mastodon toots to a JSON file")]
pub struct Cli {
    /// Путь к config.json
    /// env: TOOT_EXPORT_CONFIG
    #[arg(long, env = "TOOT_EXPORT_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// Путь к JSON архиву постов
    /// env: TOOT_EXPORT_STATUSES
    #[arg(long, env = "TOOT_EXPORT_STATUSES", default_value = "statuses.json")]
    pub statuses: PathBuf,

    /// Создать шаблон конфигурации (по пути --config) и выйти
    #[arg(long)]
    pub dummy: bool,
}

/// Параметры подключения к инстанции Mastodon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "Server")]
    pub server: String,
    #[serde(rename = "ClientID")]
    pub client_id: String,
    #[serde(rename = "ClientSecret")]
    pub client_secret: String,
    #[serde(rename = "MastodonAccount")]
    pub mastodon_account: String,
    #[serde(rename = "MastodonPasswort")]
    pub mastodon_passwort: String,
}

impl Config {
    /// Шаблон с заглушками для режима --dummy
    pub fn dummy() -> Self {
        Config {
            server: "https://social.tchncs.de".to_string(),
            client_id: "132456".to_string(),
            client_secret: "s0s3cr3t".to_string(),
            mastodon_account: "mastodon-accounts-email@address.com".to_string(),
            mastodon_passwort: "t0pS3cr3t".to_string(),
        }
    }

    /// Читает и валидирует конфигурацию
    pub async fn load(path: &Path) -> AppResult<Self> {
        debug!("Loading config from {}", path.display());

        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;

        let config: Config = serde_json::from_str(&raw).map_err(|e| {
            AppError::Config(format!("invalid JSON in {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Записывает шаблон конфигурации, существующий файл перезаписывается
    pub async fn write_dummy(path: &Path) -> AppResult<()> {
        let json = serde_json::to_string_pretty(&Self::dummy())?;
        tokio::fs::write(path, json).await?;
        info!("Dummy config written to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        let fields = [
            ("Server", &self.server),
            ("ClientID", &self.client_id),
            ("ClientSecret", &self.client_secret),
            ("MastodonAccount", &self.mastodon_account),
            ("MastodonPasswort", &self.mastodon_passwort),
        ];

        if let Some((name, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(AppError::Config(format!("{} must not be empty", name)));
        }

        if !self.server.starts_with("https://") && !self.server.starts_with("http://") {
            return Err(AppError::Config(format!(
                "Server must be an http(s) URL, got {}",
                self.server
            )));
        }

        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            username: self.mastodon_account.clone(),
            password: self.mastodon_passwort.clone(),
        }
    }
}
