use crate::error::AppResult;
use crate::models::Toot;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Загружает архив; отсутствующий или битый файл означает пустой архив
pub async fn load_toots(path: &Path) -> Vec<Toot> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No archive at {}, starting empty", path.display());
            return Vec::new();
        }
        Err(e) => {
            warn!("Cannot read archive {}, starting empty: {}", path.display(), e);
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<Toot>>(&raw) {
        Ok(toots) => {
            debug!("Loaded {} toots from {}", toots.len(), path.display());
            toots
        }
        Err(e) => {
            warn!("Archive {} is not valid, starting empty: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Сохраняет архив через временный файл, чтобы не оставить обрезанный JSON
pub async fn save_toots(toots: &[Toot], path: &Path) -> AppResult<()> {
    let json = serde_json::to_string_pretty(toots)?;

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, json).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    debug!("Saved {} toots to {}", toots.len(), path.display());
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn is_already_archived(historic: &[Toot], toot: &Toot) -> bool {
    historic.iter().any(|h| h.id == toot.id)
}

/// Индекс первого нового поста, уже присутствующего в архиве; len(fresh), если пересечения нет
pub fn find_first_duplicate_index(historic: &[Toot], fresh: &[Toot]) -> usize {
    fresh
        .iter()
        .position(|t| is_already_archived(historic, t))
        .unwrap_or(fresh.len())
}

/// Новые посты (до первого дубликата) перед историческими, порядок newest-first
pub fn merge(historic: Vec<Toot>, fresh: Vec<Toot>) -> Vec<Toot> {
    let first_duplicate = find_first_duplicate_index(&historic, &fresh);

    match fresh.get(first_duplicate) {
        Some(dup) => debug!("First duplicate at {}: {}", first_duplicate, dup.id),
        None => debug!("No duplicate among {} new toots", fresh.len()),
    }

    let mut merged = Vec::with_capacity(first_duplicate + historic.len());
    merged.extend(fresh.into_iter().take(first_duplicate));
    merged.extend(historic);
    merged
}
