// sanitize.rs - очистка HTML и преобразование статусов Mastodon в записи архива

use crate::models::{MastodonStatus, Toot};
use scraper::{ElementRef, Html};

const REBLOG_URL_SUFFIX: &str = "/activity";

/// Строгая политика: вырезает всю разметку, оставляет только текст.
/// Создаётся один раз на запуск.
pub struct HtmlPolicy {
    line_breaks: &'static [&'static str],
    blocks: &'static [&'static str],
}

impl HtmlPolicy {
    pub fn strict() -> Self {
        HtmlPolicy {
            line_breaks: &["br"],
            blocks: &["p", "div", "li", "blockquote", "pre"],
        }
    }

    pub fn sanitize(&self, html: &str) -> String {
        // html5ever сам декодирует все сущности, атрибуты в текст не попадают
        let fragment = Html::parse_fragment(html);
        let mut text = String::new();
        self.collect_text(fragment.root_element(), &mut text);

        let text = text
            .replace('\u{a0}', " ")
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");

        text.replace("\n\n\n", "\n\n").trim().to_string()
    }

    fn collect_text(&self, element: ElementRef<'_>, out: &mut String) {
        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                out.push_str(text);
            } else if let Some(child_element) = ElementRef::wrap(child) {
                let tag = child_element.value().name();
                if self.line_breaks.contains(&tag) {
                    out.push('\n');
                    continue;
                }
                self.collect_text(child_element, out);
                if self.blocks.contains(&tag) {
                    out.push('\n');
                }
            }
        }
    }
}

/// Переводит статус в запись архива; для репостов ставит префикс "RT автор: "
pub fn status_to_toot(status: MastodonStatus, policy: &HtmlPolicy) -> Toot {
    let mut content = policy.sanitize(&status.content);
    let mut url = status.url.filter(|u| !u.is_empty()).unwrap_or(status.uri);

    if let Some(reblog) = &status.reblog {
        // Обёртка репоста в новых версиях Mastodon приходит без текста
        if content.is_empty() {
            content = policy.sanitize(&reblog.content);
        }
        content = format!("RT {}: {}", reblog.account.username, content);
        if url.ends_with(REBLOG_URL_SUFFIX) {
            url.truncate(url.len() - REBLOG_URL_SUFFIX.len());
        }
    }

    Toot {
        id: status.id,
        created_at: status.created_at,
        content,
        url,
    }
}

pub fn convert_statuses(statuses: Vec<MastodonStatus>, policy: &HtmlPolicy) -> Vec<Toot> {
    statuses
        .into_iter()
        .map(|status| status_to_toot(status, policy))
        .collect()
}
