//! Link resolution: replace raw URLs with something worth saying out loud.
//!
//! Titles come from the page itself (`og:title`, then `<title>`). Anything
//! that goes wrong while fetching falls back to the bare domain name.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use regex::Regex;
use thiserror::Error;
use url::Url;

/// Why a page title could not be fetched
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("no title markup in the first {0} bytes")]
    NoTitle(usize),
}

/// Network limits for title lookups.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub timeout: Duration,
    pub max_body_bytes: usize,
    /// Distinct URLs fetched at the same time
    pub concurrency: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_body_bytes: 64 * 1024,
            concurrency: 4,
        }
    }
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)https?://\S+").expect("url regex should compile"))
}

fn og_title_regexes() -> &'static [Regex; 2] {
    static RE: OnceLock<[Regex; 2]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            Regex::new(
                r#"(?i)<meta\s[^>]*property\s*=\s*["']og:title["'][^>]*\scontent\s*=\s*["']([^"']+)["']"#,
            )
            .expect("og:title regex should compile"),
            Regex::new(
                r#"(?i)<meta\s[^>]*content\s*=\s*["']([^"']+)["'][^>]*\sproperty\s*=\s*["']og:title["']"#,
            )
            .expect("og:title regex should compile"),
        ]
    })
}

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<title[^>]*>([^<]+)</title>").expect("title regex should compile")
    })
}

/// URLs in `text`, in order. Sentence punctuation directly after a URL is
/// not part of it.
pub fn find_urls(text: &str) -> Vec<&str> {
    url_regex()
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', '!', '?', ';', ':', '"', '\'']))
        .collect()
}

/// Spoken fallback for a URL: its host without a leading `www.`.
pub fn domain_label(url: &str) -> String {
    match Url::parse(url).ok().and_then(|u| u.host_str().map(String::from)) {
        Some(host) => host
            .strip_prefix("www.")
            .map(String::from)
            .unwrap_or(host),
        None => url.to_string(),
    }
}

/// Rewrite the URLs in `text` using `fetch` for titles.
///
/// A message that is nothing but links becomes "Check out this link: ...";
/// otherwise each URL is replaced inline by "this link: {title}".
pub fn resolve_links<F>(text: &str, mut fetch: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let urls = find_urls(text);
    if urls.is_empty() {
        return text.to_string();
    }

    let mut rest = text.to_string();
    for url in &urls {
        rest = rest.replacen(url, "", 1);
    }

    let titles: Vec<String> = urls
        .iter()
        .map(|url| fetch(url).unwrap_or_else(|| domain_label(url)))
        .collect();

    if rest.trim().is_empty() {
        return format!("Check out this link: {}", titles.join(", "));
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (url, title) in urls.iter().zip(&titles) {
        // Each URL occurs at or after the previous one.
        let Some(offset) = text[cursor..].find(url) else {
            continue;
        };
        let start = cursor + offset;
        out.push_str(&text[cursor..start]);
        out.push_str("this link: ");
        out.push_str(title);
        cursor = start + url.len();
    }
    out.push_str(&text[cursor..]);
    out
}

/// Decode the handful of entities that show up in page titles.
fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Pull the best title out of an HTML document.
pub fn extract_title(html: &str) -> Option<String> {
    let [og_first, og_second] = og_title_regexes();
    let raw = og_first
        .captures(html)
        .or_else(|| og_second.captures(html))
        .or_else(|| title_regex().captures(html))
        .map(|caps| caps[1].to_string())?;

    let title = decode_entities(&raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}

/// Fetches page titles and remembers the successful ones for one run.
pub struct LinkResolver {
    http: reqwest::Client,
    settings: LinkSettings,
    titles: HashMap<String, String>,
}

impl LinkResolver {
    pub fn new(settings: LinkSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent("Mozilla/5.0")
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(http, settings))
    }

    /// Use a preconfigured client. `settings.timeout` is not applied to it.
    pub fn with_client(http: reqwest::Client, settings: LinkSettings) -> Self {
        Self {
            http,
            settings,
            titles: HashMap::new(),
        }
    }

    /// Fetch one page and extract its title. Reads at most
    /// `max_body_bytes` of the body.
    pub async fn fetch_title(&self, url: &str) -> Result<String, LinkError> {
        let mut resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(LinkError::Status(status.as_u16()));
        }

        let limit = self.settings.max_body_bytes;
        let mut body = Vec::with_capacity(limit.min(16 * 1024));
        while let Some(chunk) = resp.chunk().await? {
            let room = limit - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= limit {
                break;
            }
        }

        extract_title(&String::from_utf8_lossy(&body)).ok_or(LinkError::NoTitle(limit))
    }

    /// Fetch titles for every URL not already cached. Distinct URLs are
    /// requested concurrently, each at most once per call.
    pub async fn prefetch<'a, I>(&mut self, urls: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        let pending: Vec<String> = urls
            .into_iter()
            .filter(|url| !self.titles.contains_key(*url) && seen.insert(*url))
            .map(String::from)
            .collect();
        if pending.is_empty() {
            return;
        }
        tracing::debug!("Fetching titles for {} links", pending.len());

        let this = &*self;
        let results: Vec<(String, Result<String, LinkError>)> = stream::iter(pending)
            .map(|url| async move {
                let result = this.fetch_title(&url).await;
                (url, result)
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        for (url, result) in results {
            match result {
                Ok(title) => {
                    tracing::debug!("{} -> {:?}", url, title);
                    self.titles.insert(url, title);
                }
                Err(e) => tracing::debug!("No title for {}: {}", url, e),
            }
        }
    }

    /// Cached title for `url`, if a fetch succeeded earlier in this run.
    pub fn cached_title(&self, url: &str) -> Option<String> {
        self.titles.get(url).cloned()
    }

    /// Rewrite `text` from the cache. Call [`prefetch`](Self::prefetch) first.
    pub fn resolve(&self, text: &str) -> String {
        resolve_links(text, |url| self.cached_title(url))
    }
}
