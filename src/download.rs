use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde_json::Value;
use tokio::task::JoinError;
use url::Url;

use crate::cli::DownloadArgs;
use crate::error::ItemError;
use crate::fetch::{HttpClient, HttpOptions};
use crate::formats::{CurriculumStep, curriculum_post_links};
use crate::queue::WorkerPool;
use crate::report::RunSummary;
use crate::retry::{RetryPolicy, retry};
use crate::store;

pub const DEFAULT_WORKERS: usize = 15;
pub const DEFAULT_API_BASE: &str = "https://backend.takeuforward.org/api/blog";

/// Where one article lives remotely and on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRef {
    pub category: String,
    pub slug: String,
    /// Path under `<api-base>/article/`.
    pub path: String,
}

impl ArticleRef {
    /// Accepts a full post link (`https://site/arrays/two-sum`) or a bare path
    /// (`arrays/two-sum`). Category is the first path segment, slug the last.
    pub fn parse(identifier: &str) -> Option<Self> {
        let identifier = identifier.trim();
        let path = match Url::parse(identifier) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url.path().to_owned(),
            Ok(_) => return None,
            Err(_) => identifier.to_owned(),
        };

        let segments = path
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        let (first, last) = (segments.first()?, segments.last()?);
        let category = store::sanitize_segment(first);
        let slug = store::sanitize_segment(last);
        if category.is_empty() || slug.is_empty() {
            return None;
        }

        Some(Self {
            category,
            slug,
            path: segments.join("/"),
        })
    }

    pub fn api_url(&self, api_base: &str) -> String {
        format!("{}/article/{}", api_base.trim_end_matches('/'), self.path)
    }

    pub fn destination(&self, out: &Path) -> PathBuf {
        out.join(&self.category).join(format!("{}.json", self.slug))
    }
}

/// Pulls identifiers out of a list response: an array, or an object wrapping one under
/// `data`/`articles`. Items are strings or objects carrying `post_link`, `path` or `slug`.
pub fn identifiers_from_listing(listing: &Value) -> Vec<String> {
    let items = match listing {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => ["data", "articles"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => ["post_link", "path", "slug"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str)),
            _ => None,
        })
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parses identifiers. Unusable ones are recorded as failures, and a repeated
/// destination file is recorded as a skip.
pub fn article_refs(identifiers: &[String], summary: &mut RunSummary) -> Vec<ArticleRef> {
    let mut seen = HashSet::new();
    let mut refs = Vec::new();
    for identifier in identifiers {
        let Some(article) = ArticleRef::parse(identifier) else {
            let err = ItemError::Identifier(identifier.clone());
            tracing::warn!(identifier = %identifier, "cannot derive category/slug");
            summary.record_failure(identifier.as_str(), &err);
            continue;
        };
        if !seen.insert((article.category.clone(), article.slug.clone())) {
            tracing::debug!(identifier = %identifier, "duplicate article; skipping");
            summary.record_skip();
            continue;
        }
        refs.push(article);
    }
    refs
}

async fn load_identifiers(
    args: &DownloadArgs,
    client: &HttpClient,
    policy: RetryPolicy,
) -> anyhow::Result<Vec<String>> {
    if let Some(path) = &args.curriculum {
        if !path.is_file() {
            return Err(ItemError::NotFound(path.clone()).into());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read curriculum: {}", path.display()))?;
        let steps: Vec<CurriculumStep> = serde_json::from_str(&raw)
            .with_context(|| format!("parse curriculum: {}", path.display()))?;
        return Ok(curriculum_post_links(&steps));
    }

    let list_url = args
        .list_url
        .clone()
        .unwrap_or_else(|| format!("{}/articles", args.api_base.trim_end_matches('/')));
    tracing::info!(url = %list_url, "fetching article list");
    let listing = retry(policy, &list_url, || client.get_json(&list_url))
        .await
        .context("fetch article list")?;
    Ok(identifiers_from_listing(&listing))
}

async fn fetch_article(
    client: &HttpClient,
    policy: RetryPolicy,
    url: &str,
    dest: &Path,
) -> Result<(), ItemError> {
    let body = retry(policy, url, || client.get_json(url)).await?;
    let pretty = serde_json::to_vec_pretty(&body).map_err(|source| ItemError::Parse {
        path: dest.to_path_buf(),
        source,
    })?;
    store::write_atomic(dest, &pretty).map_err(|err| ItemError::write(dest, err))
}

pub async fn run(args: DownloadArgs) -> anyhow::Result<Vec<RunSummary>> {
    let client = HttpClient::new(&HttpOptions::default())?;
    let policy = RetryPolicy::default();

    let identifiers = load_identifiers(&args, &client, policy).await?;
    let mut summary = RunSummary::new("download");
    let refs = article_refs(&identifiers, &mut summary);
    if refs.is_empty() {
        tracing::warn!("no articles to download");
    } else {
        tracing::info!(
            articles = refs.len(),
            workers = args.workers,
            out = %args.out.display(),
            "downloading articles"
        );
    }

    let mut pool = WorkerPool::new(args.workers);
    for article in refs {
        let dest = article.destination(&args.out);
        if args.skip_existing && dest.is_file() {
            tracing::debug!(path = %dest.display(), "already downloaded");
            summary.record_skip();
            continue;
        }

        let client = client.clone();
        let url = article.api_url(&args.api_base);
        pool.spawn(async move {
            let result = fetch_article(&client, policy, &url, &dest).await;
            (url, dest, result)
        });
    }

    for joined in pool.join_all().await {
        record_download(&mut summary, joined);
    }

    Ok(vec![summary])
}

type DownloadOutcome = (String, PathBuf, Result<(), ItemError>);

fn record_download(summary: &mut RunSummary, joined: Result<DownloadOutcome, JoinError>) {
    match joined {
        Ok((_, dest, Ok(()))) => {
            tracing::info!(path = %dest.display(), "saved article");
            summary.record_success();
        }
        Ok((url, _, Err(err))) => {
            tracing::warn!(url = %url, error = %err, "article download failed");
            summary.record_failure(url, &err);
        }
        Err(err) => {
            let err = ItemError::from(err);
            tracing::error!(error = %err, "download task failed");
            summary.record_failure("download task", &err);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn parses_links_and_bare_paths() {
        let from_link = ArticleRef::parse("https://takeuforward.org/data-structure/two-sum/").unwrap();
        assert_eq!(
            from_link,
            ArticleRef {
                category: "data-structure".to_owned(),
                slug: "two-sum".to_owned(),
                path: "data-structure/two-sum".to_owned(),
            }
        );
        assert_eq!(
            from_link.api_url("https://api.example.com/blog/"),
            "https://api.example.com/blog/article/data-structure/two-sum"
        );

        let nested = ArticleRef::parse("arrays/easy/Two Sum").unwrap();
        assert_eq!(nested.category, "arrays");
        assert_eq!(nested.slug, "Two_Sum");
        assert_eq!(nested.path, "arrays/easy/Two Sum");

        assert!(ArticleRef::parse("https://site.example/").is_none());
        assert!(ArticleRef::parse("mailto:someone@example.com").is_none());
    }

    #[test]
    fn listing_accepts_arrays_and_wrapped_objects() {
        let plain = json!(["arrays/two-sum", " ", {"post_link": "https://site/strings/rev"}]);
        assert_eq!(
            identifiers_from_listing(&plain),
            vec!["arrays/two-sum", "https://site/strings/rev"]
        );

        let wrapped = json!({"data": [{"path": "a/b"}, {"slug": "c/d"}, 3]});
        assert_eq!(identifiers_from_listing(&wrapped), vec!["a/b", "c/d"]);

        assert!(identifiers_from_listing(&json!({"other": []})).is_empty());
    }

    #[test]
    fn duplicates_are_skipped_and_unusable_identifiers_fail() {
        let ids = vec![
            "https://site/arrays/two-sum".to_owned(),
            "arrays/two-sum".to_owned(),
            "///".to_owned(),
            "arrays/three-sum".to_owned(),
        ];
        let mut summary = RunSummary::new("download");
        let refs = article_refs(&ids, &mut summary);
        assert_eq!(
            refs.iter().map(|r| r.slug.as_str()).collect::<Vec<_>>(),
            vec!["two-sum", "three-sum"]
        );
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.failures[0].item, "///");
        assert_eq!(summary.failures[0].kind, FailureKind::Parse);
    }

    #[tokio::test]
    async fn panicked_task_is_recorded_and_siblings_still_count() {
        let mut pool = WorkerPool::<DownloadOutcome>::new(2);
        pool.spawn(async {
            (
                "https://api.example/article/a/ok".to_owned(),
                PathBuf::from("a/ok.json"),
                Ok(()),
            )
        });
        pool.spawn(async {
            if true {
                panic!("worker blew up");
            }
            (String::new(), PathBuf::new(), Ok(()))
        });

        let mut summary = RunSummary::new("download");
        for joined in pool.join_all().await {
            record_download(&mut summary, joined);
        }

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.failures[0].kind, FailureKind::Task);
        assert_eq!(summary.failures[0].item, "download task");
    }
}
