use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context as _;
use regex::Regex;
use sha2::{Digest as _, Sha256};
use url::Url;

use crate::cli::LocalizeArgs;
use crate::error::ItemError;
use crate::fetch::{HttpClient, HttpOptions};
use crate::html::{self, Attr, StartTag};
use crate::report::{Failure, RunSummary};
use crate::retry::{RetryPolicy, retry};
use crate::store;

pub const DEFAULT_ASSETS_DIR: &str = "assets";
pub const CACHE_DIR_NAME: &str = ".asset_cache";
const CACHE_INDEX_FILE: &str = "index.json";

static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'"#,
        r#"|&(?:quot|#0*34|#x0*22);(.*?)&(?:quot|#0*34|#x0*22);"#,
        r#"|&(?:apos|#0*39|#x0*27);(.*?)&(?:apos|#0*39|#x0*27);"#,
        r#"|([^)"'\s]*))\s*\)"#,
    ))
    .expect("valid css url regex")
});

/// A remote reference inside a document: the exact byte range of the URL text and the
/// absolute URL it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub range: Range<usize>,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizeOutcome {
    pub html: String,
    /// Distinct remote URLs rewritten to local copies.
    pub localized: usize,
    /// Distinct remote URLs left in place because they could not be fetched or stored.
    pub failures: Vec<Failure>,
    /// Local files the rewritten document now references.
    pub local_paths: BTreeSet<PathBuf>,
}

impl LocalizeOutcome {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Run-scoped memo from remote URL to a file in the store directory. Each distinct URL
/// is fetched at most once per run, failures included. The index can be persisted so
/// later runs reuse earlier downloads.
#[derive(Debug)]
pub struct AssetCache {
    store_dir: PathBuf,
    entries: BTreeMap<String, String>,
    failed: HashMap<String, Failure>,
    names: HashMap<String, String>,
    fetches: usize,
}

impl AssetCache {
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
            entries: BTreeMap::new(),
            failed: HashMap::new(),
            names: HashMap::new(),
            fetches: 0,
        }
    }

    /// Loads `index.json` from `store_dir` if present. A corrupt index starts fresh.
    pub fn load(store_dir: impl Into<PathBuf>) -> Self {
        let mut cache = Self::new(store_dir);
        let index_path = cache.index_path();
        if !index_path.is_file() {
            return cache;
        }

        let parsed = std::fs::read_to_string(&index_path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| {
                serde_json::from_str::<BTreeMap<String, String>>(&raw).map_err(Into::into)
            });
        match parsed {
            Ok(entries) => {
                for (url, name) in &entries {
                    cache.names.insert(name.clone(), url.clone());
                }
                tracing::info!(entries = entries.len(), "loaded asset cache index");
                cache.entries = entries;
            }
            Err(err) => {
                tracing::warn!(
                    path = %index_path.display(),
                    error = %err,
                    "could not load asset cache index; starting fresh"
                );
            }
        }
        cache
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let index_path = self.index_path();
        let json = serde_json::to_vec_pretty(&self.entries).context("serialize asset index")?;
        store::write_atomic(&index_path, &json)
            .with_context(|| format!("write asset index: {}", index_path.display()))
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Network fetches attempted through this cache.
    pub fn fetch_count(&self) -> usize {
        self.fetches
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn index_path(&self) -> PathBuf {
        self.store_dir.join(CACHE_INDEX_FILE)
    }

    fn reserve_name(&mut self, url: &Url) -> String {
        let base = asset_file_name(url);
        let (stem, ext) = match base.rsplit_once('.') {
            Some((stem, ext)) => (stem.to_owned(), format!(".{ext}")),
            None => (base.clone(), String::new()),
        };

        let mut candidate = base;
        let mut n = 2;
        while let Some(owner) = self.names.get(&candidate) {
            if owner == url.as_str() {
                break;
            }
            candidate = format!("{stem}-{n}{ext}");
            n += 1;
        }
        self.names.insert(candidate.clone(), url.as_str().to_owned());
        candidate
    }

    /// Returns the stored copy of `url`, downloading it on first use.
    pub async fn resolve(
        &mut self,
        url: &str,
        client: &HttpClient,
        policy: RetryPolicy,
    ) -> Result<PathBuf, Failure> {
        if let Some(failure) = self.failed.get(url) {
            return Err(failure.clone());
        }
        if let Some(name) = self.entries.get(url) {
            let path = self.store_dir.join(name);
            if path.is_file() {
                return Ok(path);
            }
            tracing::debug!(url, path = %path.display(), "cached asset missing on disk; refetching");
        }

        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(err) => {
                let failure = Failure {
                    item: url.to_owned(),
                    kind: crate::error::FailureKind::Parse,
                    message: format!("invalid asset url: {err}"),
                };
                self.failed.insert(url.to_owned(), failure.clone());
                return Err(failure);
            }
        };
        let name = self.reserve_name(&parsed);
        let dest = self.store_dir.join(&name);

        self.fetches += 1;
        tracing::info!(url, "downloading asset");
        let fetched = retry(policy, url, move || client.get_bytes(url)).await;

        let stored = fetched
            .map_err(ItemError::from)
            .and_then(|bytes| {
                store::write_atomic(&dest, &bytes).map_err(|err| ItemError::write(&dest, err))
            });
        match stored {
            Ok(()) => {
                tracing::debug!(url, file = %name, "cached asset");
                self.entries.insert(url.to_owned(), name);
                Ok(dest)
            }
            Err(err) => {
                tracing::warn!(url, error = %err, "asset download failed; keeping remote reference");
                let failure = Failure::new(url, &err);
                self.failed.insert(url.to_owned(), failure.clone());
                Err(failure)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Localizer {
    client: HttpClient,
    retry: RetryPolicy,
    assets_dir: String,
}

impl Localizer {
    pub fn new(client: HttpClient, retry: RetryPolicy, assets_dir: impl Into<String>) -> Self {
        Self {
            client,
            retry,
            assets_dir: assets_dir.into(),
        }
    }

    /// Copies every remote asset of `html` into `<page_dir>/<assets_dir>/` and points the
    /// references at the copies. References that fail keep their remote URL.
    pub async fn localize(
        &self,
        html: &str,
        page_dir: &Path,
        cache: &mut AssetCache,
    ) -> LocalizeOutcome {
        let refs = discover(html);
        let mut outcome = LocalizeOutcome::default();
        if refs.is_empty() {
            outcome.html = html.to_owned();
            return outcome;
        }

        let assets_dir = page_dir.join(&self.assets_dir);
        let mut replacements: HashMap<&str, Option<String>> = HashMap::new();

        for asset in &refs {
            if replacements.contains_key(asset.url.as_str()) {
                continue;
            }

            let local = match cache.resolve(&asset.url, &self.client, self.retry).await {
                Ok(stored) => self.place(&stored, &assets_dir, &asset.url),
                Err(failure) => Err(failure),
            };
            let replacement = match local {
                Ok((file_name, dest)) => {
                    outcome.localized += 1;
                    outcome.local_paths.insert(dest);
                    Some(format!("{}/{file_name}", self.assets_dir))
                }
                Err(failure) => {
                    outcome.failures.push(failure);
                    None
                }
            };
            replacements.insert(asset.url.as_str(), replacement);
        }

        outcome.html = splice(html, &refs, |url| {
            replacements.get(url).and_then(|r| r.as_deref())
        });
        outcome
    }

    fn place(&self, stored: &Path, assets_dir: &Path, url: &str) -> Result<(String, PathBuf), Failure> {
        let file_name = stored
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dest = assets_dir.join(&file_name);
        match store::copy_if_missing(stored, &dest) {
            Ok(_) => Ok((file_name, dest)),
            Err(err) => {
                let err = ItemError::write(&dest, err);
                tracing::warn!(url, error = %err, "could not place asset next to page");
                Err(Failure::new(url, &err))
            }
        }
    }
}

fn splice<'a>(
    html: &str,
    refs: &[AssetRef],
    replacement: impl Fn(&str) -> Option<&'a str>,
) -> String {
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    for asset in refs {
        let Some(local) = replacement(&asset.url) else {
            continue;
        };
        out.push_str(&html[cursor..asset.range.start]);
        out.push_str(local);
        cursor = asset.range.end;
    }
    out.push_str(&html[cursor..]);
    out
}

/// Finds remote asset references: image sources (including `srcset` and lazy-load
/// attributes), script sources, stylesheet links, and `url(...)` in inline styles and
/// `<style>` blocks. Results are in document order.
pub fn discover(html: &str) -> Vec<AssetRef> {
    let mut refs = Vec::new();

    for tag in html::start_tags(html) {
        for attr in &tag.attrs {
            match (tag.name.as_str(), attr.name.as_str()) {
                ("img" | "source", "src" | "data-src" | "data-original") | ("script", "src") => {
                    push_plain(&mut refs, &attr.value, attr.value_range.start);
                }
                ("img" | "source", "srcset" | "data-srcset") => push_srcset(&mut refs, attr),
                ("link", "href") if is_stylesheet(&tag) => {
                    push_plain(&mut refs, &attr.value, attr.value_range.start);
                }
                (_, "style") => push_css(&mut refs, &attr.value, attr.value_range.start),
                _ => {}
            }
        }

        if tag.name == "style" {
            let body = html::raw_text_body(html, &tag);
            push_css(&mut refs, &html[body.clone()], body.start);
        }
    }

    refs.sort_by_key(|r| r.range.start);
    refs
}

/// Returns the absolute URL for a remote reference, or `None` for local paths and
/// `data:` URIs. Protocol-relative references are treated as https.
pub fn remote_url(raw: &str) -> Option<Url> {
    let raw = html::decode_attr_entities(raw.trim());
    if raw.is_empty() || raw.to_ascii_lowercase().starts_with("data:") {
        return None;
    }
    let candidate = match raw.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => raw,
    };
    let url = Url::parse(&candidate).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Deterministic local name: sanitized last path segment plus a short hash of the URL.
pub fn asset_file_name(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let (stem, ext) = match last.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 8
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            (stem, Some(ext.to_ascii_lowercase()))
        }
        _ => (last, None),
    };

    let mut stem = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(48)
        .collect::<String>();
    if stem.is_empty() {
        stem.push_str("file");
    }

    let digest = hex::encode(Sha256::digest(url.as_str().as_bytes()));
    let hash = &digest[..12];
    match ext {
        Some(ext) => format!("{stem}_{hash}.{ext}"),
        None => format!("{stem}_{hash}"),
    }
}

fn is_stylesheet(tag: &StartTag) -> bool {
    tag.attr("rel").is_some_and(|rel| {
        rel.value
            .split_ascii_whitespace()
            .any(|token| token.eq_ignore_ascii_case("stylesheet"))
    })
}

fn push_plain(refs: &mut Vec<AssetRef>, value: &str, offset: usize) {
    let lead = value.len() - value.trim_start().len();
    let trimmed = value.trim();
    if let Some(url) = remote_url(trimmed) {
        let start = offset + lead;
        refs.push(AssetRef {
            range: start..start + trimmed.len(),
            url: url.to_string(),
        });
    }
}

fn push_srcset(refs: &mut Vec<AssetRef>, attr: &Attr) {
    let mut pos = 0;
    for candidate in attr.value.split(',') {
        let lead = candidate.len() - candidate.trim_start().len();
        let body = candidate.trim_start();
        let url_len = body.find(char::is_whitespace).unwrap_or(body.len());
        push_plain(refs, &body[..url_len], attr.value_range.start + pos + lead);
        pos += candidate.len() + 1;
    }
}

fn push_css(refs: &mut Vec<AssetRef>, css: &str, offset: usize) {
    for caps in CSS_URL.captures_iter(css) {
        let Some(found) = (1..=5).find_map(|group| caps.get(group)) else {
            continue;
        };
        push_plain(refs, found.as_str(), offset + found.start());
    }
}

pub async fn run(args: LocalizeArgs) -> anyhow::Result<Vec<RunSummary>> {
    let root = args.root;
    if !root.is_dir() {
        return Err(ItemError::NotFound(root).into());
    }

    let pages = store::list_files_recursively_sorted(&root, "html")
        .with_context(|| format!("scan html files: {}", root.display()))?;
    if pages.is_empty() {
        tracing::warn!(root = %root.display(), "no .html files found; nothing to do");
    }
    if args.dry_run {
        return Ok(vec![dry_run(&pages)]);
    }

    let store_dir = root.join(CACHE_DIR_NAME);
    if args.clear_cache && store_dir.exists() {
        tracing::info!(path = %store_dir.display(), "clearing asset cache");
        std::fs::remove_dir_all(&store_dir)
            .with_context(|| format!("remove asset cache: {}", store_dir.display()))?;
    }
    let mut cache = AssetCache::load(&store_dir);

    let client = HttpClient::new(&HttpOptions {
        verify_tls: !args.no_verify_ssl,
        ..HttpOptions::default()
    })?;
    let localizer = Localizer::new(client, RetryPolicy::default(), args.assets_name);

    let mut summary = RunSummary::new("localize");
    for page in pages {
        let html = match std::fs::read_to_string(&page) {
            Ok(html) => html,
            Err(err) => {
                let err = ItemError::read(&page, err);
                tracing::warn!(error = %err, "skipping page");
                summary.record_failure(page.display().to_string(), &err);
                continue;
            }
        };

        let page_dir = page.parent().unwrap_or(root.as_path());
        let outcome = localizer.localize(&html, page_dir, &mut cache).await;
        summary.succeeded += outcome.localized;
        for failure in outcome.failures.iter().cloned() {
            summary.record(failure);
        }

        if outcome.html != html {
            if let Err(err) = store::write_atomic(&page, outcome.html.as_bytes()) {
                let err = ItemError::write(&page, err);
                tracing::warn!(error = %err, "could not save rewritten page");
                summary.record_failure(page.display().to_string(), &err);
                continue;
            }
            tracing::info!(page = %page.display(), assets = outcome.localized, "rewrote page");
        }
    }

    if let Err(err) = cache.save() {
        tracing::warn!(error = %format!("{err:#}"), "could not save asset cache index");
    }

    Ok(vec![summary])
}

/// Counts the distinct remote references of every page without touching the network
/// or the disk.
fn dry_run(pages: &[PathBuf]) -> RunSummary {
    let mut summary = RunSummary::new("localize (dry run)");
    for page in pages {
        let html = match std::fs::read_to_string(page) {
            Ok(html) => html,
            Err(err) => {
                let err = ItemError::read(page, err);
                tracing::warn!(error = %err, "skipping page");
                summary.record_failure(page.display().to_string(), &err);
                continue;
            }
        };

        let urls = discover(&html)
            .into_iter()
            .map(|asset| asset.url)
            .collect::<BTreeSet<_>>();
        for url in &urls {
            tracing::info!(page = %page.display(), url = %url, "would localize");
        }
        summary.succeeded += urls.len();
    }
    summary
}
