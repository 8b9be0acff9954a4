use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context as _;
use regex::{Captures, Regex};
use url::{Url, form_urlencoded};

use crate::cli::CleanTrackersArgs;
use crate::error::ItemError;
use crate::report::RunSummary;
use crate::store;

pub const DEFAULT_TRACKING_PARAMS: [&str; 11] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "gclid",
    "fbclid",
    "msclkid",
    "mc_cid",
    "mc_eid",
    "_ga",
];

/// Hosts whose links never need a query or fragment.
pub const STRIP_ALL_HOSTS: [&str; 3] = ["geeksforgeeks.org", "codingninjas.com", "leetcode.com"];

static QUOTED_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(https?://[^\s"]+)""#).expect("valid quoted url regex"));

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    params: BTreeSet<String>,
    strip_hosts: Vec<String>,
    /// Strip-all hosts and YouTube canonicalization apply.
    site_rules: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            params: DEFAULT_TRACKING_PARAMS.iter().map(|p| (*p).to_owned()).collect(),
            strip_hosts: STRIP_ALL_HOSTS.iter().map(|h| (*h).to_owned()).collect(),
            site_rules: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanOutcome {
    pub text: String,
    /// Original URL → cleaned URL, for every URL that changed.
    pub changed: HashMap<String, String>,
}

impl TrackerConfig {
    pub fn with_extra_params<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params
            .extend(extra.into_iter().map(Into::into).filter(|p| !p.is_empty()));
        self
    }

    /// Only tracking parameters are removed; every other part of a URL is kept.
    pub fn params_only(mut self, params_only: bool) -> Self {
        self.site_rules = !params_only;
        self
    }

    pub fn is_tracking_param(&self, name: &str) -> bool {
        self.params.contains(name)
    }

    /// Returns the cleaned URL, or `None` if nothing changes or `raw` is not a URL.
    pub fn clean_url(&self, raw: &str) -> Option<String> {
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(err) => {
                tracing::debug!(url = raw, error = %err, "not a parseable url; leaving as is");
                return None;
            }
        };
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();

        let cleaned = if self.site_rules
            && self.strip_hosts.iter().any(|site| host_matches(&host, site))
        {
            strip_query_and_fragment(raw).to_owned()
        } else if let Some(canonical) = self
            .site_rules
            .then(|| canonical_youtube(&url, &host))
            .flatten()
        {
            canonical
        } else {
            self.remove_tracking_params(raw)
        };

        (cleaned != raw).then_some(cleaned)
    }

    /// Drops tracking pairs from the query. Kept pairs keep their exact bytes unless
    /// their value is a URL that itself needed cleaning.
    fn remove_tracking_params(&self, raw: &str) -> String {
        let (before_fragment, fragment) = match raw.split_once('#') {
            Some((head, frag)) => (head, Some(frag)),
            None => (raw, None),
        };
        let Some((base, query)) = before_fragment.split_once('?') else {
            return raw.to_owned();
        };

        let mut kept = Vec::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let Some((key, value)) = form_urlencoded::parse(pair.as_bytes()).next() else {
                continue;
            };
            if self.is_tracking_param(&key) {
                continue;
            }
            let nested = (value.starts_with("http://") || value.starts_with("https://"))
                .then(|| self.clean_url(&value))
                .flatten();
            match nested {
                Some(cleaned) => {
                    let raw_key = pair.split_once('=').map_or(pair, |(k, _)| k);
                    let encoded = form_urlencoded::byte_serialize(cleaned.as_bytes()).collect::<String>();
                    kept.push(format!("{raw_key}={encoded}"));
                }
                None => kept.push(pair.to_owned()),
            }
        }

        let mut out = base.to_owned();
        if !kept.is_empty() {
            out.push('?');
            out.push_str(&kept.join("&"));
        }
        if let Some(fragment) = fragment {
            out.push('#');
            out.push_str(fragment);
        }
        out
    }

    /// Rewrites every quoted URL in `text`; anything outside quotes is left alone.
    pub fn clean_document(&self, text: &str) -> CleanOutcome {
        let mut changed = HashMap::new();
        for caps in QUOTED_URL.captures_iter(text) {
            let original = &caps[1];
            if changed.contains_key(original) {
                continue;
            }
            if let Some(cleaned) = self.clean_url(original) {
                tracing::debug!(original, cleaned = %cleaned, "cleaned url");
                changed.insert(original.to_owned(), cleaned);
            }
        }

        let text = QUOTED_URL
            .replace_all(text, |caps: &Captures<'_>| match changed.get(&caps[1]) {
                Some(cleaned) => format!("\"{cleaned}\""),
                None => caps[0].to_owned(),
            })
            .into_owned();

        CleanOutcome { text, changed }
    }
}

fn host_matches(host: &str, site: &str) -> bool {
    host == site
        || host
            .strip_suffix(site)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn strip_query_and_fragment(raw: &str) -> &str {
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    &raw[..end]
}

/// `https://www.youtube.com/watch?v=<id>[&t=<t>]` for watch and youtu.be links.
fn canonical_youtube(url: &Url, host: &str) -> Option<String> {
    let video_id = if host_matches(host, "youtube.com") {
        url.query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())
    } else if host_matches(host, "youtu.be") {
        url.path_segments()
            .and_then(|mut segments| segments.next())
            .map(str::to_owned)
    } else {
        return None;
    };
    let video_id = video_id.filter(|id| !id.is_empty())?;
    let timestamp = url
        .query_pairs()
        .find(|(k, _)| k == "t")
        .map(|(_, t)| t.into_owned())
        .filter(|t| !t.is_empty());

    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("v", &video_id);
    if let Some(t) = &timestamp {
        query.append_pair("t", t);
    }
    Some(format!("https://www.youtube.com/watch?{}", query.finish()))
}

/// `dir/a2z.json` → `dir/a2z_<suffix>.json`.
pub fn sibling_output(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{suffix}"),
    };
    input.with_file_name(name)
}

/// Reads `input` and checks it is JSON; the text itself is what gets rewritten.
pub fn read_json_text(input: &Path) -> anyhow::Result<String> {
    if !input.is_file() {
        return Err(ItemError::NotFound(input.to_path_buf()).into());
    }
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("read input: {}", input.display()))?;
    serde_json::from_str::<serde_json::Value>(&text).map_err(|source| ItemError::Parse {
        path: input.to_path_buf(),
        source,
    })?;
    Ok(text)
}

pub fn run(args: CleanTrackersArgs) -> anyhow::Result<Vec<RunSummary>> {
    let text = read_json_text(&args.input)?;
    let config = TrackerConfig::default()
        .with_extra_params(args.extra_params)
        .params_only(args.params_only);

    let outcome = config.clean_document(&text);
    let output = sibling_output(&args.input, "cleaned");
    store::write_atomic(&output, outcome.text.as_bytes())
        .with_context(|| format!("write output: {}", output.display()))?;
    tracing::info!(
        output = %output.display(),
        cleaned = outcome.changed.len(),
        "wrote cleaned file"
    );

    let mut summary = RunSummary::new("clean-trackers");
    summary.succeeded = outcome.changed.len();
    Ok(vec![summary])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(raw: &str) -> Option<String> {
        TrackerConfig::default().clean_url(raw)
    }

    #[test]
    fn removes_only_tracking_params_and_keeps_bytes() {
        assert_eq!(
            clean("https://example.com/p?q=a%20b&utm_source=news&page=2&fbclid=x#top").as_deref(),
            Some("https://example.com/p?q=a%20b&page=2#top")
        );
        assert_eq!(
            clean("https://example.com/p?utm_medium=email").as_deref(),
            Some("https://example.com/p")
        );
        assert_eq!(clean("https://example.com/p?q=1&flag"), None);
        assert_eq!(clean("not a url"), None);
    }

    #[test]
    fn strip_hosts_lose_query_and_fragment() {
        assert_eq!(
            clean("https://www.geeksforgeeks.org/two-sum/?ref=lbp#approach").as_deref(),
            Some("https://www.geeksforgeeks.org/two-sum/")
        );
        assert_eq!(
            clean("https://leetcode.com/problems/two-sum/description/?envType=study").as_deref(),
            Some("https://leetcode.com/problems/two-sum/description/")
        );
        assert_eq!(
            clean("https://notleetcode.com/x?ref=1"),
            None,
            "suffix match must respect label boundaries"
        );
    }

    #[test]
    fn youtube_links_are_canonicalized() {
        assert_eq!(
            clean("https://www.youtube.com/watch?v=abc123&list=PL1&t=42s&si=tracking").as_deref(),
            Some("https://www.youtube.com/watch?v=abc123&t=42s")
        );
        assert_eq!(
            clean("https://youtu.be/abc123?si=tracking").as_deref(),
            Some("https://www.youtube.com/watch?v=abc123")
        );
        assert_eq!(clean("https://www.youtube.com/watch?v=abc123"), None);
        assert_eq!(
            clean("https://www.youtube.com/@channel?utm_source=x").as_deref(),
            Some("https://www.youtube.com/@channel")
        );
    }

    #[test]
    fn nested_urls_are_cleaned_recursively() {
        let raw = "https://out.example/r?to=https%3A%2F%2Fex.com%2F%3Futm_source%3Dx%26id%3D1&k=v";
        assert_eq!(
            clean(raw).as_deref(),
            Some("https://out.example/r?to=https%3A%2F%2Fex.com%2F%3Fid%3D1&k=v")
        );
    }

    #[test]
    fn extra_params_extend_the_default_set() {
        let config = TrackerConfig::default().with_extra_params(["ref"]);
        assert_eq!(
            config.clean_url("https://example.com/?ref=home&id=3").as_deref(),
            Some("https://example.com/?id=3")
        );
        assert!(config.is_tracking_param("gclid"));
    }

    #[test]
    fn params_only_keeps_site_specific_parts() {
        let config = TrackerConfig::default().params_only(true);
        assert_eq!(
            config
                .clean_url("https://leetcode.com/problems/two-sum/?envType=study&utm_source=x#tab")
                .as_deref(),
            Some("https://leetcode.com/problems/two-sum/?envType=study#tab")
        );
        assert_eq!(
            config
                .clean_url("https://www.youtube.com/watch?v=abc123&list=PL1&utm_medium=web")
                .as_deref(),
            Some("https://www.youtube.com/watch?v=abc123&list=PL1")
        );
        assert_eq!(config.clean_url("https://youtu.be/abc123?si=share"), None);
    }

    #[test]
    fn document_rewrites_only_quoted_urls() {
        let text = r#"{"a":"https://x.example/?utm_source=s","b":"see https://x.example/?utm_source=s","c":"https://x.example/?utm_source=s"}"#;
        let outcome = TrackerConfig::default().clean_document(text);
        assert_eq!(
            outcome.text,
            r#"{"a":"https://x.example/","b":"see https://x.example/?utm_source=s","c":"https://x.example/"}"#
        );
        assert_eq!(outcome.changed.len(), 1);
    }

    #[test]
    fn sibling_output_keeps_extension() {
        assert_eq!(
            sibling_output(Path::new("data/a2z.json"), "cleaned"),
            PathBuf::from("data/a2z_cleaned.json")
        );
        assert_eq!(
            sibling_output(Path::new("sheet"), "expanded"),
            PathBuf::from("sheet_expanded")
        );
    }
}
