use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::Context as _;
use regex::{Captures, Regex};

use crate::cli::ExpandLinksArgs;
use crate::error::ItemError;
use crate::fetch::{HttpClient, HttpOptions};
use crate::report::{Failure, RunSummary};
use crate::retry::{RetryPolicy, retry};
use crate::store;
use crate::trackers::{read_json_text, sibling_output};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandOutcome {
    pub text: String,
    pub expanded: HashMap<String, String>,
    pub failures: Vec<Failure>,
}

#[derive(Debug, Clone)]
pub struct Expander {
    client: HttpClient,
    retry: RetryPolicy,
    pattern: Regex,
}

/// Matches links on any of `hosts`, up to the next quote or whitespace.
pub fn short_link_pattern(hosts: &[String]) -> anyhow::Result<Regex> {
    let hosts = hosts
        .iter()
        .map(|h| h.trim())
        .filter(|h| !h.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>();
    if hosts.is_empty() {
        anyhow::bail!("no short-link hosts given");
    }
    let pattern = format!(r#"https?://(?:{})/[^"\s]*"#, hosts.join("|"));
    Regex::new(&pattern).with_context(|| format!("build short-link pattern: {pattern}"))
}

impl Expander {
    pub fn new(client: HttpClient, retry: RetryPolicy, hosts: &[String]) -> anyhow::Result<Self> {
        Ok(Self {
            client,
            retry,
            pattern: short_link_pattern(hosts)?,
        })
    }

    /// Distinct short links in order of first appearance.
    pub fn find_links<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        self.pattern
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|link| seen.insert(*link))
            .collect()
    }

    /// Resolves every short link once. Links that cannot be resolved stay as they are.
    pub async fn expand_document(&self, text: &str) -> ExpandOutcome {
        let mut expanded = HashMap::new();
        let mut failures = Vec::new();

        for link in self.find_links(text) {
            let client = &self.client;
            match retry(self.retry, link, || client.resolve_redirects(link)).await {
                Ok(target) => {
                    tracing::info!(link, target = %target, "expanded short link");
                    expanded.insert(link.to_owned(), target);
                }
                Err(err) => {
                    let err = ItemError::from(err);
                    tracing::warn!(link, error = %err, "could not expand short link; keeping it");
                    failures.push(Failure::new(link, &err));
                }
            }
        }

        let text = self
            .pattern
            .replace_all(text, |caps: &Captures<'_>| {
                expanded
                    .get(&caps[0])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_owned())
            })
            .into_owned();

        ExpandOutcome {
            text,
            expanded,
            failures,
        }
    }
}

pub async fn run(args: ExpandLinksArgs) -> anyhow::Result<Vec<RunSummary>> {
    let text = read_json_text(&args.input)?;
    let client = HttpClient::new(&HttpOptions {
        timeout: DEFAULT_TIMEOUT,
        ..HttpOptions::default()
    })?;
    let expander = Expander::new(client, RetryPolicy::default(), &args.hosts)?;

    let outcome = expander.expand_document(&text).await;
    let output = sibling_output(&args.input, "expanded");
    store::write_atomic(&output, outcome.text.as_bytes())
        .with_context(|| format!("write output: {}", output.display()))?;
    tracing::info!(output = %output.display(), "wrote expanded file");

    let mut summary = RunSummary::new("expand-links");
    summary.succeeded = outcome.expanded.len();
    for failure in outcome.failures {
        summary.record(failure);
    }
    Ok(vec![summary])
}
