use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};

use anyhow::Context as _;

use crate::cli::RenderArgs;
use crate::config::RenderConfig;
use crate::content;
use crate::error::ItemError;
use crate::fetch::{HttpClient, HttpOptions};
use crate::formats::ArticleRecord;
use crate::html::escape;
use crate::localize::{AssetCache, CACHE_DIR_NAME, Localizer};
use crate::report::RunSummary;
use crate::retry::RetryPolicy;
use crate::store;
use crate::template::Template;

pub const INDEX_FILE: &str = "index.html";
const UNGROUPED: &str = "Articles";

/// One article after rendering (and localization, when enabled).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub path: PathBuf,
    pub html: String,
    pub assets: BTreeSet<PathBuf>,
}

#[derive(Debug)]
pub struct SiteReport {
    pub pages: Vec<RenderedPage>,
    pub index: PathBuf,
    pub articles: RunSummary,
    pub assets: Option<RunSummary>,
}

impl SiteReport {
    pub fn summaries(self) -> Vec<RunSummary> {
        std::iter::once(self.articles).chain(self.assets).collect()
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    group: String,
    title: String,
    href: String,
}

pub async fn run(args: RenderArgs) -> anyhow::Result<Vec<RunSummary>> {
    let config = RenderConfig::from_args(&args)?;
    tracing::debug!(?config, "render config");
    let report = render_site(&config).await?;
    tracing::info!(
        pages = report.pages.len(),
        index = %report.index.display(),
        "site ready"
    );
    Ok(report.summaries())
}

/// Template substitution over a tidied copy of the record.
pub fn render_article(template: &Template, record: &ArticleRecord) -> String {
    let tidied = ArticleRecord {
        content: content::tidy(&record.content),
        ..record.clone()
    };
    template.render(&tidied)
}

pub async fn render_site(config: &RenderConfig) -> anyhow::Result<SiteReport> {
    if !config.content_dir.is_dir() {
        return Err(ItemError::NotFound(config.content_dir.clone()).into());
    }
    let template = Template::load(&config.template_file).context("load template")?;

    let mut localization = if config.skip_localize {
        None
    } else {
        let client = HttpClient::new(&HttpOptions {
            verify_tls: config.verify_tls,
            ..HttpOptions::default()
        })?;
        let localizer = Localizer::new(client, RetryPolicy::default(), &config.assets_dir);
        let cache = AssetCache::load(config.output_dir.join(CACHE_DIR_NAME));
        Some((localizer, cache, RunSummary::new("assets")))
    };

    let sources = store::list_files_recursively_sorted(&config.content_dir, "json")
        .with_context(|| format!("scan articles: {}", config.content_dir.display()))?;
    if sources.is_empty() {
        tracing::warn!(dir = %config.content_dir.display(), "no article files found");
    }

    let mut articles = RunSummary::new("render");
    // A later article with the same output path supersedes the earlier slot.
    let mut rendered: Vec<Option<(IndexEntry, RenderedPage)>> = Vec::new();
    let mut slot_by_path: HashMap<PathBuf, usize> = HashMap::new();

    for source in sources {
        let item = source.display().to_string();
        let record = match read_record(&source) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(error = %err, "skipping article");
                articles.record_failure(item, &err);
                continue;
            }
        };

        let rel_dir = source
            .parent()
            .and_then(|dir| dir.strip_prefix(&config.content_dir).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let page_dir = config.output_dir.join(&rel_dir);
        let path = page_dir.join(format!("{}.html", page_name(&record, &source)));

        let mut html = render_article(&template, &record);
        let mut assets = BTreeSet::new();
        if let Some((localizer, cache, summary)) = localization.as_mut() {
            let outcome = localizer.localize(&html, &page_dir, cache).await;
            summary.succeeded += outcome.localized;
            for failure in outcome.failures {
                summary.record(failure);
            }
            html = outcome.html;
            assets = outcome.local_paths;
        }

        if let Err(err) = store::write_atomic(&path, html.as_bytes()) {
            let err = ItemError::write(&path, err);
            tracing::warn!(error = %err, "could not write page");
            articles.record_failure(item, &err);
            continue;
        }
        tracing::info!(page = %path.display(), "rendered article");
        articles.record_success();

        let entry = IndexEntry {
            group: group_name(&record, &rel_dir),
            title: if record.title.trim().is_empty() {
                page_name(&record, &source)
            } else {
                record.title.clone()
            },
            href: relative_href(&config.output_dir, &path),
        };
        if let Some(previous) = slot_by_path.insert(path.clone(), rendered.len()) {
            tracing::warn!(
                page = %path.display(),
                source = %source.display(),
                "slug collision; later article replaces the earlier one"
            );
            rendered[previous] = None;
        }
        rendered.push(Some((entry, RenderedPage { path, html, assets })));
    }

    let index = config.output_dir.join(INDEX_FILE);
    let (entries, pages): (Vec<_>, Vec<_>) = rendered.into_iter().flatten().unzip();
    store::write_atomic(&index, render_index(&entries).as_bytes())
        .with_context(|| format!("write index: {}", index.display()))?;
    tracing::info!(index = %index.display(), articles = entries.len(), "wrote index");

    let assets = match localization {
        Some((_, cache, summary)) => {
            if let Err(err) = cache.save() {
                tracing::warn!(error = %format!("{err:#}"), "could not save asset cache index");
            }
            Some(summary)
        }
        None => None,
    };

    Ok(SiteReport {
        pages,
        index,
        articles,
        assets,
    })
}

fn read_record(path: &Path) -> Result<ArticleRecord, ItemError> {
    let raw = std::fs::read_to_string(path).map_err(|err| ItemError::read(path, err))?;
    serde_json::from_str(&raw).map_err(|source| ItemError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Output file stem: the sanitized slug, else the source file stem.
fn page_name(record: &ArticleRecord, source: &Path) -> String {
    let slug = store::sanitize_segment(&record.slug);
    if !slug.is_empty() {
        return slug;
    }
    let stem = source
        .file_stem()
        .map(|s| store::sanitize_segment(&s.to_string_lossy()))
        .unwrap_or_default();
    if stem.is_empty() {
        "article".to_owned()
    } else {
        stem
    }
}

fn group_name(record: &ArticleRecord, rel_dir: &Path) -> String {
    if let Some(topic) = record.primary_topic()
        && !topic.topic_title.trim().is_empty()
    {
        return topic.topic_title.trim().to_owned();
    }
    rel_dir
        .components()
        .find_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .unwrap_or_else(|| UNGROUPED.to_owned())
}

fn relative_href(root: &Path, page: &Path) -> String {
    let rel = page.strip_prefix(root).unwrap_or(page);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

const INDEX_STYLE: &str = r#"
    :root { color-scheme: dark; }
    body { margin: 0; padding: 2rem 1rem; background: #0f1115; color: #e6e6e6;
           font-family: system-ui, -apple-system, "Segoe UI", sans-serif; line-height: 1.5; }
    main { max-width: 56rem; margin: 0 auto; }
    h1 { font-size: 1.8rem; margin-bottom: 1.5rem; }
    h2 { font-size: 1.2rem; margin: 2rem 0 0.5rem; color: #9ecbff;
         border-bottom: 1px solid #2a2f3a; padding-bottom: 0.25rem; }
    ul { list-style: none; padding: 0; margin: 0; }
    li { padding: 0.3rem 0; }
    a { color: #e6e6e6; text-decoration: none; }
    a:hover { color: #9ecbff; text-decoration: underline; }
"#;

fn render_index(entries: &[IndexEntry]) -> String {
    let mut groups: Vec<(&str, Vec<&IndexEntry>)> = Vec::new();
    for entry in entries {
        match groups.iter_mut().find(|(name, _)| *name == entry.group) {
            Some((_, items)) => items.push(entry),
            None => groups.push((entry.group.as_str(), vec![entry])),
        }
    }

    let mut body = String::new();
    for (name, items) in groups {
        body.push_str(&format!("    <section>\n      <h2>{}</h2>\n      <ul>\n", escape(name)));
        for item in items {
            body.push_str(&format!(
                "        <li><a href=\"{}\">{}</a></li>\n",
                escape(&item.href),
                escape(&item.title)
            ));
        }
        body.push_str("      </ul>\n    </section>\n");
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n  <meta charset=\"utf-8\">\n  \
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n  \
<title>Articles</title>\n  <style>{INDEX_STYLE}  </style>\n</head>\n<body>\n  <main>\n    \
<h1>Articles</h1>\n{body}  </main>\n</body>\n</html>\n"
    )
}
