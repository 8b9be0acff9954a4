use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Emit debug logs (same as `RUST_LOG=debug`).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Render article JSON files into standalone HTML pages plus an index.
    Render(RenderArgs),
    /// Download remote assets referenced by an existing HTML tree and rewrite the references.
    Localize(LocalizeArgs),
    /// Fetch article JSON bodies from the remote API.
    Download(DownloadArgs),
    /// Strip tracking query parameters from every URL in a curriculum file.
    CleanTrackers(CleanTrackersArgs),
    /// Replace short links in a curriculum file with their redirect targets.
    ExpandLinks(ExpandLinksArgs),
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// YAML render config; flags below override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory containing per-topic folders of article JSON files.
    #[arg(long, short = 'c')]
    pub content_dir: Option<PathBuf>,

    /// Destination root for generated HTML.
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,

    /// HTML template with `{TITLE}`, `{CONTENT}`, ... placeholders.
    #[arg(long, short = 't', alias = "template")]
    pub template_file: Option<PathBuf>,

    /// Skip asset localization after rendering.
    #[arg(long)]
    pub skip_localize: bool,

    /// Name of the per-page assets folder.
    #[arg(long)]
    pub assets_name: Option<String>,

    /// Do not verify TLS certificates when fetching assets.
    #[arg(long)]
    pub no_verify_ssl: bool,
}

#[derive(Debug, Args)]
pub struct LocalizeArgs {
    /// Root folder scanned recursively for `.html` files.
    pub root: PathBuf,

    /// Name of the per-page assets folder.
    #[arg(long, default_value = "assets")]
    pub assets_name: String,

    /// Delete the persisted asset cache before running.
    #[arg(long)]
    pub clear_cache: bool,

    /// Only report which remote references would be localized. Nothing is fetched or written.
    #[arg(long, conflicts_with = "clear_cache")]
    pub dry_run: bool,

    /// Do not verify TLS certificates.
    #[arg(long)]
    pub no_verify_ssl: bool,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Output directory for article JSON files.
    #[arg(long, short = 'o', default_value = "content/articles")]
    pub out: PathBuf,

    /// Maximum concurrent article fetches.
    #[arg(long, short = 'w', default_value_t = crate::download::DEFAULT_WORKERS)]
    pub workers: usize,

    /// Base URL of the article API.
    #[arg(long, default_value = crate::download::DEFAULT_API_BASE)]
    pub api_base: String,

    /// Endpoint returning the article identifier list (default: `<api-base>/articles`).
    #[arg(long, conflicts_with = "curriculum")]
    pub list_url: Option<String>,

    /// Collect article links from a local curriculum file instead of the list endpoint.
    #[arg(long)]
    pub curriculum: Option<PathBuf>,

    /// Leave articles that already exist on disk untouched.
    #[arg(long)]
    pub skip_existing: bool,
}

#[derive(Debug, Args)]
pub struct CleanTrackersArgs {
    /// Curriculum JSON file; output is written next to it with a `_cleaned` suffix.
    pub input: PathBuf,

    /// Additional query parameter names to strip.
    #[arg(long = "param")]
    pub extra_params: Vec<String>,

    /// Only strip tracking parameters; keep queries on strip-all hosts and leave YouTube
    /// links as they are.
    #[arg(long)]
    pub params_only: bool,
}

#[derive(Debug, Args)]
pub struct ExpandLinksArgs {
    /// Curriculum JSON file; output is written next to it with an `_expanded` suffix.
    pub input: PathBuf,

    /// Short-link hosts to expand.
    #[arg(long = "host", default_values_t = vec!["bit.ly".to_owned()])]
    pub hosts: Vec<String>,
}
