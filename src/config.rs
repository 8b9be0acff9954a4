use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

use crate::cli::RenderArgs;
use crate::error::ItemError;
use crate::localize::DEFAULT_ASSETS_DIR;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    pub content_dir: PathBuf,
    pub output_dir: PathBuf,
    pub template_file: PathBuf,
    pub skip_localize: bool,
    pub assets_dir: String,
    pub verify_tls: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("content/articles"),
            output_dir: PathBuf::from("public/articles"),
            template_file: PathBuf::from("templates/template.html"),
            skip_localize: false,
            assets_dir: DEFAULT_ASSETS_DIR.to_owned(),
            verify_tls: true,
        }
    }
}

impl RenderConfig {
    /// Reads a YAML config. Keys left out keep their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            return Err(ItemError::NotFound(path.to_path_buf()).into());
        }
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read render config: {}", path.display()))?;
        serde_yaml::from_str(&yaml)
            .with_context(|| format!("parse render config: {}", path.display()))
    }

    /// Config file (if any) first, then explicit flags on top.
    pub fn from_args(args: &RenderArgs) -> anyhow::Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(dir) = &args.content_dir {
            config.content_dir = dir.clone();
        }
        if let Some(dir) = &args.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(file) = &args.template_file {
            config.template_file = file.clone();
        }
        if let Some(name) = &args.assets_name {
            config.assets_dir = name.clone();
        }
        config.skip_localize |= args.skip_localize;
        if args.no_verify_ssl {
            config.verify_tls = false;
        }

        Ok(config)
    }
}
