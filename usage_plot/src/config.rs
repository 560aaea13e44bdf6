use std::path::Path;

use anyhow::{Context as _, Result};
use config::{Config, ConfigError, Environment, File};
use log::info;
use serde::Deserialize;

const DEFAULT_DPI: u32 = 150;
const DEFAULT_FONT_FAMILY: &str = "sans-serif";
const DEFAULT_NODE_CHART_TITLE: &str = "Per-node Resource Usage";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub dpi: u32,
    pub font_family: String,
    pub node_chart_title: String,
}

impl Settings {
    /// defaults < `config/usage_plot.*` (if present) < `extra` < `USAGE_PLOT_*` environment
    pub fn new(extra: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("dpi", DEFAULT_DPI.to_string())?
            .set_default("font_family", DEFAULT_FONT_FAMILY.to_string())?
            .set_default("node_chart_title", DEFAULT_NODE_CHART_TITLE.to_string())?
            .add_source(File::with_name("config/usage_plot").required(false));
        if let Some(extra) = extra {
            builder = builder.add_source(File::from(extra));
        }

        let settings: Self = builder
            .add_source(Environment::with_prefix("USAGE_PLOT"))
            .build()?
            .try_deserialize()?;

        if settings.dpi == 0 {
            return Err(ConfigError::Message("dpi must be positive".to_owned()));
        }
        Ok(settings)
    }
}

pub fn read_config(extra: Option<&Path>) -> Result<Settings> {
    info!("Loading config");
    Settings::new(extra)
        .map_err(anyhow::Error::new)
        .context("parsing config file")
}
