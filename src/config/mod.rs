pub mod config;
pub mod logging_config;

use std::path::PathBuf;

use clap::Parser;

use crate::config::config::{Config, ConfigError};
use crate::query::filters::{FilterKey, FilterValue};

/// Command line arguments. Values given here override the configuration file.
#[derive(Debug, Parser)]
#[command(name = "dicom-query", version, about = "Query a DICOM archive for studies and their series")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Peer host
    #[arg(long)]
    pub host: Option<String>,

    /// Peer port
    #[arg(long)]
    pub port: Option<u16>,

    /// Calling (local) AE title
    #[arg(long = "aet")]
    pub calling_ae_title: Option<String>,

    /// Called (peer) AE title
    #[arg(long = "aec")]
    pub called_ae_title: Option<String>,

    /// Patient name filter
    #[arg(long)]
    pub name: Option<String>,

    /// Study description filter
    #[arg(long)]
    pub study: Option<String>,

    /// Series description filter
    #[arg(long)]
    pub series: Option<String>,

    /// Patient ID filter
    #[arg(long)]
    pub id: Option<String>,

    /// Modality filter, repeat for several
    #[arg(long = "modality")]
    pub modalities: Vec<String>,
}

impl Cli {
    /// Load the configuration file (or defaults) and apply overrides
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        let query = &mut config.query;
        if let Some(host) = &self.host {
            query.host = host.clone();
        }
        if let Some(port) = self.port {
            query.port = port;
        }
        if let Some(aet) = &self.calling_ae_title {
            query.calling_ae_title = aet.clone();
        }
        if let Some(aec) = &self.called_ae_title {
            query.called_ae_title = aec.clone();
        }

        let text_filters = [
            (FilterKey::Name, &self.name),
            (FilterKey::Study, &self.study),
            (FilterKey::Series, &self.series),
            (FilterKey::Id, &self.id),
        ];
        for (key, value) in text_filters {
            if let Some(value) = value {
                query
                    .filters
                    .insert(key.as_str().to_string(), FilterValue::Text(value.clone()));
            }
        }
        if !self.modalities.is_empty() {
            query.filters.insert(
                FilterKey::Modalities.as_str().to_string(),
                FilterValue::List(self.modalities.clone()),
            );
        }

        config.validate()?;
        Ok(config)
    }
}
