use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::featurize::Mode;

/// How inference-mode passes recover feature indices assigned in training.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// `min(DC index) + position`, checked against the catalog's DC count.
    #[default]
    Positional,
    /// Match each relaxation's attribute and defining expression in the catalog.
    ByKey,
}

/// Logical table names and featurizer options.
///
/// Physical table names are `<logical>_<dataset_id>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeaturizerConfig {
    pub dataset_id: String,
    pub base_table: String,
    pub candidates_clean_table: String,
    pub candidates_dk_table: String,
    pub catalog_table: String,
    /// Alias of the candidate-value table inside feature queries.
    pub candidate_alias: String,
    pub alignment: Alignment,
}

impl Default for FeaturizerConfig {
    fn default() -> Self {
        Self {
            dataset_id: String::from("default"),
            base_table: String::from("Init"),
            candidates_clean_table: String::from("Possible_values_clean"),
            candidates_dk_table: String::from("Possible_values_dk"),
            catalog_table: String::from("Feature_id_map"),
            candidate_alias: String::from("postab"),
            alignment: Alignment::default(),
        }
    }
}

impl FeaturizerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: FeaturizerConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise from the default location if it
    /// exists, otherwise defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::load(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dcsignal")
            .join("config.toml")
    }

    pub fn table_specific_name(&self, logical: &str) -> String {
        format!("{}_{}", logical, self.dataset_id)
    }

    pub fn base_table_name(&self) -> String {
        self.table_specific_name(&self.base_table)
    }

    pub fn catalog_table_name(&self) -> String {
        self.table_specific_name(&self.catalog_table)
    }

    /// Candidate-value table for the given pass.
    pub fn candidate_table_name(&self, mode: Mode) -> String {
        match mode {
            Mode::Training => self.table_specific_name(&self.candidates_clean_table),
            Mode::Inference => self.table_specific_name(&self.candidates_dk_table),
        }
    }
}
