use tracing::{info, warn};

use super::allocate::allocate_indices;
use super::relax::Relaxer;
use super::synth::{synthesize, QueryTables};
use super::{FeatureQuery, Featurizer, Mode};
use crate::catalog::{FeatureCatalog, FeatureCatalogEntry};
use crate::config::FeaturizerConfig;
use crate::constraint::ConstraintSet;
use crate::error::Result;
use crate::sink::QuerySink;

/// Denial-constraint signal: one COUNT feature per relaxed predicate side.
pub struct DcFeaturizer {
    id: String,
    constraints: ConstraintSet,
    config: FeaturizerConfig,
}

impl DcFeaturizer {
    pub fn new(constraints: ConstraintSet, config: FeaturizerConfig) -> Self {
        Self {
            id: String::from("SignalDC"),
            constraints,
            config,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn config(&self) -> &FeaturizerConfig {
        &self.config
    }
}

impl Featurizer for DcFeaturizer {
    fn id(&self) -> &str {
        &self.id
    }

    fn queries(
        &self,
        mode: Mode,
        catalog: &dyn FeatureCatalog,
        sink: Option<&dyn QuerySink>,
    ) -> Result<Vec<FeatureQuery>> {
        let relaxer = Relaxer::new(self.config.candidate_alias.as_str());
        let relaxed = relaxer.relax_all(&self.constraints)?;
        let existing = catalog.entries()?;
        let indices = allocate_indices(mode, self.config.alignment, &relaxed, &existing)?;
        let tables = QueryTables::for_mode(&self.config, mode);

        let mut queries = Vec::with_capacity(relaxed.len());
        for (relaxation, index) in relaxed.into_iter().zip(indices) {
            let query = synthesize(relaxation, index, &tables);
            if let Some(sink) = sink {
                if let Err(err) = sink.submit(&query.query_text) {
                    warn!(
                        featurizer = %self.id,
                        feature_index = index,
                        %err,
                        "query submission failed"
                    );
                    return Err(err);
                }
            }
            queries.push(query);
        }

        if mode == Mode::Training {
            let entries: Vec<FeatureCatalogEntry> =
                queries.iter().map(FeatureQuery::catalog_entry).collect();
            if let Err(err) = catalog.append(&entries) {
                warn!(featurizer = %self.id, %err, "catalog append failed");
                return Err(err);
            }
        }

        info!(
            featurizer = %self.id,
            %mode,
            queries = queries.len(),
            first_index = queries.first().map(|q| q.feature_index),
            "featurization pass complete"
        );
        Ok(queries)
    }
}
