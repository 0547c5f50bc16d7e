/// Denial-constraint featurization.
///
/// ```text
/// ConstraintSet
///       ↓
/// Relaxer            (relax.rs)     one RelaxedConstraint per relaxable side
///       ↓
/// Index allocation   (allocate.rs)  training / inference numbering
///       ↓
/// Query synthesis    (synth.rs)     COUNT query per relaxation
///       ↓
/// QuerySink + FeatureCatalog        (dc.rs drives both)
/// ```
pub mod allocate;
pub mod dc;
pub mod relax;
pub mod synth;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::{FeatureCatalog, FeatureCatalogEntry};
use crate::error::Result;
use crate::sink::QuerySink;

pub use allocate::{allocate_indices, inference_start, training_start};
pub use dc::DcFeaturizer;
pub use relax::{RelaxationKey, RelaxedConstraint, Relaxer};
pub use synth::{synthesize, QueryTables};

/// Catalog kind tag for denial-constraint features.
pub const DC_KIND: &str = "DC";

/// Column names shared with the query engine.
pub mod columns {
    /// Feature-vector slot id in the candidate-value table.
    pub const VID: &str = "vid";
    /// Candidate value id.
    pub const DOMAIN_ID: &str = "domainId";
    /// Row identity, present in both base and candidate-value tables.
    pub const ROW_ID: &str = "rowId";
    pub const ATTR_NAME: &str = "attrName";
    pub const ATTR_VAL: &str = "attrVal";
}

/// Which pass a featurizer run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Clean cells: allocates fresh indices and records them in the catalog.
    Training,
    /// Don't-know cells: reuses training indices, never writes the catalog.
    Inference,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Training => write!(f, "training"),
            Mode::Inference => write!(f, "inference"),
        }
    }
}

/// A synthesized feature query and the metadata the catalog records for it.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureQuery {
    pub feature_index: i64,
    pub query_text: String,
    pub source_attribute: String,
    pub defining_expression: String,
    pub kind: &'static str,
    pub key: RelaxationKey,
}

impl FeatureQuery {
    pub fn catalog_entry(&self) -> FeatureCatalogEntry {
        FeatureCatalogEntry {
            feature_index: self.feature_index,
            attribute: self.source_attribute.clone(),
            defining_expression: self.defining_expression.clone(),
            kind: self.kind.to_string(),
        }
    }
}

/// A producer of feature queries for one signal family.
pub trait Featurizer: Send + Sync {
    fn id(&self) -> &str;

    /// Produce this featurizer's queries for one pass, submitting each to
    /// `sink` in index order.
    fn queries(
        &self,
        mode: Mode,
        catalog: &dyn FeatureCatalog,
        sink: Option<&dyn QuerySink>,
    ) -> Result<Vec<FeatureQuery>>;
}

/// Outcome of one featurizer within [`run_featurizers`].
pub struct FeaturizerRun {
    pub id: String,
    pub result: Result<Vec<FeatureQuery>>,
}

/// Run featurizers concurrently on the blocking pool against a shared sink.
///
/// Results come back in the order the featurizers were given.
pub async fn run_featurizers(
    featurizers: Vec<Arc<dyn Featurizer>>,
    mode: Mode,
    catalog: Arc<dyn FeatureCatalog>,
    sink: Option<Arc<dyn QuerySink>>,
) -> anyhow::Result<Vec<FeaturizerRun>> {
    let handles: Vec<_> = featurizers
        .into_iter()
        .map(|featurizer| {
            let catalog = Arc::clone(&catalog);
            let sink = sink.clone();
            tokio::task::spawn_blocking(move || {
                let result = featurizer.queries(mode, catalog.as_ref(), sink.as_deref());
                FeaturizerRun {
                    id: featurizer.id().to_string(),
                    result,
                }
            })
        })
        .collect();

    let mut runs = Vec::with_capacity(handles.len());
    for handle in handles {
        runs.push(handle.await?);
    }
    Ok(runs)
}
