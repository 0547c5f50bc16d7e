//! Feature-query synthesis.
//!
//! Each relaxed constraint becomes a count over unordered tuple pairs:
//!
//! ```text
//! SELECT postab.vid, postab.domainId, <index> AS feature, COUNT(<counterpart>.rowId) AS count
//! FROM base AS tuple1, base AS tuple2, candidates AS postab
//! WHERE tuple1.rowId < tuple2.rowId AND <residual> AND <relaxed join>
//! GROUP BY postab.vid, postab.rowId, postab.attrName, postab.domainId
//! ```

use tracing::debug;

use super::relax::RelaxedConstraint;
use super::{columns, FeatureQuery, Mode, DC_KIND};
use crate::ast::{
    compile, BinaryOperator, Expression, Literal, Query, SelectItem, SelectQuery, TableRef,
};
use crate::config::FeaturizerConfig;
use crate::constraint::{TUPLE1, TUPLE2};

/// Physical tables a feature query reads.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTables {
    pub base: String,
    pub candidates: String,
    pub candidate_alias: String,
}

impl QueryTables {
    pub fn for_mode(config: &FeaturizerConfig, mode: Mode) -> Self {
        Self {
            base: config.base_table_name(),
            candidates: config.candidate_table_name(mode),
            candidate_alias: config.candidate_alias.clone(),
        }
    }
}

/// Build the feature query for one relaxation.
pub fn synthesize(
    relaxed: RelaxedConstraint,
    feature_index: i64,
    tables: &QueryTables,
) -> FeatureQuery {
    let query = feature_select(&relaxed, feature_index, tables);
    let query_text = compile(&query);
    debug!(feature_index, key = %relaxed.key, "synthesized feature query");

    FeatureQuery {
        feature_index,
        query_text,
        defining_expression: relaxed.defining_expression(),
        source_attribute: relaxed.source_attribute,
        kind: DC_KIND,
        key: relaxed.key,
    }
}

fn feature_select(relaxed: &RelaxedConstraint, feature_index: i64, tables: &QueryTables) -> Query {
    let candidate = tables.candidate_alias.as_str();
    let candidate_col = |name: &str| Expression::column(candidate, name);

    let projections = vec![
        SelectItem {
            expr: candidate_col(columns::VID),
            alias: None,
        },
        SelectItem {
            expr: candidate_col(columns::DOMAIN_ID),
            alias: None,
        },
        SelectItem {
            expr: Expression::Literal(Literal::Integer(feature_index)),
            alias: Some("feature".to_string()),
        },
        SelectItem {
            expr: Expression::function(
                "COUNT",
                vec![Expression::column(relaxed.counterpart_alias, columns::ROW_ID)],
            ),
            alias: Some("count".to_string()),
        },
    ];

    let from = vec![
        TableRef::aliased(tables.base.as_str(), TUPLE1),
        TableRef::aliased(tables.base.as_str(), TUPLE2),
        TableRef::aliased(tables.candidates.as_str(), candidate),
    ];

    let pair_order = Expression::binary(
        Expression::column(TUPLE1, columns::ROW_ID),
        BinaryOperator::Lt,
        Expression::column(TUPLE2, columns::ROW_ID),
    );
    let filter = Expression::conjunction(
        std::iter::once(pair_order)
            .chain(relaxed.residual.iter().cloned())
            .chain(std::iter::once(relaxed.relaxed_join.clone())),
    );

    let group_by = vec![
        candidate_col(columns::VID),
        candidate_col(columns::ROW_ID),
        candidate_col(columns::ATTR_NAME),
        candidate_col(columns::DOMAIN_ID),
    ];

    Query::Select(Box::new(SelectQuery {
        projections,
        from,
        filter,
        group_by,
    }))
}
