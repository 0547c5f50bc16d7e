//! Feature-index allocation.
//!
//! Training passes number relaxations after every non-DC feature already in
//! the catalog. Inference passes must land on the same numbers the training
//! pass recorded, either by position or by looking each relaxation up.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::warn;

use super::relax::RelaxedConstraint;
use super::{Mode, DC_KIND};
use crate::catalog::FeatureCatalogEntry;
use crate::config::Alignment;
use crate::error::{FeaturizeError, Result};

/// `1 + max(index)` over non-DC entries; 1 when there are none.
pub fn training_start(entries: &[FeatureCatalogEntry]) -> Result<i64> {
    let max = entries
        .iter()
        .filter(|e| e.kind != DC_KIND)
        .map(|e| e.feature_index)
        .max()
        .unwrap_or(0);
    max.checked_add(1).ok_or_else(|| exhausted(max, 1))
}

/// `min(index)` over DC entries; 0 when there are none.
pub fn inference_start(entries: &[FeatureCatalogEntry]) -> i64 {
    entries
        .iter()
        .filter(|e| e.kind == DC_KIND)
        .map(|e| e.feature_index)
        .min()
        .unwrap_or(0)
}

/// Assign one index per relaxation, in relaxation order.
pub fn allocate_indices(
    mode: Mode,
    alignment: Alignment,
    relaxed: &[RelaxedConstraint],
    entries: &[FeatureCatalogEntry],
) -> Result<Vec<i64>> {
    match (mode, alignment) {
        (Mode::Training, _) => sequential(training_start(entries)?, relaxed.len()),
        (Mode::Inference, Alignment::Positional) => positional(relaxed, entries),
        (Mode::Inference, Alignment::ByKey) => by_key(relaxed, entries),
    }
}

fn sequential(start: i64, count: usize) -> Result<Vec<i64>> {
    (0..count)
        .map(|offset| {
            i64::try_from(offset)
                .ok()
                .and_then(|offset| start.checked_add(offset))
                .ok_or_else(|| exhausted(start, count))
        })
        .collect()
}

fn exhausted(start: i64, count: usize) -> FeaturizeError {
    FeaturizeError::CatalogMisaligned(format!(
        "feature index space exhausted: {} indices requested from {}",
        count, start
    ))
}

fn positional(relaxed: &[RelaxedConstraint], entries: &[FeatureCatalogEntry]) -> Result<Vec<i64>> {
    let recorded: BTreeSet<i64> = entries
        .iter()
        .filter(|e| e.kind == DC_KIND)
        .map(|e| e.feature_index)
        .collect();

    if recorded.is_empty() {
        warn!("no DC features recorded; inference indices start at 0");
    } else if recorded.len() != relaxed.len() {
        return Err(FeaturizeError::CatalogMisaligned(format!(
            "catalog records {} DC features but the constraint set relaxes to {}",
            recorded.len(),
            relaxed.len()
        )));
    }

    sequential(inference_start(entries), relaxed.len())
}

fn by_key(relaxed: &[RelaxedConstraint], entries: &[FeatureCatalogEntry]) -> Result<Vec<i64>> {
    let mut recorded: HashMap<(&str, &str), i64> = HashMap::new();
    for entry in entries.iter().filter(|e| e.kind == DC_KIND) {
        recorded
            .entry((entry.attribute.as_str(), entry.defining_expression.as_str()))
            .and_modify(|index| *index = (*index).min(entry.feature_index))
            .or_insert(entry.feature_index);
    }

    let definitions: Vec<String> = relaxed.iter().map(|r| r.defining_expression()).collect();
    let mut seen = HashSet::new();
    relaxed
        .iter()
        .zip(&definitions)
        .map(|(r, defining)| {
            let key = (r.source_attribute.as_str(), defining.as_str());
            if !seen.insert(key) {
                return Err(FeaturizeError::CatalogMisaligned(format!(
                    "relaxation {} on `{}` duplicates an earlier relaxation",
                    r.key, r.source_attribute
                )));
            }
            recorded.get(&key).copied().ok_or_else(|| {
                FeaturizeError::CatalogMisaligned(format!(
                    "relaxation {} on `{}` has no training-mode feature",
                    r.key, r.source_attribute
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{ConstraintSet, DenialConstraint, Operator, Predicate, PredicateShape};
    use crate::featurize::Relaxer;

    fn entry(index: i64, kind: &str) -> FeatureCatalogEntry {
        FeatureCatalogEntry {
            feature_index: index,
            attribute: "a".into(),
            defining_expression: String::new(),
            kind: kind.into(),
        }
    }

    fn relaxed(attrs: &[&str]) -> Vec<RelaxedConstraint> {
        let preds = attrs
            .iter()
            .map(|a| Predicate::pairwise(a, Operator::Eq, PredicateShape::BothRelaxable))
            .collect();
        let set = ConstraintSet::new(vec![DenialConstraint::new("C1", preds)]);
        Relaxer::new("postab").relax_all(&set).unwrap()
    }

    fn training_entries(
        relaxed: &[RelaxedConstraint],
        indices: &[i64],
    ) -> Vec<FeatureCatalogEntry> {
        relaxed
            .iter()
            .zip(indices)
            .map(|(r, &i)| FeatureCatalogEntry {
                feature_index: i,
                attribute: r.source_attribute.clone(),
                defining_expression: r.defining_expression(),
                kind: DC_KIND.into(),
            })
            .collect()
    }

    #[test]
    fn test_training_start_after_max_non_dc() {
        let entries = vec![entry(3, "init"), entry(7, "cooccur"), entry(20, "DC")];
        assert_eq!(training_start(&entries).unwrap(), 8);
        assert_eq!(training_start(&[]).unwrap(), 1);
    }

    #[test]
    fn test_inference_start_min_dc() {
        let entries = vec![entry(7, "cooccur"), entry(9, "DC"), entry(8, "DC")];
        assert_eq!(inference_start(&entries), 8);
        assert_eq!(inference_start(&[entry(2, "init")]), 0);
    }

    #[test]
    fn test_training_indices_are_consecutive() {
        let relaxed = relaxed(&["zip", "city"]);
        let entries = vec![entry(7, "cooccur")];
        let indices =
            allocate_indices(Mode::Training, Alignment::Positional, &relaxed, &entries).unwrap();
        assert_eq!(indices, vec![8, 9, 10, 11]);
    }

    #[test]
    fn test_cross_mode_alignment_positional() {
        let relaxed = relaxed(&["zip", "city"]);
        let mut entries = vec![entry(7, "cooccur")];
        let training =
            allocate_indices(Mode::Training, Alignment::Positional, &relaxed, &entries).unwrap();
        entries.extend(training_entries(&relaxed, &training));

        let inference =
            allocate_indices(Mode::Inference, Alignment::Positional, &relaxed, &entries).unwrap();
        assert_eq!(inference, training);
        assert_eq!(inference[0], 8);
    }

    #[test]
    fn test_positional_detects_count_mismatch() {
        let trained = relaxed(&["zip", "city"]);
        let mut entries = Vec::new();
        let training =
            allocate_indices(Mode::Training, Alignment::Positional, &trained, &entries).unwrap();
        entries.extend(training_entries(&trained, &training));

        let changed = relaxed(&["zip"]);
        let err = allocate_indices(Mode::Inference, Alignment::Positional, &changed, &entries)
            .unwrap_err();
        assert!(matches!(err, FeaturizeError::CatalogMisaligned(_)));
    }

    #[test]
    fn test_positional_tolerates_repeated_training_appends() {
        let relaxed = relaxed(&["zip"]);
        let mut entries = Vec::new();
        let training =
            allocate_indices(Mode::Training, Alignment::Positional, &relaxed, &entries).unwrap();
        entries.extend(training_entries(&relaxed, &training));
        entries.extend(training_entries(&relaxed, &training));

        let inference =
            allocate_indices(Mode::Inference, Alignment::Positional, &relaxed, &entries).unwrap();
        assert_eq!(inference, training);
    }

    #[test]
    fn test_by_key_survives_reordering() {
        let trained = relaxed(&["zip", "city"]);
        let mut entries = vec![entry(4, "init")];
        let training =
            allocate_indices(Mode::Training, Alignment::ByKey, &trained, &entries).unwrap();
        entries.extend(training_entries(&trained, &training));

        let reordered: Vec<RelaxedConstraint> = trained.iter().rev().cloned().collect();
        let inference =
            allocate_indices(Mode::Inference, Alignment::ByKey, &reordered, &entries).unwrap();
        let expected: Vec<i64> = training.iter().rev().copied().collect();
        assert_eq!(inference, expected);
    }

    #[test]
    fn test_by_key_missing_relaxation() {
        let trained = relaxed(&["zip"]);
        let mut entries = Vec::new();
        let training =
            allocate_indices(Mode::Training, Alignment::ByKey, &trained, &entries).unwrap();
        entries.extend(training_entries(&trained, &training));

        let other = relaxed(&["state"]);
        let err =
            allocate_indices(Mode::Inference, Alignment::ByKey, &other, &entries).unwrap_err();
        assert!(matches!(err, FeaturizeError::CatalogMisaligned(_)));
    }

    #[test]
    fn test_training_start_overflow_is_an_error() {
        let err = training_start(&[entry(i64::MAX, "init")]).unwrap_err();
        assert!(matches!(err, FeaturizeError::CatalogMisaligned(_)));
    }

    #[test]
    fn test_training_indices_overflow_is_an_error() {
        let relaxed = relaxed(&["zip", "city"]);
        let entries = vec![entry(i64::MAX - 2, "init")];
        let err = allocate_indices(Mode::Training, Alignment::Positional, &relaxed, &entries)
            .unwrap_err();
        assert!(matches!(err, FeaturizeError::CatalogMisaligned(_)));

        let fits = allocate_indices(Mode::Training, Alignment::Positional, &relaxed[..2], &entries)
            .unwrap();
        assert_eq!(fits, vec![i64::MAX - 1, i64::MAX]);
    }

    #[test]
    fn test_by_key_rejects_duplicate_relaxations() {
        let preds = vec![Predicate::pairwise(
            "zip",
            Operator::Eq,
            PredicateShape::RightOnlyRelaxable,
        )];
        let set = ConstraintSet::new(vec![
            DenialConstraint::new("C1", preds.clone()),
            DenialConstraint::new("C1_copy", preds),
        ]);
        let duplicated = Relaxer::new("postab").relax_all(&set).unwrap();
        let entries = training_entries(&duplicated, &[8, 9]);

        let err = allocate_indices(Mode::Inference, Alignment::ByKey, &duplicated, &entries)
            .unwrap_err();
        assert!(matches!(err, FeaturizeError::CatalogMisaligned(_)));
    }
}
