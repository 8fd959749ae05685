//! Label-consistency policy
//!
//! A region is kept when every observation inside it carries the same
//! designated value as its first observation in arrival order. There is no
//! majority vote and no partial inclusion: a single disagreeing value drops
//! the whole region.

use std::collections::BTreeMap;

use seglabel_core::models::FieldValue;

use crate::matcher::{Aggregation, Match};

/// A region that passed the policy
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRegion {
    pub region_id: u64,

    /// The agreed designated value
    pub value: FieldValue,

    /// First observation in arrival order
    pub first_match: Match,

    pub match_count: usize,
}

/// Output of the validate phase
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validation {
    validated: BTreeMap<u64, ValidatedRegion>,
    conflicts: Vec<u64>,
}

impl Validation {
    pub fn get(&self, region_id: u64) -> Option<&ValidatedRegion> {
        self.validated.get(&region_id)
    }

    /// Validated regions in ascending id order
    pub fn validated(&self) -> impl Iterator<Item = &ValidatedRegion> {
        self.validated.values()
    }

    /// Region id -> resolved value
    pub fn resolved(&self) -> BTreeMap<u64, FieldValue> {
        self.validated.iter().map(|(id, region)| (*id, region.value.clone())).collect()
    }

    /// Ids of regions excluded for disagreeing values, ascending
    pub fn conflicts(&self) -> &[u64] {
        &self.conflicts
    }

    pub fn len(&self) -> usize {
        self.validated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validated.is_empty()
    }
}

/// Applies the conflict policy to an aggregation
pub struct ConflictValidator;

impl ConflictValidator {
    pub fn validate(aggregation: &Aggregation) -> Validation {
        let mut validation = Validation::default();

        for (region_id, matches) in aggregation.iter() {
            let Some(first) = matches.first() else {
                continue;
            };

            if let Some(other) = matches[1..].iter().find(|m| !m.value.agrees_with(&first.value)) {
                tracing::debug!(
                    region_id,
                    first = %first.value,
                    conflicting = %other.value,
                    "Excluding region with conflicting values"
                );
                validation.conflicts.push(region_id);
                continue;
            }

            validation.validated.insert(
                region_id,
                ValidatedRegion {
                    region_id,
                    value: first.value.clone(),
                    first_match: first.clone(),
                    match_count: matches.len(),
                },
            );
        }

        validation
    }
}
