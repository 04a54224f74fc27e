pub mod constraint;
pub mod database;

pub use constraint::Constraint;
pub use database::{Rule, RuleDatabase};

use std::collections::BTreeSet;
use tracing::debug;

use crate::domain::{ClassificationResult, NormalizedDimm};

pub const UNKNOWN_DIE: &str = "Unknown";
pub const AMBIGUOUS_DIE: &str = "Ambiguous";
const NO_MATCH_NOTES: &str = "No heuristic match found in database.";
const AMBIGUOUS_PREFIX: &str = "Multiple matching heuristics at same priority: ";

/// Classifies a normalized record against the rule database.
///
/// All rules are scanned in stored (descending-priority) order and the set
/// tied at the highest matching priority decides the verdict: a single die
/// label when the set agrees, "Ambiguous" when it does not, "Unknown" when
/// nothing matched. Never fails; missing record fields simply fail the
/// constraints that need them.
pub fn classify(dimm: &NormalizedDimm, db: &RuleDatabase) -> ClassificationResult {
    let mut best_priority: Option<i64> = None;
    let mut best_matches: Vec<&Rule> = Vec::new();

    for rule in db.rules() {
        if !rule.matches(dimm) {
            continue;
        }

        match best_priority {
            None => {
                best_priority = Some(rule.priority);
                best_matches.push(rule);
            }
            Some(current) if rule.priority > current => {
                best_priority = Some(rule.priority);
                best_matches.clear();
                best_matches.push(rule);
            }
            Some(current) if rule.priority == current => {
                best_matches.push(rule);
            }
            // Lower-priority matches cannot supersede the best set; the scan
            // still visits every rule.
            Some(_) => {}
        }
    }

    if best_matches.is_empty() {
        return ClassificationResult {
            die_type: UNKNOWN_DIE.to_string(),
            notes: Some(NO_MATCH_NOTES.to_string()),
        };
    }

    if best_matches.len() == 1 {
        let rule = best_matches[0];
        return ClassificationResult {
            die_type: rule.die_type.clone(),
            notes: rule.notes.clone(),
        };
    }

    debug!(
        "{} rules tied at priority {:?}",
        best_matches.len(),
        best_priority
    );

    let die_types: BTreeSet<&str> = best_matches.iter().map(|r| r.die_type.as_str()).collect();
    if die_types.len() == 1 {
        // All tied rules agree; combine their notes in encounter order.
        let notes: Vec<&str> = best_matches
            .iter()
            .filter_map(|r| r.notes.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect();
        ClassificationResult {
            die_type: best_matches[0].die_type.clone(),
            notes: if notes.is_empty() {
                None
            } else {
                Some(notes.join(" | "))
            },
        }
    } else {
        let listing: Vec<&str> = die_types.into_iter().collect();
        ClassificationResult {
            die_type: AMBIGUOUS_DIE.to_string(),
            notes: Some(format!("{}{}", AMBIGUOUS_PREFIX, listing.join(", "))),
        }
    }
}
