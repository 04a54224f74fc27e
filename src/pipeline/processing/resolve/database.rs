use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::info;

use super::constraint::Constraint;
use crate::domain::{NormalizedDimm, RawFieldMap};
use crate::error::{Result, ScoutError};

/// One heuristic rule of the die database.
///
/// Immutable once loaded. Unrecognized document keys are preserved in
/// `extra` but never affect matching.
#[derive(Debug, Clone)]
pub struct Rule {
    pub priority: i64,
    pub die_type: String,
    pub notes: Option<String>,
    constraints: Vec<Constraint>,
    pub extra: RawFieldMap,
}

impl Rule {
    /// True iff every constraint on this rule holds for the record.
    /// A rule without constraints matches everything.
    pub fn matches(&self, dimm: &NormalizedDimm) -> bool {
        self.constraints.iter().all(|c| c.matches(dimm))
    }

    fn from_entry(index: usize, entry: Value) -> Result<Self> {
        let Value::Object(mut map) = entry else {
            return Err(ScoutError::Database(format!("entry {} must be an object", index)));
        };

        let priority = map
            .remove("priority")
            .ok_or_else(|| {
                ScoutError::Database(format!("entry {} missing required key 'priority'", index))
            })?
            .as_i64()
            .ok_or_else(|| {
                ScoutError::Database(format!("entry {} 'priority' must be an integer", index))
            })?;

        let die_type = map
            .remove("die_type")
            .ok_or_else(|| {
                ScoutError::Database(format!("entry {} missing required key 'die_type'", index))
            })?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ScoutError::Database(format!(
                    "entry {} 'die_type' must be a non-empty string",
                    index
                ))
            })?;

        let notes = map
            .remove("notes")
            .as_ref()
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut constraints = Vec::new();
        let mut extra = RawFieldMap::new();
        for (key, value) in map {
            match Constraint::from_entry(&key, &value) {
                Some(constraint) => constraints.push(constraint),
                // Constraint values are not type-checked here; unknown keys
                // ride along without participating in matching.
                None => {
                    extra.insert(key, value);
                }
            }
        }

        Ok(Rule {
            priority,
            die_type,
            notes,
            constraints,
            extra,
        })
    }
}

/// The prioritized heuristic rule set, sorted by descending priority and
/// stable with respect to document order for equal priorities. Read-only
/// after loading, safe to share across concurrent classification calls.
#[derive(Debug, Clone, Default)]
pub struct RuleDatabase {
    rules: Vec<Rule>,
}

impl RuleDatabase {
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Loads and structurally validates a rule database document.
    ///
    /// Fails with [`ScoutError::Database`] when the top level is not a list,
    /// an entry is not an object, or `priority`/`die_type` are missing or of
    /// the wrong shape. No other validation is performed.
    pub fn load_from_value(document: Value) -> Result<Self> {
        let Value::Array(entries) = document else {
            return Err(ScoutError::Database(
                "rule database must be a top-level JSON array".to_string(),
            ));
        };

        let mut rules = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            rules.push(Rule::from_entry(index, entry)?);
        }

        // Stable sort keeps document order within equal priorities.
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        info!("loaded rule database with {} rule(s)", rules.len());
        Ok(RuleDatabase { rules })
    }

    pub fn load_from_str(text: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(text)?;
        Self::load_from_value(document)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_from_str(&fs::read_to_string(path)?)
    }
}
