use serde_json::Value;

use crate::domain::NormalizedDimm;

/// One predicate of a heuristic rule, evaluated against a normalized record.
///
/// Every variant corresponds to one recognized rule key; all predicates on a
/// rule are ANDed. Comparison is deterministic and side-effect free.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Exact generation label, e.g. "DDR4".
    Generation(String),
    /// Case-insensitive substring of the module brand.
    Manufacturer(String),
    /// Case-insensitive exact DRAM vendor.
    DramMfg(String),
    /// Numeric capacity equality; `None` when the rule value is not numeric.
    ModuleGb(Option<f64>),
    ModuleRanks(String),
    ChipOrg(String),
    /// Case-insensitive substring of the part number.
    PartNumberContains(String),
    /// Case-insensitive exact part number.
    PartNumberExact(String),
    /// Exact match, or rule value contained in the record's timing summary.
    TimingsXmp(String),
    TimingsJdec(String),
    /// String equality on the stringified XMP voltage.
    VoltageXmp(String),
    /// Version-family prefix when the rule value ends with '.', else exact.
    CorsairVersion(String),
    GskillStickerCode(String),
    CrucialStickerSuffix(String),
    /// Case-insensitive comparison against the 8th character of the Hynix IC
    /// part number; fails for strings shorter than 8 characters.
    HynixIcParse8th(String),
    /// A recognized key whose value cannot participate in comparison.
    Unmatchable,
}

fn constraint_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

impl Constraint {
    /// Builds the constraint for a recognized rule key, or `None` for keys
    /// that do not participate in matching.
    pub fn from_entry(key: &str, value: &Value) -> Option<Self> {
        let text = constraint_text(value);
        let textual = |build: fn(String) -> Self| match text.clone() {
            Some(t) => build(t),
            None => Self::Unmatchable,
        };
        Some(match key {
            "generation" => textual(Self::Generation),
            "manufacturer" => textual(Self::Manufacturer),
            "dram_mfg" => textual(Self::DramMfg),
            "module_gb" => Self::ModuleGb(coerce_number(value)),
            "module_ranks" => textual(Self::ModuleRanks),
            "chip_org" => textual(Self::ChipOrg),
            "part_number_contains" => textual(Self::PartNumberContains),
            "part_number_exact" => textual(Self::PartNumberExact),
            "timings_xmp" => textual(Self::TimingsXmp),
            "timings_jdec" => textual(Self::TimingsJdec),
            "voltage_xmp" => textual(Self::VoltageXmp),
            "corsair_version" => textual(Self::CorsairVersion),
            "gskill_sticker_code" => textual(Self::GskillStickerCode),
            "crucial_sticker_suffix" => textual(Self::CrucialStickerSuffix),
            "hynix_ic_parse_8th" => textual(Self::HynixIcParse8th),
            _ => return None,
        })
    }

    pub fn matches(&self, dimm: &NormalizedDimm) -> bool {
        match self {
            Constraint::Generation(expected) => dimm
                .generation
                .map(|g| g.as_str() == expected)
                .unwrap_or(false),
            Constraint::Manufacturer(expected) => dimm
                .manufacturer
                .as_deref()
                .unwrap_or("")
                .to_lowercase()
                .contains(&expected.to_lowercase()),
            Constraint::DramMfg(expected) => dimm
                .dram_mfg
                .as_deref()
                .map(|actual| actual.to_lowercase() == expected.to_lowercase())
                .unwrap_or(false),
            Constraint::ModuleGb(expected) => match (expected, &dimm.module_gb) {
                (Some(expected), Some(actual)) => actual.as_f64() == Some(*expected),
                _ => false,
            },
            Constraint::ModuleRanks(expected) => {
                dimm.module_ranks.as_deref() == Some(expected.as_str())
            }
            Constraint::ChipOrg(expected) => dimm.chip_org.as_deref() == Some(expected.as_str()),
            Constraint::PartNumberContains(expected) => dimm
                .module_part_number
                .as_deref()
                .unwrap_or("")
                .to_lowercase()
                .contains(&expected.to_lowercase()),
            Constraint::PartNumberExact(expected) => dimm
                .module_part_number
                .as_deref()
                .map(|actual| actual.to_lowercase() == expected.to_lowercase())
                .unwrap_or(false),
            Constraint::TimingsXmp(expected) => {
                let actual = dimm.timings_xmp.as_deref().unwrap_or("");
                actual == expected || actual.contains(expected.as_str())
            }
            Constraint::TimingsJdec(expected) => {
                dimm.timings_jdec.as_deref() == Some(expected.as_str())
            }
            Constraint::VoltageXmp(expected) => {
                dimm.voltage_xmp.as_deref() == Some(expected.as_str())
            }
            Constraint::CorsairVersion(expected) => {
                let actual = dimm.corsair_version.as_deref().unwrap_or("");
                if expected.ends_with('.') {
                    // "3." denotes the whole 3.x version family.
                    actual.starts_with(expected.as_str())
                } else {
                    actual == expected
                }
            }
            Constraint::GskillStickerCode(expected) => dimm
                .gskill_sticker_code
                .as_deref()
                .unwrap_or("")
                .to_lowercase()
                .contains(&expected.to_lowercase()),
            Constraint::CrucialStickerSuffix(expected) => dimm
                .crucial_sticker_suffix
                .as_deref()
                .map(|actual| actual.to_lowercase() == expected.to_lowercase())
                .unwrap_or(false),
            Constraint::HynixIcParse8th(expected) => {
                let Some(ic) = dimm.hynix_ic_part_number.as_deref() else {
                    return false;
                };
                let Some(eighth) = ic.chars().nth(7) else {
                    return false;
                };
                eighth.to_uppercase().collect::<String>() == expected.to_uppercase()
            }
            Constraint::Unmatchable => false,
        }
    }
}
