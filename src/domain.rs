use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw per-module fields exactly as parsed from decoder output, keyed by
/// decoder-native labels (e.g. "Module Capacity", "SDRAM Device Width").
pub type RawFieldMap = serde_json::Map<String, serde_json::Value>;

/// DDR memory generation recognized by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DdrGeneration {
    #[serde(rename = "DDR1")]
    Ddr1,
    #[serde(rename = "DDR2")]
    Ddr2,
    #[serde(rename = "DDR3")]
    Ddr3,
    #[serde(rename = "DDR4")]
    Ddr4,
    #[serde(rename = "DDR5")]
    Ddr5,
}

impl DdrGeneration {
    pub fn as_str(&self) -> &'static str {
        match self {
            DdrGeneration::Ddr1 => "DDR1",
            DdrGeneration::Ddr2 => "DDR2",
            DdrGeneration::Ddr3 => "DDR3",
            DdrGeneration::Ddr4 => "DDR4",
            DdrGeneration::Ddr5 => "DDR5",
        }
    }
}

impl fmt::Display for DdrGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A module record reduced to the canonical attribute vocabulary.
///
/// Every populated field holds a non-empty value; attributes the decoder did
/// not report (or reported unparseably) stay `None` and are omitted from
/// serialized output. Decoder-native fields that no canonical attribute
/// superseded are preserved verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDimm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<DdrGeneration>,
    /// Module brand (e.g. "Corsair", "G.Skill").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// DRAM IC vendor, canonicalized (e.g. "SK Hynix", "Samsung").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dram_mfg: Option<String>,
    /// Module capacity in gigabytes; an integer when the value is exact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_gb: Option<serde_json::Number>,
    /// Rank count in "<n>R" form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_ranks: Option<String>,
    /// DRAM device width in "x<n>" form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chip_org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_part_number: Option<String>,
    /// XMP-style timing summary, "freq-cl[-...]".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timings_xmp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timings_jdec: Option<String>,
    /// XMP voltage kept as a string for matching consistency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage_xmp: Option<String>,
    /// JEDEC nominal voltage in volts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage_jdec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corsair_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gskill_sticker_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crucial_sticker_suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hynix_ic_part_number: Option<String>,
    /// Physical slot identifier derived during parsing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    /// Decoder-native fields preserved for downstream display and diagnostics.
    #[serde(flatten)]
    pub extra: RawFieldMap,
}

/// Verdict of the heuristic resolver for a single module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// A concrete die label, "Unknown", or "Ambiguous".
    pub die_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A normalized module record together with its die classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedDimm {
    pub dimm: NormalizedDimm,
    pub classification: ClassificationResult,
}
