use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::domain::RawFieldMap;

/// One XMP/EXPO overclocking profile extracted from decoder output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpdProfile {
    /// Transfer rate, e.g. "3600 MT/s".
    pub speed: String,
    pub kind: String,
    /// Timing tuple like "18-22-22-42" when the decoder reported one.
    pub timings: Option<String>,
    /// The full decoder line the profile was found on.
    pub description: String,
}

static SLOT_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:bank|dimm)\s*\d+").unwrap());
static TRAILING_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)$").unwrap());
static FIRST_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").unwrap());
static MT_SPEED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*MT/s").unwrap());
static TIMING_TUPLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3})[ -]+(\d{1,3})[ -]+(\d{1,3})(?:[ -]+(\d{1,3}))?\b").unwrap()
});

/// Matrix-mode row labels that carry no module data.
const MATRIX_NOISE_LABELS: [&str; 2] = ["noise", "random garbage line not using pipes at all"];

/// Plain-block keys that are known decoder chatter.
const PLAIN_NOISE_KEYS: [&str; 3] = ["Noise", "Debug", "Random garbage line not using pipes at all"];

/// Diagnostic fields every emitted record must carry, defaulting to "".
const DEFAULT_DIAGNOSTIC_FIELDS: [&str; 2] =
    ["Additional JEDEC Timings malformed", "Malformed Line With Too Many Columns"];

fn is_section_header(line: &str) -> bool {
    let stripped = line.trim_start();
    stripped.starts_with("Decoding EEPROM") || stripped.starts_with("SPD data for")
}

fn put(map: &mut RawFieldMap, key: &str, value: &str) {
    map.insert(key.to_string(), Value::String(value.to_string()));
}

fn field_text(map: &RawFieldMap, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Maps a matrix-mode row label to its canonical field key.
///
/// The second element marks labels that also populate `slot`.
fn canonical_matrix_key(label_raw: &str, label_lower: &str) -> (String, bool) {
    let key = if matches!(label_lower, "size/capacity" | "module capacity" | "module size") {
        "module_gb"
    } else if label_lower.contains("module manufacturer") {
        "manufacturer"
    } else if label_lower == "dram manufacturer" {
        "dram_mfg"
    } else if label_lower == "part number" {
        "module_part_number"
    } else if label_lower == "fundamental memory type" {
        "generation"
    } else if label_lower == "module nominal voltage" {
        "JEDEC_voltage"
    } else if label_lower == "minimum voltage" {
        "min_voltage"
    } else if label_lower == "maximum voltage" {
        "max_voltage"
    } else if label_lower == "configured voltage" {
        "configured_voltage"
    } else if label_lower == "configured memory speed" || label_lower == "configured speed" {
        "configured_speed"
    } else if label_lower == "ranks" || label_lower.contains("number of ranks") {
        "module_ranks"
    } else if label_lower == "sdram device width" {
        "SDRAM Device Width"
    } else if label_lower == "guessing dimm is in" {
        return ("Guessing DIMM is in".to_string(), true);
    } else if label_lower == "jedec timings" {
        "JEDEC Timings"
    } else if label_lower == "additional jedec timings malformed" {
        "Additional JEDEC Timings malformed"
    } else if label_lower == "pmic manufacturer" {
        "PMIC Manufacturer"
    } else if label_lower == "hynix ic part number" {
        "Hynix IC Part Number"
    } else {
        // Unrecognized labels are preserved verbatim for downstream display.
        return (label_raw.to_string(), false);
    };
    (key.to_string(), false)
}

/// Derives slot identifiers from a "Guessing DIMM is in ..." value.
///
/// A value naming several bank/dimm tokens yields one slot per token in
/// order; a single recognizable token yields that slot; anything else is
/// passed through as a single best-effort slot.
fn derive_slots(raw_val: &str) -> Vec<String> {
    let normalized = raw_val
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if normalized.is_empty() {
        return Vec::new();
    }

    let found: Vec<String> = SLOT_TOKEN_RE
        .find_iter(&normalized)
        .map(|m| m.as_str().to_string())
        .collect();
    if found.is_empty() {
        vec![raw_val.to_string()]
    } else {
        found
    }
}

/// Infer a JEDEC CAS-latency class for common speeds.
///
/// Heuristic fallback for decoders that report a configured speed without
/// timings.
pub fn infer_timings(speed_mt: u32, generation: &str) -> &'static str {
    let gen = generation.to_uppercase();
    if gen.contains("DDR4") {
        if speed_mt >= 3200 {
            return "CL22-22-22";
        }
        if speed_mt >= 2933 {
            return "CL21-21-21";
        }
        if speed_mt >= 2666 {
            return "CL19-19-19";
        }
        if speed_mt >= 2400 {
            return "CL17-17-17";
        }
        if speed_mt >= 2133 {
            return "CL15-15-15";
        }
    } else if gen.contains("DDR5") {
        if speed_mt >= 6400 {
            return "CL52-52-52";
        }
        if speed_mt >= 6000 {
            return "CL48-48-48";
        }
        if speed_mt >= 5600 {
            return "CL46-46-46";
        }
        if speed_mt >= 5200 {
            return "CL42-42-42";
        }
        if speed_mt >= 4800 {
            return "CL40-39-39";
        }
    } else if gen.contains("DDR3") {
        if speed_mt >= 1866 {
            return "CL13-13-13";
        }
        if speed_mt >= 1600 {
            return "CL11-11-11";
        }
        if speed_mt >= 1333 {
            return "CL9-9-9";
        }
        if speed_mt >= 1066 {
            return "CL7-7-7";
        }
    }
    "Unknown"
}

/// Picks the best timing tuple on a line: the last candidate not followed by
/// a decimal point, preferring the first four-element candidate.
fn select_timing_tuple(line: &str) -> Option<String> {
    let mut selected: Option<String> = None;
    for caps in TIMING_TUPLE_RE.captures_iter(line) {
        if let Some(whole) = caps.get(0) {
            // Reject fragments of decimal numbers such as "1 35" in "1.35".
            if line.as_bytes().get(whole.end()) == Some(&b'.') {
                continue;
            }
            let parts: Vec<&str> = (1..=4)
                .filter_map(|i| caps.get(i).map(|g| g.as_str()))
                .collect();
            selected = Some(parts.join("-"));
            if caps.get(4).is_some() {
                break;
            }
        }
    }
    selected
}

/// Extracts JEDEC-overriding XMP/EXPO profiles from decoder output.
///
/// Profiles are keyed by speed; a timing tuple may appear on the profile
/// line itself or on a following line.
pub fn extract_profiles(text: &str) -> Vec<SpdProfile> {
    let mut profiles: Vec<SpdProfile> = Vec::new();
    let mut current: Option<usize> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.contains("---") {
            continue;
        }

        if (line.contains("XMP") || line.contains("EXPO")) && line.contains("MT/s") {
            if let Some(caps) = MT_SPEED_RE.captures(line) {
                let speed = format!("{} MT/s", &caps[1]);
                let profile = SpdProfile {
                    speed: speed.clone(),
                    kind: "XMP/EXPO".to_string(),
                    timings: select_timing_tuple(line),
                    description: line.to_string(),
                };
                match profiles.iter().position(|p| p.speed == speed) {
                    Some(pos) => {
                        profiles[pos] = profile;
                        current = Some(pos);
                    }
                    None => {
                        profiles.push(profile);
                        current = Some(profiles.len() - 1);
                    }
                }
                continue;
            }
        }

        // Timings for the active profile may trail on their own line.
        if let Some(idx) = current {
            if profiles[idx].timings.is_none() {
                if let Some(tuple) = select_timing_tuple(line) {
                    profiles[idx].timings = Some(tuple);
                }
            }
        }
    }

    profiles
}

fn parse_matrix_records(lines: &[&str]) -> Vec<RawFieldMap> {
    let mut header_index = None;
    let mut dimm_count = 0;

    for (idx, line) in lines.iter().enumerate() {
        if !line.contains('|') {
            continue;
        }
        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if parts.len() < 2 {
            continue;
        }
        let first_col = parts[0].to_lowercase();
        if first_col.starts_with("field")
            && parts[1..].iter().any(|col| col.to_lowercase().contains("dimm"))
        {
            header_index = Some(idx);
            dimm_count = parts.len() - 1;
            break;
        }
    }

    let Some(header_index) = header_index else {
        return Vec::new();
    };

    let mut dimms: Vec<RawFieldMap> = vec![RawFieldMap::new(); dimm_count];

    for line in &lines[header_index + 1..] {
        if is_section_header(line) {
            break;
        }
        if !line.contains('|') {
            continue;
        }

        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if parts.len() < 2 {
            continue;
        }

        let label_raw = parts[0].trim_end_matches(':');
        if label_raw.is_empty() || label_raw.starts_with('#') {
            continue;
        }

        let label_lower = label_raw.to_lowercase();
        if MATRIX_NOISE_LABELS.contains(&label_lower.as_str()) {
            debug!("skipping matrix noise row '{}'", label_raw);
            continue;
        }

        let (key, is_slot) = canonical_matrix_key(label_raw, &label_lower);

        // A short row is right-padded; a long row is truncated to the
        // column count fixed by the header.
        let mut values: Vec<&str> = parts[1..].to_vec();
        values.resize(dimm_count, "");

        for (i, raw_val) in values.iter().enumerate() {
            let val = raw_val.trim();
            if val.is_empty() {
                continue;
            }
            put(&mut dimms[i], &key, val);
            if is_slot {
                put(&mut dimms[i], "slot", val);
            }
        }
    }

    dimms.retain(|d| !d.is_empty());
    dimms
}

fn commit_block(
    pending: &mut RawFieldMap,
    block_slots: &mut Vec<String>,
    out: &mut Vec<RawFieldMap>,
) {
    if pending.is_empty() {
        block_slots.clear();
        return;
    }
    // A block that never derived slots is discarded; header-only sections
    // must not produce synthetic modules.
    if block_slots.is_empty() {
        pending.clear();
        return;
    }

    for slot in block_slots.iter() {
        let mut dimm = pending.clone();
        put(&mut dimm, "slot", slot);
        if dimm.contains_key("Guessing DIMM is in") {
            put(&mut dimm, "Guessing DIMM is in", slot);
        }
        out.push(dimm);
    }

    pending.clear();
    block_slots.clear();
}

fn parse_plain_records(lines: &[&str]) -> Vec<RawFieldMap> {
    let mut plain: Vec<RawFieldMap> = Vec::new();
    let mut pending = RawFieldMap::new();
    let mut block_slots: Vec<String> = Vec::new();
    let mut saw_header = false;

    for raw_line in lines {
        let line = raw_line.trim_end_matches('\r');
        let stripped = line.trim();
        if stripped.is_empty() {
            continue;
        }

        if stripped.starts_with("Decoding EEPROM") || stripped.starts_with("SPD data for") {
            commit_block(&mut pending, &mut block_slots, &mut plain);
            saw_header = true;
            // Slots come from "Guessing DIMM is in" inside the block, never
            // from the header line itself.
            continue;
        }

        if !saw_header {
            continue;
        }

        // Plain-text key/value lines use multi-space separation.
        let Some((key_part, val_part)) = line.split_once("  ") else {
            continue;
        };
        let key = key_part.trim().trim_end_matches(':');
        let val = val_part.trim();
        if key.is_empty() || val.is_empty() {
            continue;
        }
        if PLAIN_NOISE_KEYS.contains(&key) {
            continue;
        }

        let kl = key.to_lowercase();
        let vl = val.to_lowercase();

        if kl.contains("fundamental memory type") || kl.contains("memory type") {
            put(&mut pending, "generation", val);
        } else if kl.contains("module manufacturer") || kl.contains("module mfg") {
            put(&mut pending, "manufacturer", val);
        } else if kl.contains("dram manufacturer") {
            put(&mut pending, "dram_mfg", val);
        } else if (kl.contains("size") || kl.contains("capacity"))
            && (vl.contains("mb") || vl.contains("gb"))
        {
            put(&mut pending, "Module Capacity", val);
            put(&mut pending, "module_gb", val);
        } else if kl == "ranks" || kl.starts_with("ranks ") {
            put(&mut pending, "Ranks", val);
            put(&mut pending, "module_ranks", val);
        } else if kl.contains("sdram device width") {
            put(&mut pending, "SDRAM Device Width", val);
        } else if kl.contains("module nominal voltage") {
            put(&mut pending, "JEDEC_voltage", val);
        } else if kl.contains("minimum voltage") {
            put(&mut pending, "min_voltage", val);
        } else if kl.contains("maximum voltage") {
            put(&mut pending, "max_voltage", val);
        } else if kl.contains("configured voltage") {
            put(&mut pending, "configured_voltage", val);
        } else if kl.contains("configured memory speed") || kl.contains("configured speed") {
            put(&mut pending, "configured_speed", val);
        } else if kl.contains("part number") {
            put(&mut pending, "module_part_number", val);
        } else if kl.contains("xmp timings") {
            // Normalize "DDR4-3600 18-22-22" to "3600-18-22-22".
            if let Some((freq_part, timing_part)) = val.split_once(' ') {
                if let Some(caps) = TRAILING_NUMBER_RE.captures(freq_part) {
                    let timing = timing_part.trim().replace(' ', "-");
                    let summary = format!("{}-{}", &caps[1], timing);
                    put(&mut pending, "timings_xmp", &summary);
                }
            }
        } else if kl.contains("guessing dimm is in") {
            block_slots = derive_slots(val);
            put(&mut pending, "Guessing DIMM is in", val);
        } else {
            // Preserve remaining keys for downstream logic.
            put(&mut pending, key, val);
        }
    }

    commit_block(&mut pending, &mut block_slots, &mut plain);
    plain
}

/// Parses raw SPD-decoder output into per-module field maps.
///
/// Both grammars are recognized: the pipe-delimited matrix with one column
/// per module, and sequential "Decoding EEPROM"/"SPD data for" blocks with
/// multi-space key/value lines. Malformed lines are skipped, never fatal.
/// Matrix records come first, then plain-block records (fanned out to one
/// record per derived slot); a plain record is dropped when a matrix record
/// already claimed its slot. Output order is stable across repeated calls.
pub fn parse_decoder_output(text: &str) -> Vec<RawFieldMap> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let matrix = parse_matrix_records(&lines);
    let plain = parse_plain_records(&lines);
    debug!(
        "parsed {} matrix record(s) and {} plain-block record(s)",
        matrix.len(),
        plain.len()
    );

    let mut result: Vec<RawFieldMap> = Vec::new();
    let mut seen_slots: HashSet<String> = HashSet::new();
    for dimm in matrix.into_iter().chain(plain) {
        let slot = field_text(&dimm, "slot");
        if slot.is_empty() || seen_slots.contains(&slot) {
            continue;
        }
        seen_slots.insert(slot);
        result.push(dimm);
    }

    for dimm in &mut result {
        for field in DEFAULT_DIAGNOSTIC_FIELDS {
            dimm.entry(field).or_insert_with(|| Value::String(String::new()));
        }

        // Infer a timing class when only a configured speed was reported.
        let conf_speed = field_text(dimm, "configured_speed");
        let generation = field_text(dimm, "generation");
        if !conf_speed.is_empty() && !generation.is_empty() && !dimm.contains_key("timings") {
            if let Some(caps) = FIRST_NUMBER_RE.captures(&conf_speed) {
                if let Ok(speed_mt) = caps[1].parse::<u32>() {
                    put(dimm, "timings", infer_timings(speed_mt, &generation));
                }
            }
        }
    }

    if result.is_empty() {
        warn!("parse_decoder_output: no module records recognized in decoder output");
    } else {
        info!("parse_decoder_output: emitted {} module record(s)", result.len());
    }
    result
}

/// Collapses overlapping records to one logical entry per physical module.
///
/// Records are keyed by lowercase (slot, part number, manufacturer); the
/// first occurrence wins and original order is preserved. Records with an
/// entirely empty key are dropped.
pub fn deduplicate_dimms(dimms: Vec<RawFieldMap>) -> Vec<RawFieldMap> {
    let mut seen_keys: HashSet<(String, String, String)> = HashSet::new();
    let mut deduped = Vec::new();

    for dimm in dimms {
        let slot = field_text(&dimm, "slot").trim().to_lowercase();
        let part_number = field_text(&dimm, "module_part_number").trim().to_lowercase();
        let manufacturer = field_text(&dimm, "manufacturer").trim().to_lowercase();

        if slot.is_empty() && part_number.is_empty() && manufacturer.is_empty() {
            continue;
        }

        if seen_keys.insert((slot, part_number, manufacturer)) {
            deduped.push(dimm);
        }
    }

    deduped
}
