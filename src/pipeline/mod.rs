pub mod processing;

use tracing::info;

use crate::domain::ClassifiedDimm;
use self::processing::normalize::normalize_record;
use self::processing::parser::{deduplicate_dimms, parse_decoder_output};
use self::processing::resolve::{classify, RuleDatabase};

/// Runs the full analysis pass over one decoder report: parse both report
/// grammars, collapse overlapping records, normalize each record, and
/// classify it against the rule database. Output order follows the parser's
/// ordering guarantee.
pub fn analyze_report(text: &str, db: &RuleDatabase) -> Vec<ClassifiedDimm> {
    let records = deduplicate_dimms(parse_decoder_output(text));

    let classified: Vec<ClassifiedDimm> = records
        .iter()
        .map(|raw| {
            let dimm = normalize_record(raw);
            let classification = classify(&dimm, db);
            ClassifiedDimm {
                dimm,
                classification,
            }
        })
        .collect();

    info!("analyze_report: classified {} module(s)", classified.len());
    classified
}
