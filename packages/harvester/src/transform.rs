//! Mapping of raw API records to normalized output rows.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::types::{NormalizedRow, RawRecord};
use crate::value::parse_amount;

/// Municipality id inside a detail link: `municipio=<digits>`.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static MUNICIPALITY_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"municipio=(\d+)").expect("valid regex"));

/// Extract the numeric municipality id from a detail link.
///
/// Returns an empty string when the link is empty or carries no id.
///
/// # Examples
/// ```
/// use transparencia_harvester::transform::extract_municipality_id;
///
/// assert_eq!(extract_municipality_id("/consulta?municipio=3304557&x=1"), "3304557");
/// assert_eq!(extract_municipality_id(""), "");
/// ```
pub fn extract_municipality_id(link: &str) -> String {
    MUNICIPALITY_ID_PATTERN
        .captures(link)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Text form of a loosely typed field. Missing and null become empty.
fn field_text(record: &RawRecord, key: &str) -> String {
    match record.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn field_amount(record: &RawRecord, key: &str) -> f64 {
    match record.get(key) {
        Some(Value::String(s)) => parse_amount(s),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Transform one raw record into a normalized row.
///
/// Pure: missing keys become empty values and never fail.
pub fn transform_record(record: &RawRecord) -> NormalizedRow {
    NormalizedRow {
        region_code: field_text(record, "uf"),
        municipality: field_text(record, "municipio"),
        year: field_text(record, "ano"),
        amount: field_amount(record, "valor"),
        beneficiary_key: field_text(record, "skBeneficiario"),
        beneficiary_name: field_text(record, "nomeBeneficiario"),
        benefit_id: field_text(record, "nisBeneficio"),
        document_id: field_text(record, "cpfBeneficiario"),
        accessible_format: field_text(record, "linguagemCidada"),
        municipality_id: extract_municipality_id(&field_text(record, "linkDetalhamento")),
    }
}
