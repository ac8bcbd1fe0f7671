//! Summary rows and CSV export

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use shared_types::{ComplianceRecord, GeoComplianceFlag, Severity, SummaryRow};

use crate::structurer::{value_list, value_text};

/// Fixed CSV columns, in order
pub const SUMMARY_COLUMNS: [&str; 8] = [
    "geolocation",
    "severity",
    "law",
    "reasoning",
    "potential_violations",
    "recommendations",
    "legal_references",
    "geo_compliance_flag",
];

/// Row keys that are derived or aliased instead of carried as extra columns
const CONSUMED_KEYS: [&str; 4] = ["geo_compliance_flag", "geo_flag", "regulations", "citations"];

/// Merge one summarizer row with the record it summarizes.
///
/// The record's geolocation is authoritative. Other fields take the
/// summarizer's value when it is non-empty and otherwise keep the
/// record's. Unrecognized keys become extra columns.
pub fn merge_summary(record: &ComplianceRecord, row: &Map<String, Value>) -> SummaryRow {
    let text = |key: &str| row.get(key).and_then(value_text);
    let pick = |key: &str, fallback: &str| text(key).unwrap_or_else(|| fallback.to_string());

    let geolocation = if record.has_geolocation() {
        record.geolocation.clone()
    } else {
        text("geolocation").unwrap_or_default()
    };

    let severity = text("severity")
        .and_then(|s| Severity::parse(&s))
        .unwrap_or(record.severity);

    let legal_references = ["legal_references", "regulations", "citations"]
        .iter()
        .filter_map(|key| row.get(*key))
        .map(value_list)
        .find(|refs| !refs.is_empty())
        .unwrap_or_else(|| record.legal_references.clone());

    let extra: BTreeMap<String, String> = row
        .iter()
        .filter(|(key, _)| {
            !SUMMARY_COLUMNS.contains(&key.as_str()) && !CONSUMED_KEYS.contains(&key.as_str())
        })
        .filter_map(|(key, value)| value_text(value).map(|text| (key.clone(), text)))
        .collect();

    SummaryRow {
        geo_compliance_flag: GeoComplianceFlag::from_geolocation(&geolocation),
        geolocation,
        severity,
        law: pick("law", &record.law),
        reasoning: pick("reasoning", &record.reasoning),
        potential_violations: pick("potential_violations", &record.potential_violations),
        recommendations: pick("recommendations", &record.recommendations),
        legal_references,
        extra,
    }
}

/// Rows built from records alone, without a summarizer pass
pub fn rows_from_records(records: &[ComplianceRecord]) -> Vec<SummaryRow> {
    let empty = Map::new();
    records
        .iter()
        .map(|record| merge_summary(record, &empty))
        .collect()
}

/// Pair summarizer rows with records by position.
///
/// Records without a row keep their own fields; rows beyond the last record
/// are merged against an empty record.
pub fn pair_rows(records: &[ComplianceRecord], rows: &[Map<String, Value>]) -> Vec<SummaryRow> {
    let blank_record = ComplianceRecord::default();
    let blank_row = Map::new();
    (0..records.len().max(rows.len()))
        .map(|i| {
            merge_summary(
                records.get(i).unwrap_or(&blank_record),
                rows.get(i).unwrap_or(&blank_row),
            )
        })
        .collect()
}

/// Render rows as CSV: the fixed header, then extra columns in first-seen order
pub fn to_csv(rows: &[SummaryRow]) -> String {
    let mut extra_columns: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.extra.keys() {
            if !extra_columns.contains(&key.as_str()) {
                extra_columns.push(key);
            }
        }
    }

    let mut out = String::new();
    let header: Vec<&str> = SUMMARY_COLUMNS
        .iter()
        .copied()
        .chain(extra_columns.iter().copied())
        .collect();
    write_record(&mut out, header.iter().copied());

    for row in rows {
        let references = row.legal_references.join("; ");
        let fixed = [
            row.geolocation.as_str(),
            row.severity.as_str(),
            row.law.as_str(),
            row.reasoning.as_str(),
            row.potential_violations.as_str(),
            row.recommendations.as_str(),
            references.as_str(),
            row.geo_compliance_flag.as_str(),
        ];
        let extra = extra_columns
            .iter()
            .map(|column| row.extra.get(*column).map(String::as_str).unwrap_or_default());
        write_record(&mut out, fixed.into_iter().chain(extra));
    }
    out
}

fn write_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}
