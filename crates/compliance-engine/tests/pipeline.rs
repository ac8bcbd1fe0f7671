mod common;

use std::sync::Arc;

use common::{engine, ScriptedService};
use pretty_assertions::assert_eq;
use serde_json::json;
use shared_types::{
    AnalysisResponse, ComplianceRecord, GeoComplianceFlag, Severity, StructuringQuality,
};

const ASSESSMENT: &str = r#"Here is my assessment:
```json
{
  "geolocation": "US-CA",
  "law": "California Age-Appropriate Design Code Act",
  "severity": "HIGH",
  "confidence": "0.8",
  "reasoning": "Location-based ad targeting of minors requires geo-specific controls",
  "potential_violations": ["Geolocation tracking of minors by default"],
  "recommendations": "Disable geo-fenced ads for users under 18 in California",
  "legal_references": ["Cal. Civ. Code 1798.99.28", "15 U.S.C. 6501-6506"]
}
```"#;

fn california() -> serde_json::Value {
    json!({ "country": "US", "continent": "North America", "state": "CA" })
}

#[tokio::test]
async fn test_geo_fence_ads_for_minors_in_california() {
    let service = Arc::new(
        ScriptedService::new()
            .with_region(california())
            .with_reply(ASSESSMENT),
    );
    let engine = engine(service.clone());

    let response = engine
        .analyze("Geo-fence ads for minors in California", Some("US"))
        .await;

    let AnalysisResponse::Success(report) = response else {
        panic!("expected success, got {response:?}");
    };

    assert!(report
        .normalized_text
        .contains("geo-fence (virtual geographic boundary"));
    assert_eq!(report.region.country.as_deref(), Some("US"));
    assert_eq!(report.region.continent.as_deref(), Some("North America"));
    assert_eq!(report.region.state.as_deref(), Some("US-CA"));
    assert_eq!(report.matched_regions, vec!["North America", "US", "US-CA"]);

    assert_eq!(report.structuring, StructuringQuality::Structured);
    assert_eq!(report.analysis.severity, Severity::High);
    assert_eq!(report.analysis.geolocation, "US-CA");
    assert!(!report.analysis.legal_references.is_empty());

    let calls = service.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].structured);
    assert!(calls[0].user.contains("Jurisdiction hint: US"));

    let prompt = &calls[1].user;
    assert!(!calls[1].structured);
    assert!(prompt.contains("Jurisdiction hint: US"));
    assert!(prompt.contains("geo-fence (virtual geographic boundary"));
    // US-only key survives, state keys override country keys
    assert!(prompt.contains("Federal Trade Commission"));
    assert!(prompt.contains("California Consumer Privacy Act"));
    assert!(prompt.contains("age_threshold: 18"));
    assert!(!prompt.contains("{KB_YAML_SNIPPETS}"));
}

#[tokio::test]
async fn test_empty_geolocation_stays_empty_and_is_not_required() {
    let service = Arc::new(
        ScriptedService::new()
            .with_region(california())
            .with_reply(
                r#"{"geolocation": "", "law": "None", "severity": "LOW", "reasoning": "No geo-specific law applies"}"#,
            ),
    );
    let engine = engine(service);

    let response = engine.analyze("Dark mode toggle", Some("US")).await;
    let AnalysisResponse::Success(report) = response else {
        panic!("expected success, got {response:?}");
    };
    assert_eq!(report.region.state.as_deref(), Some("US-CA"));
    assert_eq!(report.analysis.geolocation, "");
    assert_eq!(report.analysis.severity, Severity::Low);

    let rows = compliance_engine::summary::rows_from_records(&[report.analysis]);
    assert_eq!(rows[0].geolocation, "");
    assert_eq!(rows[0].geo_compliance_flag, GeoComplianceFlag::NotRequired);
}

#[tokio::test]
async fn test_empty_input_is_rejected_without_calls() {
    let service = Arc::new(ScriptedService::new());
    let engine = engine(service.clone());

    let response = engine.analyze("   \n\t", None).await;
    match response {
        AnalysisResponse::Error(envelope) => {
            assert!(envelope.error.contains("empty input"));
            assert!(!envelope.timestamp.is_empty());
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_resolution_failure_halts_before_assessment() {
    let service = Arc::new(
        ScriptedService::new()
            .with_region_failure("schema mismatch")
            .with_reply(ASSESSMENT),
    );
    let engine = engine(service.clone());

    let response = engine.analyze("Feature text", None).await;
    let AnalysisResponse::Error(envelope) = response else {
        panic!("expected error envelope");
    };
    assert!(envelope.error.contains("Region resolution failed"));
    assert_eq!(service.calls().len(), 1);
}

#[tokio::test]
async fn test_malformed_region_payload_halts() {
    let service = Arc::new(
        ScriptedService::new()
            .with_region(json!(["US", "CA"]))
            .with_reply(ASSESSMENT),
    );
    let engine = engine(service.clone());

    let response = engine.analyze("Feature text", None).await;
    assert!(!response.is_success());
    assert_eq!(service.calls().len(), 1);
}

#[tokio::test]
async fn test_assessment_failure_becomes_envelope() {
    let service = Arc::new(
        ScriptedService::new()
            .with_region(california())
            .with_reply_failure("overloaded"),
    );
    let engine = engine(service);

    let response = engine.analyze("Feature text", None).await;
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "error");
    assert!(json["error"].as_str().unwrap().contains("overloaded"));
}

#[tokio::test]
async fn test_unparseable_reply_is_failed_high_severity_record() {
    let service = Arc::new(
        ScriptedService::new()
            .with_region(california())
            .with_reply("{\"severity\": \"LOW\", \"law\": "),
    );
    let engine = engine(service);

    let response = engine.analyze("Feature text", None).await;
    let record = response.record().expect("record present");
    assert_eq!(record.severity, Severity::High);
    assert!(record.reasoning.starts_with("Error processing response"));
    match response {
        AnalysisResponse::Success(report) => {
            assert_eq!(report.structuring, StructuringQuality::Failed)
        }
        AnalysisResponse::Error(_) => panic!("structuring failure is not an envelope"),
    }
}

#[tokio::test]
async fn test_line_reply_is_recovered() {
    let service = Arc::new(
        ScriptedService::new()
            .with_region(california())
            .with_reply("Severity: MEDIUM\nLaw: CCPA\nGeolocation: US-CA"),
    );
    let engine = engine(service);

    let response = engine.analyze("Feature text", None).await;
    let AnalysisResponse::Success(report) = response else {
        panic!("expected success");
    };
    assert_eq!(report.structuring, StructuringQuality::Recovered);
    assert_eq!(report.analysis.severity, Severity::Medium);
    assert_eq!(report.analysis.law, "CCPA");
}

#[tokio::test]
async fn test_unknown_region_has_empty_snippet() {
    let service = Arc::new(
        ScriptedService::new()
            .with_region(json!({ "country": "BR", "continent": "South America", "state": null }))
            .with_reply("{\"severity\": \"LOW\", \"geolocation\": \"Brazil\"}"),
    );
    let engine = engine(service.clone());

    let response = engine.analyze("Feature text", None).await;
    let AnalysisResponse::Success(report) = response else {
        panic!("expected success");
    };
    assert!(report.matched_regions.is_empty());
    assert_eq!(report.analysis.geolocation, "Brazil");
    assert!(service.calls()[1]
        .user
        .contains("Applicable legal knowledge base (YAML):\n\n"));
}

fn stored_record(geolocation: &str) -> ComplianceRecord {
    ComplianceRecord {
        geolocation: geolocation.to_string(),
        law: "CCPA".to_string(),
        severity: Severity::High,
        legal_references: vec!["Cal. Civ. Code 1798.100".to_string()],
        ..ComplianceRecord::default()
    }
}

#[tokio::test]
async fn test_summary_keeps_record_geolocation() {
    let service = Arc::new(ScriptedService::new().with_reply(
        r#"```json
[{"feature": "Geo ads", "law": "CCPA", "severity": "HIGH", "reasoning": "minors targeted"},
 {"feature": "Feed", "geolocation": "Global", "severity": "LOW"}]
```"#,
    ));
    let engine = engine(service.clone());

    let rows = engine
        .summarize(&[stored_record("US-CA"), stored_record("")])
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].geolocation, "US-CA");
    assert_eq!(rows[0].reasoning, "minors targeted");
    assert_eq!(rows[0].geo_compliance_flag, GeoComplianceFlag::Required);
    assert_eq!(rows[0].extra.get("feature").map(String::as_str), Some("Geo ads"));
    assert_eq!(rows[1].geolocation, "Global");
    assert_eq!(rows[1].severity, Severity::Low);

    let calls = service.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].user.contains("Cal. Civ. Code 1798.100"));
}

#[tokio::test]
async fn test_summary_falls_back_to_records_on_prose() {
    let service = Arc::new(ScriptedService::new().with_reply("I cannot summarize this."));
    let engine = engine(service);

    let rows = engine.summarize(&[stored_record("US-CA")]).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].law, "CCPA");
    assert_eq!(rows[0].geolocation, "US-CA");
}

#[tokio::test]
async fn test_summary_call_failure_is_error() {
    let service = Arc::new(ScriptedService::new().with_reply_failure("down"));
    let engine = engine(service);

    let err = engine.summarize(&[stored_record("US")]).await.unwrap_err();
    assert!(matches!(
        err,
        compliance_engine::EngineError::AssessmentCall(_)
    ));
}

#[tokio::test]
async fn test_summary_of_nothing_makes_no_call() {
    let service = Arc::new(ScriptedService::new());
    let engine = engine(service.clone());

    let csv = engine.summarize_csv(&[]).await.unwrap();
    assert_eq!(
        csv,
        "geolocation,severity,law,reasoning,potential_violations,recommendations,legal_references,geo_compliance_flag\n"
    );
    assert!(service.calls().is_empty());
}
