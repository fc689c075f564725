use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::str::FromStr;
use std::sync::Arc;

use invoice_risk_engine::config::EngineConfig;
use invoice_risk_engine::models::{
    FindingKind, InvoiceRecord, LineItem, RateTable, RiskLevel, Severity,
};
use invoice_risk_engine::verification::VerificationOutcome;
use invoice_risk_engine::{ComplianceEngine, MemoryCorpus};

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn line(code: &str, qty: &str, price: &str, total: &str) -> LineItem {
    LineItem {
        description: "item".to_string(),
        code: code.to_string(),
        declared_rate: dec("18"),
        quantity: dec(qty),
        unit_price: dec(price),
        line_total: dec(total),
    }
}

fn invoice(number: &str, vendor: &str, on: NaiveDate, items: Vec<LineItem>, total: &str) -> InvoiceRecord {
    InvoiceRecord {
        invoice_number: number.to_string(),
        vendor_name: vendor.to_string(),
        vendor_tax_id: Some("27AAPFU0939F1ZV".to_string()),
        buyer_tax_id: None,
        invoice_date: on,
        total_amount: dec(total),
        line_items: items,
        extraction_confidence: 0.98,
    }
}

fn engine() -> ComplianceEngine {
    let table = RateTable::new()
        .with_rates("HSN1", &[5, 12, 18])
        .with_rates("8471", &[18]);
    ComplianceEngine::new(EngineConfig::default(), Arc::new(table))
}

/// 同编码的历史单价样本，来自不同供应商、不同日期
fn corpus_with_price_history() -> MemoryCorpus {
    let corpus = MemoryCorpus::new();
    for (i, price) in ["90", "95", "100", "100", "105", "110", "100"].iter().enumerate() {
        let mut record = invoice(
            &format!("H-{}", i),
            &format!("History Vendor {}", i),
            date(2023, 1, 1 + i as u32 * 3),
            vec![line("8471", "1", price, "0")],
            "0",
        );
        record.vendor_tax_id = None;
        corpus.insert(record);
    }
    corpus
}

#[test]
fn test_valid_invoice_against_empty_corpus() {
    let corpus = MemoryCorpus::new();
    let record = invoice("INV-1", "Umbrella Traders", date(2024, 5, 2), vec![line("HSN1", "10", "100", "1180")], "1180");

    let result = engine()
        .score(&record, &corpus.snapshot(), &VerificationOutcome::NotConfigured)
        .unwrap();
    assert!(!result.has_kind("DuplicateInvoice"));
    assert!(!result.has_kind("ArithmeticError"));
    assert!(!result.has_kind("InvalidTaxId"));
    assert_eq!(result.score, 100);
    assert_eq!(result.risk_level, RiskLevel::Low);
}

#[test]
fn test_line_total_mismatch_is_single_high_finding() {
    let corpus = MemoryCorpus::new();
    let record = invoice("INV-2", "Umbrella Traders", date(2024, 5, 2), vec![line("HSN1", "10", "100", "1500")], "1500");

    let result = engine()
        .score(&record, &corpus.snapshot(), &VerificationOutcome::NotConfigured)
        .unwrap();
    assert_eq!(result.findings.len(), 1);
    let finding = &result.findings[0];
    assert_eq!(finding.severity, Severity::High);
    match &finding.kind {
        FindingKind::ArithmeticError { expected, actual, .. } => {
            assert_eq!(expected.as_ref(), Some(&dec("1180")));
            assert_eq!(actual, &dec("1500"));
        }
        other => panic!("unexpected finding {:?}", other),
    }
    assert_eq!(result.score, 75);
    assert_eq!(result.risk_level, RiskLevel::Medium);
}

#[test]
fn test_scoring_is_idempotent() {
    let corpus = corpus_with_price_history();
    let record = invoice("INV-3", "Umbrella Traders", date(2024, 5, 2), vec![line("8471", "1", "400", "472")], "472");
    let engine = engine();
    let snapshot = corpus.snapshot();

    let first = engine.score(&record, &snapshot, &VerificationOutcome::NotConfigured).unwrap();
    let second = engine.score(&record, &snapshot, &VerificationOutcome::NotConfigured).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_duplicate_detected_after_insert() {
    let corpus = MemoryCorpus::new();
    let engine = engine();
    let first = invoice("INV-9", "Umbrella Traders", date(2024, 5, 2), vec![line("HSN1", "10", "100", "1180")], "1180");

    let before = engine.score(&first, &corpus.snapshot(), &VerificationOutcome::NotConfigured).unwrap();
    assert!(!before.has_kind("DuplicateInvoice"));
    let id = corpus.insert(first.clone());

    let mut resubmitted = first.clone();
    resubmitted.invoice_number = " inv-9 ".to_string();
    resubmitted.vendor_name = "UMBRELLA  traders".to_string();
    let after = engine
        .score(&resubmitted, &corpus.snapshot(), &VerificationOutcome::NotConfigured)
        .unwrap();
    let duplicate = after
        .findings
        .iter()
        .find(|f| f.kind.name() == "DuplicateInvoice")
        .unwrap();
    assert_eq!(duplicate.severity, Severity::High);
    assert!(matches!(
        duplicate.kind,
        FindingKind::DuplicateInvoice { matched_record_id, exact: true, .. } if matched_record_id == id
    ));
}

#[test]
fn test_near_duplicate_within_window() {
    let corpus = MemoryCorpus::new();
    corpus.insert(invoice("INV-10", "Umbrella Traders", date(2024, 5, 2), vec![line("HSN1", "10", "100", "1180")], "1180"));

    let record = invoice("INV-10A", "Umbrella Traders", date(2024, 5, 4), vec![line("HSN1", "10", "100", "1180")], "1180");
    let result = engine()
        .score(&record, &corpus.snapshot(), &VerificationOutcome::NotConfigured)
        .unwrap();
    let duplicate = result
        .findings
        .iter()
        .find(|f| f.kind.name() == "DuplicateInvoice")
        .unwrap();
    assert_eq!(duplicate.severity, Severity::Medium);

    let far = invoice("INV-10B", "Umbrella Traders", date(2024, 5, 20), vec![line("HSN1", "10", "100", "1180")], "1180");
    let result = engine()
        .score(&far, &corpus.snapshot(), &VerificationOutcome::NotConfigured)
        .unwrap();
    assert!(!result.has_kind("DuplicateInvoice"));
}

#[test]
fn test_outlier_severity_grows_with_distance() {
    let corpus = corpus_with_price_history();
    let engine = engine();
    let snapshot = corpus.snapshot();

    let outlier = |price: &str, total: &str| {
        let record = invoice("INV-4", "Umbrella Traders", date(2024, 5, 2), vec![line("8471", "1", price, total)], total);
        let result = engine.score(&record, &snapshot, &VerificationOutcome::NotConfigured).unwrap();
        result
            .findings
            .into_iter()
            .find(|f| f.kind.name() == "PriceOutlier")
    };

    assert!(outlier("102", "120.36").is_none());

    let near = outlier("130", "153.4").unwrap();
    let far = outlier("400", "472").unwrap();
    assert_eq!(near.severity, Severity::Medium);
    assert_eq!(far.severity, Severity::High);

    let multiple = |kind: &FindingKind| match kind {
        FindingKind::PriceOutlier { deviation, .. } => deviation.deviation_multiple,
        _ => unreachable!(),
    };
    assert!(multiple(&far.kind) > multiple(&near.kind));
}

#[test]
fn test_score_floors_at_zero() {
    let corpus = MemoryCorpus::new();
    let mut record = invoice(
        "INV-5",
        "Umbrella Traders",
        date(2024, 5, 2),
        vec![
            line("HSN1", "10", "100", "1500"),
            line("HSN1", "10", "100", "1600"),
            line("HSN1", "10", "100", "1700"),
        ],
        "9999",
    );
    record.vendor_tax_id = Some("29AABCT1332L1ZT".to_string());

    let result = engine()
        .score(&record, &corpus.snapshot(), &VerificationOutcome::NotConfigured)
        .unwrap();
    assert!(result.count_by_severity(Severity::High) >= 4);
    assert_eq!(result.score, 0);
    assert_eq!(result.risk_level, RiskLevel::High);
}

#[test]
fn test_batch_snapshot_excludes_same_batch_records() {
    let corpus = MemoryCorpus::new();
    let engine = engine();
    let record = invoice("INV-6", "Umbrella Traders", date(2024, 5, 2), vec![line("HSN1", "10", "100", "1180")], "1180");
    let records = vec![record.clone(), record];

    let results = engine.score_batch(&records, &corpus.snapshot(), &[]);
    for result in &results {
        assert!(!result.as_ref().unwrap().has_kind("DuplicateInvoice"));
    }
}

#[test]
fn test_tax_id_reuse_matches_prefixed_history() {
    let corpus = MemoryCorpus::new();
    let mut prior = invoice("A-1", "Acme Co", date(2024, 1, 10), vec![line("HSN1", "1", "1000", "1180")], "1180");
    prior.vendor_tax_id = Some("GSTIN:27AAPFU0939F1ZV".to_string());
    corpus.insert(prior);

    let record = invoice("G-1", "Globex", date(2024, 5, 2), vec![line("HSN1", "1", "1000", "1180")], "1180");
    let result = engine()
        .score(&record, &corpus.snapshot(), &VerificationOutcome::NotConfigured)
        .unwrap();
    let kinds: Vec<_> = result.findings.iter().map(|f| f.kind.name()).collect();
    assert_eq!(kinds, vec!["TaxIdVendorMismatch"]);
    assert_eq!(result.score, 88);
}

#[test]
fn test_total_without_line_items_is_flagged() {
    let corpus = MemoryCorpus::new();
    let record = invoice("INV-7", "Umbrella Traders", date(2024, 5, 2), vec![], "1180");
    let result = engine()
        .score(&record, &corpus.snapshot(), &VerificationOutcome::NotConfigured)
        .unwrap();
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].kind.name(), "ArithmeticError");
    assert_eq!(result.findings[0].severity, Severity::High);
    assert_eq!(result.score, 75);
}
