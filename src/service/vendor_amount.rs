use bigdecimal::ToPrimitive;
use chrono::Days;

use crate::config::VendorAmountConfig;
use crate::corpus::HistoricalCorpus;
use crate::models::{Finding, FindingKind, FindingLocation, InvoiceRecord, Severity};

/// 同一供应商金额异常：总金额超过回看窗口内历史均值的若干倍
pub struct VendorAmountCheck<'a> {
    config: &'a VendorAmountConfig,
}

impl<'a> VendorAmountCheck<'a> {
    pub fn new(config: &'a VendorAmountConfig) -> Self {
        Self { config }
    }

    pub fn check(&self, record: &InvoiceRecord, corpus: &dyn HistoricalCorpus) -> Vec<Finding> {
        let from = record
            .invoice_date
            .checked_sub_days(Days::new(self.config.lookback_days))
            .unwrap_or(chrono::NaiveDate::MIN);
        let number = record.normalized_invoice_number();

        let amounts: Vec<f64> = corpus
            .find_by_vendor_and_date_range(&record.vendor_name, from, record.invoice_date)
            .iter()
            .filter(|prior| prior.record.normalized_invoice_number() != number)
            .filter_map(|prior| prior.record.total_amount.to_f64())
            .collect();
        if amounts.len() < self.config.min_history.max(1) {
            return Vec::new();
        }

        let mean = amounts.iter().sum::<f64>() / amounts.len() as f64;
        let current = record.total_amount.to_f64().unwrap_or(0.0);
        if mean <= 0.0 || current <= mean * self.config.multiple {
            return Vec::new();
        }

        vec![Finding::new(
            FindingKind::UnusualVendorAmount {
                vendor_mean: mean,
                history: amounts.len(),
            },
            Severity::Medium,
            FindingLocation::Invoice,
            format!(
                "total {} is {:.1}x the average {:.2} of {} prior invoices from '{}'",
                record.total_amount,
                current / mean,
                mean,
                amounts.len(),
                record.vendor_name
            ),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::MemoryCorpus;
    use crate::models::invoice::fixtures::*;

    fn history(corpus: &MemoryCorpus, amounts: &[&str]) {
        for (i, amount) in amounts.iter().enumerate() {
            let mut record = acme_invoice();
            record.invoice_number = format!("OLD-{}", i);
            record.total_amount = dec(amount);
            record.invoice_date = date(2024, 1, 10 + i as u32);
            corpus.insert(record);
        }
    }

    #[test]
    fn test_flags_large_jump() {
        let config = VendorAmountConfig::default();
        let corpus = MemoryCorpus::new();
        history(&corpus, &["300", "350", "400"]);

        let findings = VendorAmountCheck::new(&config).check(&acme_invoice(), &corpus);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
    }

    #[test]
    fn test_needs_minimum_history() {
        let config = VendorAmountConfig::default();
        let corpus = MemoryCorpus::new();
        history(&corpus, &["100", "100"]);
        assert!(VendorAmountCheck::new(&config).check(&acme_invoice(), &corpus).is_empty());
    }

    #[test]
    fn test_normal_amount_passes() {
        let config = VendorAmountConfig::default();
        let corpus = MemoryCorpus::new();
        history(&corpus, &["1000", "1200", "900"]);
        assert!(VendorAmountCheck::new(&config).check(&acme_invoice(), &corpus).is_empty());
    }
}
