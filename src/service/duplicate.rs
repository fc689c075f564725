use bigdecimal::ToPrimitive;
use chrono::Days;

use crate::config::DuplicateConfig;
use crate::corpus::{HistoricalCorpus, StoredRecord};
use crate::models::{Finding, FindingKind, FindingLocation, InvoiceRecord, Severity};

/// 重复发票检测
pub struct DuplicateDetector<'a> {
    config: &'a DuplicateConfig,
}

/// 近似重复候选 (日期差, 金额差, id) 依次比较
struct NearCandidate {
    day_gap: i64,
    amount_gap: f64,
    prior: StoredRecord,
}

impl<'a> DuplicateDetector<'a> {
    pub fn new(config: &'a DuplicateConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, record: &InvoiceRecord, corpus: &dyn HistoricalCorpus) -> Vec<Finding> {
        let mut findings = Vec::new();

        // 精确匹配：O(1) 键索引
        if let Some(prior) =
            corpus.find_by_vendor_and_invoice_number(&record.vendor_name, &record.invoice_number)
        {
            findings.push(Finding::new(
                FindingKind::DuplicateInvoice {
                    matched_record_id: prior.id,
                    matched_invoice_number: prior.record.invoice_number.clone(),
                    exact: true,
                },
                Severity::High,
                Finding::field("invoice_number"),
                format!(
                    "invoice {} from '{}' was already submitted (record {}, dated {})",
                    record.invoice_number, record.vendor_name, prior.id, prior.record.invoice_date
                ),
            ));
        }

        if let Some(near) = self.closest_near_match(record, corpus) {
            findings.push(Finding::new(
                FindingKind::DuplicateInvoice {
                    matched_record_id: near.prior.id,
                    matched_invoice_number: near.prior.record.invoice_number.clone(),
                    exact: false,
                },
                Severity::Medium,
                FindingLocation::Invoice,
                format!(
                    "possible resubmission: invoice {} ({} on {}) matches {} ({} on {})",
                    record.invoice_number,
                    record.total_amount,
                    record.invoice_date,
                    near.prior.record.invoice_number,
                    near.prior.record.total_amount,
                    near.prior.record.invoice_date
                ),
            ));
        }

        findings
    }

    /// 近似匹配：同供应商、金额差 ≤ 1%、日期窗口内、发票号不同；只扫描供应商日期索引
    fn closest_near_match(
        &self,
        record: &InvoiceRecord,
        corpus: &dyn HistoricalCorpus,
    ) -> Option<NearCandidate> {
        let window = Days::new(self.config.date_window_days);
        let from = record.invoice_date.checked_sub_days(window).unwrap_or(chrono::NaiveDate::MIN);
        let to = record.invoice_date.checked_add_days(window).unwrap_or(chrono::NaiveDate::MAX);

        let number = record.normalized_invoice_number();
        let amount = record.total_amount.to_f64().unwrap_or(0.0);

        corpus
            .find_by_vendor_and_date_range(&record.vendor_name, from, to)
            .into_iter()
            .filter(|prior| prior.record.normalized_invoice_number() != number)
            .filter_map(|prior| {
                let prior_amount = prior.record.total_amount.to_f64().unwrap_or(0.0);
                let amount_gap = (amount - prior_amount).abs();
                let scale = amount.abs().max(prior_amount.abs());
                if amount_gap > scale * self.config.amount_tolerance_ratio {
                    return None;
                }
                let day_gap = (record.invoice_date - prior.record.invoice_date).num_days().abs();
                Some(NearCandidate {
                    day_gap,
                    amount_gap,
                    prior,
                })
            })
            .min_by(|a, b| {
                a.day_gap
                    .cmp(&b.day_gap)
                    .then_with(|| a.amount_gap.total_cmp(&b.amount_gap))
                    .then_with(|| a.prior.id.cmp(&b.prior.id))
            })
    }
}
