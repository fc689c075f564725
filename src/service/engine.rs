use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;

use super::{
    ArithmeticVerifier, DuplicateDetector, IdentifierValidator, PriceOutlierDetector,
    RateCodeChecker, RiskAggregator, VendorAmountCheck,
};
use crate::config::EngineConfig;
use crate::corpus::HistoricalCorpus;
use crate::error::EngineError;
use crate::models::{ComplianceResult, InvoiceRecord, RateTable, RiskLevel, Severity, SystemNote};
use crate::verification::VerificationOutcome;

/// 合规评分引擎
///
/// 同步、无副作用：输入为只读发票与语料快照，输出新的评分结果。
/// 检测顺序 (即结果中发现的顺序)：
/// 税号 -> 金额复算 -> 重复发票 -> 编码税率 -> 单价离群 -> 供应商金额异常
pub struct ComplianceEngine {
    config: EngineConfig,
    rate_table: Arc<RateTable>,
}

impl ComplianceEngine {
    pub fn new(config: EngineConfig, rate_table: Arc<RateTable>) -> Self {
        Self { config, rate_table }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 单张发票评分，仅输入形态错误会导致失败
    pub fn score(
        &self,
        record: &InvoiceRecord,
        corpus: &dyn HistoricalCorpus,
        verification: &VerificationOutcome,
    ) -> Result<ComplianceResult, EngineError> {
        record.validate()?;

        let mut findings = Vec::new();
        let mut notes = Vec::new();

        // 1. 税号
        findings.extend(IdentifierValidator::validate(
            record.vendor_tax_id.as_deref(),
            Some(&record.vendor_name),
            verification.verdict(),
        ));
        findings.extend(IdentifierValidator::validate_buyer(record.buyer_tax_id.as_deref()));
        findings.extend(IdentifierValidator::check_reuse(
            record.vendor_tax_id.as_deref(),
            &record.vendor_name,
            corpus,
        ));
        if let VerificationOutcome::Unavailable(reason) = verification {
            notes.push(SystemNote::low(format!(
                "tax id registry unavailable ({}), structure-only validation applied",
                reason
            )));
        }

        // 2. 金额复算
        findings.extend(
            ArithmeticVerifier::new(&self.config.arithmetic)
                .verify(&record.line_items, &record.total_amount),
        );

        // 3. 重复发票
        findings.extend(DuplicateDetector::new(&self.config.duplicate).detect(record, corpus));

        // 4. 编码税率
        findings.extend(RateCodeChecker::check(&record.line_items, &self.rate_table));

        // 5. 单价离群
        findings.extend(PriceOutlierDetector::new(&self.config.outlier).detect(&record.line_items, corpus));

        // 6. 供应商金额异常
        findings.extend(VendorAmountCheck::new(&self.config.vendor_amount).check(record, corpus));

        if record.extraction_confidence < self.config.low_confidence {
            tracing::warn!(
                "invoice {} extracted with low confidence {:.2}",
                record.invoice_number, record.extraction_confidence
            );
            notes.push(SystemNote::low(format!(
                "low extraction confidence {:.2}",
                record.extraction_confidence
            )));
        }

        let result = RiskAggregator::new(&self.config.penalties, &self.config.bands)
            .aggregate(findings, notes);

        tracing::debug!(
            "invoice {} from '{}': score {} ({}), {} findings",
            record.invoice_number,
            record.vendor_name,
            result.score,
            result.risk_level,
            result.findings.len()
        );

        Ok(result)
    }

    /// 并行批量评分，结果与输入一一对应；缺少的查询结果按未配置处理
    pub fn score_batch(
        &self,
        records: &[InvoiceRecord],
        corpus: &dyn HistoricalCorpus,
        outcomes: &[VerificationOutcome],
    ) -> Vec<Result<ComplianceResult, EngineError>> {
        records
            .par_iter()
            .enumerate()
            .map(|(i, record)| {
                let outcome = outcomes.get(i).unwrap_or(&VerificationOutcome::NotConfigured);
                self.score(record, corpus, outcome)
            })
            .collect()
    }
}

/// 批量评分统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub scored: usize,
    pub rejected: usize,
    pub low_risk: usize,
    pub medium_risk: usize,
    pub high_risk: usize,
    pub high_findings: usize,
    pub medium_findings: usize,
    pub low_findings: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[Result<ComplianceResult, EngineError>]) -> Self {
        let mut summary = Self::default();
        for result in results {
            let Ok(result) = result else {
                summary.rejected += 1;
                continue;
            };
            summary.scored += 1;
            match result.risk_level {
                RiskLevel::Low => summary.low_risk += 1,
                RiskLevel::Medium => summary.medium_risk += 1,
                RiskLevel::High => summary.high_risk += 1,
            }
            summary.high_findings += result.count_by_severity(Severity::High);
            summary.medium_findings += result.count_by_severity(Severity::Medium);
            summary.low_findings += result.count_by_severity(Severity::Low);
        }
        summary
    }
}
