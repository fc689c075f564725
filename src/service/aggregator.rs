use crate::config::{PenaltyConfig, RiskBandConfig};
use crate::models::{ComplianceResult, Finding, RiskLevel, Severity, SystemNote};

const MAX_SCORE: u32 = 100;

/// 风险汇总：100 分起扣，最低 0 分
pub struct RiskAggregator<'a> {
    penalties: &'a PenaltyConfig,
    bands: &'a RiskBandConfig,
}

impl<'a> RiskAggregator<'a> {
    pub fn new(penalties: &'a PenaltyConfig, bands: &'a RiskBandConfig) -> Self {
        Self { penalties, bands }
    }

    pub fn penalty(&self, severity: Severity) -> u32 {
        match severity {
            Severity::High => self.penalties.high,
            Severity::Medium => self.penalties.medium,
            Severity::Low => self.penalties.low,
        }
    }

    pub fn risk_level(&self, score: u32) -> RiskLevel {
        if score >= self.bands.low_risk_min {
            RiskLevel::Low
        } else if score >= self.bands.medium_risk_min {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    /// 发现顺序原样保留；系统提示不扣分
    pub fn aggregate(&self, findings: Vec<Finding>, notes: Vec<SystemNote>) -> ComplianceResult {
        let deducted = findings
            .iter()
            .fold(0u32, |acc, f| acc.saturating_add(self.penalty(f.severity)));
        let score = MAX_SCORE.saturating_sub(deducted);

        ComplianceResult {
            score,
            risk_level: self.risk_level(score),
            findings,
            notes,
        }
    }
}
