use serde::{Deserialize, Serialize};
use std::fmt;

use super::finding::{Finding, Severity, SystemNote};

/// 风险等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        };
        f.write_str(s)
    }
}

/// 合规评分结果，每次评分生成一次，之后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub score: u32,
    pub risk_level: RiskLevel,
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub notes: Vec<SystemNote>,
}

impl ComplianceResult {
    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    pub fn has_kind(&self, name: &str) -> bool {
        self.findings.iter().any(|f| f.kind.name() == name)
    }
}
