use bigdecimal::{BigDecimal, ToPrimitive, Zero};

use crate::config::ArithmeticConfig;
use crate::models::{Finding, FindingKind, FindingLocation, LineItem, Severity};

/// 金额复算
pub struct ArithmeticVerifier<'a> {
    config: &'a ArithmeticConfig,
}

impl<'a> ArithmeticVerifier<'a> {
    pub fn new(config: &'a ArithmeticConfig) -> Self {
        Self { config }
    }

    /// 明细行：数量 × 单价 × (1 + 税率/100) 与行金额比对；发票级：行金额合计与总金额比对
    pub fn verify(&self, line_items: &[LineItem], total_amount: &BigDecimal) -> Vec<Finding> {
        let mut findings = Vec::new();
        let hundred = BigDecimal::from(100);

        for (index, item) in line_items.iter().enumerate() {
            let location = FindingLocation::LineItem {
                index,
                code: item.known_code(),
            };

            if item.quantity <= BigDecimal::zero() {
                findings.push(Finding::new(
                    FindingKind::ArithmeticError {
                        expected: None,
                        actual: item.line_total.clone(),
                        relative_deviation: None,
                    },
                    Severity::High,
                    location,
                    format!("line {} has non-positive quantity {}", index + 1, item.quantity),
                ));
                continue;
            }

            let expected = (&item.quantity * &item.unit_price) * (&hundred + &item.declared_rate) / hundred.clone();
            if let Some(finding) = self.compare(&expected, &item.line_total, location, |dev| {
                format!(
                    "line {}: {} x {} at {}% should be {}, found {} ({:.1}% off)",
                    index + 1,
                    item.quantity,
                    item.unit_price,
                    item.declared_rate,
                    expected.round(2),
                    item.line_total,
                    dev * 100.0
                )
            }) {
                findings.push(finding);
            }
        }

        // 无明细时合计为 0，总金额非 0 同样视为不符
        let sum = line_items
            .iter()
            .fold(BigDecimal::zero(), |acc, item| acc + &item.line_total);
        if let Some(finding) = self.compare(&sum, total_amount, FindingLocation::Invoice, |dev| {
            if line_items.is_empty() {
                return format!("invoice total is {} but there are no line items", total_amount);
            }
            format!(
                "line totals add up to {}, invoice total is {} ({:.1}% off)",
                sum,
                total_amount,
                dev * 100.0
            )
        }) {
            findings.push(finding);
        }

        findings
    }

    /// 超出容差 max(实际值 × 比例, 下限) 时生成发现
    fn compare(
        &self,
        expected: &BigDecimal,
        actual: &BigDecimal,
        location: FindingLocation,
        describe: impl FnOnce(f64) -> String,
    ) -> Option<Finding> {
        let diff = (expected - actual).abs();
        let diff_f = diff.to_f64().unwrap_or(f64::INFINITY);
        let actual_f = actual.to_f64().unwrap_or(0.0).abs();
        let tolerance = (actual_f * self.config.tolerance_ratio).max(self.config.tolerance_floor);
        if diff_f <= tolerance {
            return None;
        }

        let expected_f = expected.to_f64().unwrap_or(0.0).abs();
        let relative = if expected_f > 0.0 {
            diff_f / expected_f
        } else {
            f64::INFINITY
        };

        Some(Finding::new(
            FindingKind::ArithmeticError {
                expected: Some(expected.round(2)),
                actual: actual.clone(),
                relative_deviation: relative.is_finite().then_some(relative),
            },
            self.severity_for(relative),
            location,
            describe(relative),
        ))
    }

    pub fn severity_for(&self, relative: f64) -> Severity {
        if relative > self.config.high_deviation {
            Severity::High
        } else if relative >= self.config.medium_deviation {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}
