use crate::models::{CodeKind, Finding, FindingKind, FindingLocation, LineItem, RateTable, Severity};

/// 编码/税率一致性检查
pub struct RateCodeChecker;

impl RateCodeChecker {
    pub fn check(line_items: &[LineItem], reference_table: &RateTable) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut unknown_lines = Vec::new();

        for (index, item) in line_items.iter().enumerate() {
            let Some(code) = item.known_code() else {
                unknown_lines.push(index);
                continue;
            };
            let kind = CodeKind::detect(&code);
            let location = FindingLocation::LineItem {
                index,
                code: Some(code.clone()),
            };

            match reference_table.permitted(&code) {
                None => findings.push(Finding::new(
                    FindingKind::InvalidRateCode {
                        code: Some(code.clone()),
                    },
                    Severity::Medium,
                    location,
                    format!("line {}: {} {} is not in the rate reference table", index + 1, kind, code),
                )),
                Some(permitted) if !permitted.iter().any(|r| *r == item.declared_rate) => {
                    let allowed: Vec<String> = permitted.iter().map(|r| format!("{}%", r)).collect();
                    findings.push(Finding::new(
                        FindingKind::RateCodeMismatch {
                            code: code.clone(),
                            declared_rate: item.declared_rate.clone(),
                            permitted: permitted.to_vec(),
                        },
                        Severity::High,
                        location,
                        format!(
                            "line {}: {} {} declared at {}%, permitted {}",
                            index + 1,
                            kind,
                            code,
                            item.declared_rate,
                            allowed.join("/")
                        ),
                    ));
                }
                Some(_) => {}
            }
        }

        // 未知编码整张发票只报一次
        if !unknown_lines.is_empty() {
            let description = format!("{} line(s) carry no classification code", unknown_lines.len());
            findings.push(Finding::new(
                FindingKind::InvalidRateCode { code: None },
                Severity::Low,
                FindingLocation::LineItems {
                    indices: unknown_lines,
                },
                description,
            ));
        }

        findings
    }
}
