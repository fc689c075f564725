use std::collections::HashSet;

use crate::corpus::HistoricalCorpus;
use crate::models::invoice::{normalize_tax_id, normalize_vendor_name};
use crate::models::{Finding, FindingKind, FindingLocation, MismatchReason, Severity, TaxIdDefect};
use crate::verification::TaxIdVerdict;

const TAX_ID_LEN: usize = 15;
const CHECKSUM_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const MAX_JURISDICTION: u32 = 38;

/// 法律形式/填充词，不参与名称比对
const FILLER_TOKENS: &[&str] = &[
    "pvt", "private", "ltd", "limited", "co", "company", "corp", "corporation", "inc",
    "llp", "the", "and", "of", "m/s", "ms", "enterprises", "india",
];

/// 清洗税号：去空白、转大写；超长时截取第一个符合格式的 15 位窗口
pub fn clean_tax_id(raw: &str) -> Option<String> {
    let cleaned = normalize_tax_id(raw);
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.len() <= TAX_ID_LEN || !cleaned.is_ascii() {
        return Some(cleaned);
    }

    let extracted = (0..=cleaned.len() - TAX_ID_LEN)
        .map(|start| &cleaned[start..start + TAX_ID_LEN])
        .find(|window| structural_defect(window).is_none());
    match extracted {
        Some(window) => {
            tracing::debug!("extracted tax id {} from {}", window, raw);
            Some(window.to_string())
        }
        None => Some(cleaned),
    }
}

/// 模 36 加权校验位 (前 14 位，自右向左权重 2,1 交替)
pub fn checksum_char(prefix: &str) -> Option<char> {
    let mut factor = 2u32;
    let mut sum = 0u32;
    for byte in prefix.bytes().rev() {
        let value = CHECKSUM_ALPHABET.iter().position(|&c| c == byte)? as u32;
        let product = value * factor;
        factor = if factor == 2 { 1 } else { 2 };
        sum += product / 36 + product % 36;
    }
    let check = (36 - sum % 36) % 36;
    Some(CHECKSUM_ALPHABET[check as usize] as char)
}

/// 结构校验，返回第一个缺陷
pub fn structural_defect(tax_id: &str) -> Option<TaxIdDefect> {
    if tax_id.len() != TAX_ID_LEN {
        return Some(TaxIdDefect::Length);
    }
    if !tax_id.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase()) {
        return Some(TaxIdDefect::Charset);
    }

    let bytes = tax_id.as_bytes();
    let jurisdiction = tax_id[..2].parse::<u32>().ok();
    if !matches!(jurisdiction, Some(code) if (1..=MAX_JURISDICTION).contains(&code)) {
        return Some(TaxIdDefect::Jurisdiction);
    }

    // 3-12 位为 PAN：5 字母 + 4 数字 + 1 字母
    let holder = &bytes[2..12];
    let holder_ok = holder[..5].iter().all(u8::is_ascii_uppercase)
        && holder[5..9].iter().all(u8::is_ascii_digit)
        && holder[9].is_ascii_uppercase();
    if !holder_ok {
        return Some(TaxIdDefect::HolderShape);
    }
    if bytes[12] == b'0' {
        return Some(TaxIdDefect::EntityCode);
    }
    if bytes[13] != b'Z' {
        return Some(TaxIdDefect::DefaultMarker);
    }
    match checksum_char(&tax_id[..14]) {
        Some(expected) if expected as u8 == bytes[14] => None,
        _ => Some(TaxIdDefect::Checksum),
    }
}

/// 税号校验器
///
/// 纯函数：输入为税号、期望供应商名以及可选的外部登记结果。
/// 外部结果缺失时只做结构校验。
pub struct IdentifierValidator;

impl IdentifierValidator {
    pub fn validate(
        tax_id: Option<&str>,
        expected_vendor_name: Option<&str>,
        verdict: Option<&TaxIdVerdict>,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        let location = Finding::field("vendor_tax_id");

        let Some(tax_id) = tax_id.and_then(clean_tax_id) else {
            findings.push(Finding::new(
                FindingKind::MissingTaxId,
                Severity::Medium,
                location,
                "vendor tax id is missing",
            ));
            return findings;
        };

        if let Some(defect) = structural_defect(&tax_id) {
            findings.push(invalid(&tax_id, defect, Severity::High, location));
            return findings;
        }

        let Some(verdict) = verdict else {
            return findings;
        };

        if !verdict.is_valid {
            findings.push(invalid(&tax_id, TaxIdDefect::NotRegistered, Severity::Medium, location));
            return findings;
        }

        if !verdict.is_active {
            findings.push(Finding::new(
                FindingKind::TaxIdVendorMismatch {
                    tax_id: tax_id.clone(),
                    reason: MismatchReason::Inactive,
                },
                Severity::Low,
                location.clone(),
                format!("tax id {} is registered but not active", tax_id),
            ));
        }

        if let Some(vendor) = expected_vendor_name {
            let matched = names_match(vendor, &verdict.legal_name)
                || verdict
                    .trade_name
                    .as_deref()
                    .is_some_and(|trade| names_match(vendor, trade));
            if !matched {
                findings.push(Finding::new(
                    FindingKind::TaxIdVendorMismatch {
                        tax_id: tax_id.clone(),
                        reason: MismatchReason::LegalNameMismatch {
                            legal_name: verdict.legal_name.clone(),
                        },
                    },
                    Severity::Medium,
                    location,
                    format!(
                        "vendor '{}' does not match registered name '{}' of {}",
                        vendor, verdict.legal_name, tax_id
                    ),
                ));
            }
        }

        findings
    }

    /// 买方税号可选：仅在存在时做结构校验
    pub fn validate_buyer(tax_id: Option<&str>) -> Vec<Finding> {
        let Some(tax_id) = tax_id.and_then(clean_tax_id) else {
            return Vec::new();
        };
        match structural_defect(&tax_id) {
            Some(defect) => vec![invalid(&tax_id, defect, Severity::High, Finding::field("buyer_tax_id"))],
            None => Vec::new(),
        }
    }

    /// 同一税号在历史中被其他供应商使用
    pub fn check_reuse(
        tax_id: Option<&str>,
        vendor_name: &str,
        corpus: &dyn HistoricalCorpus,
    ) -> Vec<Finding> {
        let Some(tax_id) = tax_id.and_then(clean_tax_id) else {
            return Vec::new();
        };
        if structural_defect(&tax_id).is_some() {
            return Vec::new();
        }

        let vendor = normalize_vendor_name(vendor_name);
        let other = corpus
            .find_by_tax_id(&tax_id)
            .into_iter()
            .find(|prior| prior.record.normalized_vendor() != vendor);

        match other {
            Some(prior) => vec![Finding::new(
                FindingKind::TaxIdVendorMismatch {
                    tax_id: tax_id.clone(),
                    reason: MismatchReason::UsedByOtherVendor {
                        record_id: prior.id,
                        vendor_name: prior.record.vendor_name.clone(),
                    },
                },
                Severity::Medium,
                Finding::field("vendor_tax_id"),
                format!(
                    "tax id {} was previously used by vendor '{}' (record {})",
                    tax_id, prior.record.vendor_name, prior.id
                ),
            )],
            None => Vec::new(),
        }
    }
}

fn invalid(tax_id: &str, defect: TaxIdDefect, severity: Severity, location: FindingLocation) -> Finding {
    Finding::new(
        FindingKind::InvalidTaxId {
            tax_id: tax_id.to_string(),
            defect,
        },
        severity,
        location,
        format!("tax id {} is invalid ({:?})", tax_id, defect),
    )
}

fn significant_tokens(name: &str) -> HashSet<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '/')
        .filter(|t| t.len() > 1 && !FILLER_TOKENS.contains(t))
        .map(str::to_string)
        .collect()
}

/// 名称匹配：任一方包含另一方，或至少共享一个有效词
pub fn names_match(vendor: &str, registered: &str) -> bool {
    let a = normalize_vendor_name(vendor);
    let b = normalize_vendor_name(registered);
    if a.is_empty() || b.is_empty() {
        return true;
    }
    if a.contains(&b) || b.contains(&a) {
        return true;
    }
    let vendor_tokens = significant_tokens(&a);
    if vendor_tokens.is_empty() {
        return true;
    }
    !vendor_tokens.is_disjoint(&significant_tokens(&b))
}
