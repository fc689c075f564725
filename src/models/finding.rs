use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(s)
    }
}

/// 发现定位：整张发票 / 某字段 / 某明细行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum FindingLocation {
    Invoice,
    Field { name: String },
    LineItem { index: usize, code: Option<String> },
    LineItems { indices: Vec<usize> },
}

impl fmt::Display for FindingLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingLocation::Invoice => f.write_str("invoice"),
            FindingLocation::Field { name } => write!(f, "field:{}", name),
            FindingLocation::LineItem { index, .. } => write!(f, "line_items[{}]", index),
            FindingLocation::LineItems { indices } => {
                let joined: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
                write!(f, "line_items[{}]", joined.join(","))
            }
        }
    }
}

/// 税号缺陷类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxIdDefect {
    Length,
    Charset,
    Jurisdiction,
    HolderShape,
    EntityCode,
    DefaultMarker,
    Checksum,
    NotRegistered,
}

/// 税号与供应商不一致的原因
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum MismatchReason {
    Inactive,
    LegalNameMismatch { legal_name: String },
    UsedByOtherVendor { record_id: u64, vendor_name: String },
}

/// 价格偏离统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceDeviation {
    pub population: usize,
    pub median: f64,
    pub scaled_mad: f64,
    pub deviation_multiple: f64,
    /// 落在所有价格簇邻域之外
    pub density_isolated: bool,
}

/// 发现类型 (封闭和类型)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FindingKind {
    DuplicateInvoice {
        matched_record_id: u64,
        matched_invoice_number: String,
        exact: bool,
    },
    InvalidTaxId {
        tax_id: String,
        defect: TaxIdDefect,
    },
    MissingTaxId,
    TaxIdVendorMismatch {
        tax_id: String,
        reason: MismatchReason,
    },
    InvalidRateCode {
        code: Option<String>,
    },
    RateCodeMismatch {
        code: String,
        declared_rate: BigDecimal,
        permitted: Vec<BigDecimal>,
    },
    ArithmeticError {
        expected: Option<BigDecimal>,
        actual: BigDecimal,
        relative_deviation: Option<f64>,
    },
    PriceOutlier {
        code: String,
        unit_price: BigDecimal,
        deviation: PriceDeviation,
    },
    UnusualVendorAmount {
        vendor_mean: f64,
        history: usize,
    },
}

impl FindingKind {
    pub fn name(&self) -> &'static str {
        match self {
            FindingKind::DuplicateInvoice { .. } => "DuplicateInvoice",
            FindingKind::InvalidTaxId { .. } => "InvalidTaxId",
            FindingKind::MissingTaxId => "MissingTaxId",
            FindingKind::TaxIdVendorMismatch { .. } => "TaxIdVendorMismatch",
            FindingKind::InvalidRateCode { .. } => "InvalidRateCode",
            FindingKind::RateCodeMismatch { .. } => "RateCodeMismatch",
            FindingKind::ArithmeticError { .. } => "ArithmeticError",
            FindingKind::PriceOutlier { .. } => "PriceOutlier",
            FindingKind::UnusualVendorAmount { .. } => "UnusualVendorAmount",
        }
    }
}

/// 单条合规发现
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub description: String,
    pub location: FindingLocation,
}

impl Finding {
    pub fn new(
        kind: FindingKind,
        severity: Severity,
        location: FindingLocation,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            description: description.into(),
            location,
        }
    }

    pub fn field(name: &str) -> FindingLocation {
        FindingLocation::Field {
            name: name.to_string(),
        }
    }
}

/// 系统性提示 (外部服务降级等)，不扣分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemNote {
    pub severity: Severity,
    pub message: String,
}

impl SystemNote {
    pub fn low(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Low,
            message: message.into(),
        }
    }
}
