use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// 待评分发票 (上游 OCR/抽取结果，评分期间只读)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub invoice_number: String,
    pub vendor_name: String,
    #[serde(default)]
    pub vendor_tax_id: Option<String>,
    #[serde(default)]
    pub buyer_tax_id: Option<String>,
    pub invoice_date: NaiveDate,
    pub total_amount: BigDecimal,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    /// 上游识别置信度 (0-1)，仅作参考，不参与扣分
    #[serde(default = "default_confidence")]
    pub extraction_confidence: f64,
}

/// 发票明细行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub code: String,            // 商品/服务编码 (HSN/SAC)，空表示未知
    pub declared_rate: BigDecimal, // 税率 (百分比)
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    pub line_total: BigDecimal,  // 含税金额
}

fn default_confidence() -> f64 {
    1.0
}

impl InvoiceRecord {
    /// 发票号归一化：去首尾空白、折叠内部空白、转大写
    pub fn normalized_invoice_number(&self) -> String {
        normalize_invoice_number(&self.invoice_number)
    }

    /// 供应商名归一化：大小写不敏感、折叠空白
    pub fn normalized_vendor(&self) -> String {
        normalize_vendor_name(&self.vendor_name)
    }

    /// 输入形态校验：缺失必填字段或负金额直接拒绝整个评分调用
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.invoice_number.trim().is_empty() {
            return Err(EngineError::MissingField("invoice_number"));
        }
        if self.vendor_name.trim().is_empty() {
            return Err(EngineError::MissingField("vendor_name"));
        }
        if self.total_amount < BigDecimal::zero() {
            return Err(EngineError::NegativeAmount {
                field: "total_amount".to_string(),
                value: self.total_amount.clone(),
            });
        }
        if !(0.0..=1.0).contains(&self.extraction_confidence) {
            return Err(EngineError::ConfidenceOutOfRange(self.extraction_confidence));
        }

        let hundred = BigDecimal::from(100);
        for (index, item) in self.line_items.iter().enumerate() {
            if item.unit_price < BigDecimal::zero() {
                return Err(EngineError::NegativeAmount {
                    field: format!("line_items[{}].unit_price", index),
                    value: item.unit_price.clone(),
                });
            }
            if item.line_total < BigDecimal::zero() {
                return Err(EngineError::NegativeAmount {
                    field: format!("line_items[{}].line_total", index),
                    value: item.line_total.clone(),
                });
            }
            if item.declared_rate < BigDecimal::zero() || item.declared_rate > hundred {
                return Err(EngineError::RateOutOfRange {
                    index,
                    rate: item.declared_rate.clone(),
                });
            }
        }

        Ok(())
    }
}

impl LineItem {
    /// 编码是否已知 ("" 与 "unknown" 均视为未知)
    pub fn known_code(&self) -> Option<String> {
        let code = normalize_code(&self.code);
        if code.is_empty() || code == "UNKNOWN" {
            None
        } else {
            Some(code)
        }
    }
}

pub fn normalize_invoice_number(raw: &str) -> String {
    collapse_whitespace(raw).to_uppercase()
}

pub fn normalize_vendor_name(raw: &str) -> String {
    collapse_whitespace(raw).to_lowercase()
}

pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// 税号归一化：去掉所有空白并转大写
pub fn normalize_tax_id(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_uppercase()
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
