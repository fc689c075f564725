use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::InvoiceRecord;

/// 外部税号登记查询结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxIdVerdict {
    pub is_valid: bool,
    pub is_active: bool,
    pub legal_name: String,
    pub trade_name: Option<String>,
}

/// 登记查询失败
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct VerifierFault(pub String);

/// 调用方拿到的查询结果，引擎据此决定是否只做结构校验
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    /// 未配置外部服务
    NotConfigured,
    Verified(TaxIdVerdict),
    /// 超时或出错，降级为结构校验
    Unavailable(String),
}

impl VerificationOutcome {
    pub fn verdict(&self) -> Option<&TaxIdVerdict> {
        match self {
            VerificationOutcome::Verified(v) => Some(v),
            _ => None,
        }
    }
}

/// 税号登记查询服务 (GST 门户 / 本地缓存表)
#[allow(async_fn_in_trait)]
pub trait TaxIdVerifier {
    async fn verify(&self, tax_id: &str) -> Result<TaxIdVerdict, VerifierFault>;
}

/// 带超时的单次查询
pub async fn fetch_outcome<V: TaxIdVerifier>(
    verifier: &V,
    tax_id: &str,
    timeout: Duration,
) -> VerificationOutcome {
    match tokio::time::timeout(timeout, verifier.verify(tax_id)).await {
        Ok(Ok(verdict)) => VerificationOutcome::Verified(verdict),
        Ok(Err(fault)) => {
            tracing::warn!("tax id verification for {} failed: {}", tax_id, fault);
            VerificationOutcome::Unavailable(fault.0)
        }
        Err(_) => {
            tracing::warn!("tax id verification for {} timed out after {:?}", tax_id, timeout);
            VerificationOutcome::Unavailable(format!("timed out after {} ms", timeout.as_millis()))
        }
    }
}

/// 批量预取，结果与输入一一对应 (保序，受并发上限约束)
pub async fn prefetch_outcomes<V: TaxIdVerifier>(
    verifier: Option<&V>,
    records: &[InvoiceRecord],
    timeout: Duration,
    concurrency: usize,
) -> Vec<VerificationOutcome> {
    let Some(verifier) = verifier else {
        return vec![VerificationOutcome::NotConfigured; records.len()];
    };

    stream::iter(records.iter())
        .map(|record| async move {
            match record.vendor_tax_id.as_deref().and_then(crate::service::identifier::clean_tax_id) {
                Some(tax_id) if crate::service::identifier::structural_defect(&tax_id).is_none() => {
                    fetch_outcome(verifier, &tax_id, timeout).await
                }
                // 结构不合法的税号不必查询
                _ => VerificationOutcome::NotConfigured,
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}
