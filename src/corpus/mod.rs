pub mod memory;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::sync::Arc;

use crate::models::InvoiceRecord;

pub use memory::{CorpusSnapshot, MemoryCorpus};

/// 历史语料中的一条已评分发票
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: u64,
    pub record: Arc<InvoiceRecord>,
}

/// 历史语料查询能力
///
/// 引擎只通过这些查询访问历史数据，存储后端可替换 (内存索引 / 数据库)。
/// 所有实现必须是只读快照语义：一次评分期间不会看到新插入或写了一半的记录。
pub trait HistoricalCorpus: Send + Sync {
    /// 按归一化 (供应商, 发票号) 精确查找，多条时返回最早的一条
    fn find_by_vendor_and_invoice_number(&self, vendor: &str, number: &str) -> Option<StoredRecord>;

    /// 同一供应商在 [from, to] 日期范围内的发票，按 (日期, id) 升序
    fn find_by_vendor_and_date_range(
        &self,
        vendor: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<StoredRecord>;

    /// 某编码下所有历史明细的单价
    fn price_samples_for_code(&self, code: &str) -> Vec<BigDecimal>;

    /// 使用同一税号的历史发票，按 id 升序
    fn find_by_tax_id(&self, tax_id: &str) -> Vec<StoredRecord>;
}
