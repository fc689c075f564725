use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{HistoricalCorpus, StoredRecord};
use crate::models::invoice::{normalize_invoice_number, normalize_vendor_name};
use crate::models::InvoiceRecord;
use crate::service::identifier::clean_tax_id;

/// 内存历史语料 (只追加)
///
/// 写入方串行分配递增 id，写完全部索引后才推进水位线；
/// 读取方只看 id < 水位线 的记录，因此不会读到写了一半的记录，
/// 也不需要获取写锁。
#[derive(Debug, Default)]
pub struct MemoryCorpus {
    records: DashMap<u64, Arc<InvoiceRecord>>,
    /// (供应商, 发票号) -> id 列表
    by_key: DashMap<(String, String), Vec<u64>>,
    /// 供应商 -> (日期, id) 有序集合，用于日期范围扫描
    by_vendor: DashMap<String, BTreeSet<(NaiveDate, u64)>>,
    /// 编码 -> (id, 单价)
    by_code: DashMap<String, Vec<(u64, BigDecimal)>>,
    /// 税号 -> id 列表
    by_tax_id: DashMap<String, Vec<u64>>,
    watermark: AtomicU64,
    writer: Mutex<()>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条已评分发票，返回分配的 id
    pub fn insert(&self, record: InvoiceRecord) -> u64 {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let id = self.watermark.load(Ordering::Acquire);

        let vendor = record.normalized_vendor();
        let number = record.normalized_invoice_number();

        self.by_key.entry((vendor.clone(), number)).or_default().push(id);
        self.by_vendor
            .entry(vendor)
            .or_default()
            .insert((record.invoice_date, id));

        for item in &record.line_items {
            if let Some(code) = item.known_code() {
                self.by_code
                    .entry(code)
                    .or_default()
                    .push((id, item.unit_price.clone()));
            }
        }

        // 与查询侧同一规范形式 (含前缀的原始值截取 15 位窗口)
        if let Some(tax_id) = record.vendor_tax_id.as_deref().and_then(clean_tax_id) {
            self.by_tax_id.entry(tax_id).or_default().push(id);
        }

        self.records.insert(id, Arc::new(record));

        // 所有索引写完后再发布
        self.watermark.store(id + 1, Ordering::Release);
        id
    }

    pub fn extend<I: IntoIterator<Item = InvoiceRecord>>(&self, records: I) -> usize {
        records.into_iter().map(|r| self.insert(r)).count()
    }

    pub fn len(&self) -> usize {
        self.watermark.load(Ordering::Acquire) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 固定当前水位线，得到一致的只读视图
    pub fn snapshot(&self) -> CorpusSnapshot<'_> {
        CorpusSnapshot {
            corpus: self,
            watermark: self.watermark.load(Ordering::Acquire),
        }
    }

    fn stored(&self, id: u64) -> Option<StoredRecord> {
        self.records.get(&id).map(|r| StoredRecord {
            id,
            record: Arc::clone(r.value()),
        })
    }

    fn exact_at(&self, watermark: u64, vendor: &str, number: &str) -> Option<StoredRecord> {
        let key = (normalize_vendor_name(vendor), normalize_invoice_number(number));
        let first = self
            .by_key
            .get(&key)
            .and_then(|ids| ids.iter().copied().filter(|&id| id < watermark).min())?;
        self.stored(first)
    }

    fn range_at(
        &self,
        watermark: u64,
        vendor: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<StoredRecord> {
        if from > to {
            return Vec::new();
        }
        let ids: Vec<u64> = match self.by_vendor.get(&normalize_vendor_name(vendor)) {
            Some(dates) => dates
                .range((from, 0)..=(to, u64::MAX))
                .map(|&(_, id)| id)
                .filter(|&id| id < watermark)
                .collect(),
            None => return Vec::new(),
        };
        ids.into_iter().filter_map(|id| self.stored(id)).collect()
    }

    fn prices_at(&self, watermark: u64, code: &str) -> Vec<BigDecimal> {
        let code = crate::models::invoice::normalize_code(code);
        self.by_code
            .get(&code)
            .map(|samples| {
                samples
                    .iter()
                    .filter(|(id, _)| *id < watermark)
                    .map(|(_, price)| price.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn tax_id_at(&self, watermark: u64, tax_id: &str) -> Vec<StoredRecord> {
        let Some(tax_id) = clean_tax_id(tax_id) else {
            return Vec::new();
        };
        let ids: Vec<u64> = self
            .by_tax_id
            .get(&tax_id)
            .map(|ids| ids.iter().copied().filter(|&id| id < watermark).collect())
            .unwrap_or_default();
        ids.into_iter().filter_map(|id| self.stored(id)).collect()
    }
}

/// 固定水位线的语料视图
#[derive(Debug, Clone, Copy)]
pub struct CorpusSnapshot<'a> {
    corpus: &'a MemoryCorpus,
    watermark: u64,
}

impl CorpusSnapshot<'_> {
    pub fn len(&self) -> usize {
        self.watermark as usize
    }

    pub fn is_empty(&self) -> bool {
        self.watermark == 0
    }
}

impl HistoricalCorpus for CorpusSnapshot<'_> {
    fn find_by_vendor_and_invoice_number(&self, vendor: &str, number: &str) -> Option<StoredRecord> {
        self.corpus.exact_at(self.watermark, vendor, number)
    }

    fn find_by_vendor_and_date_range(
        &self,
        vendor: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<StoredRecord> {
        self.corpus.range_at(self.watermark, vendor, from, to)
    }

    fn price_samples_for_code(&self, code: &str) -> Vec<BigDecimal> {
        self.corpus.prices_at(self.watermark, code)
    }

    fn find_by_tax_id(&self, tax_id: &str) -> Vec<StoredRecord> {
        self.corpus.tax_id_at(self.watermark, tax_id)
    }
}

impl HistoricalCorpus for MemoryCorpus {
    fn find_by_vendor_and_invoice_number(&self, vendor: &str, number: &str) -> Option<StoredRecord> {
        self.snapshot().find_by_vendor_and_invoice_number(vendor, number)
    }

    fn find_by_vendor_and_date_range(
        &self,
        vendor: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<StoredRecord> {
        self.snapshot().find_by_vendor_and_date_range(vendor, from, to)
    }

    fn price_samples_for_code(&self, code: &str) -> Vec<BigDecimal> {
        self.snapshot().price_samples_for_code(code)
    }

    fn find_by_tax_id(&self, tax_id: &str) -> Vec<StoredRecord> {
        self.snapshot().find_by_tax_id(tax_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::invoice::fixtures::*;

    #[test]
    fn test_exact_lookup_is_normalized() {
        let corpus = MemoryCorpus::new();
        let id = corpus.insert(acme_invoice());

        let hit = corpus.find_by_vendor_and_invoice_number("  ACME   co", "inv-100 ");
        assert_eq!(hit.map(|r| r.id), Some(id));
        assert!(corpus.find_by_vendor_and_invoice_number("Acme Co", "INV-101").is_none());
    }

    #[test]
    fn test_date_range_is_inclusive_and_vendor_scoped() {
        let corpus = MemoryCorpus::new();
        for (day, vendor) in [(10, "Acme Co"), (12, "Acme Co"), (14, "Acme Co"), (12, "Other")] {
            let mut record = acme_invoice();
            record.vendor_name = vendor.to_string();
            record.invoice_number = format!("INV-{}", day);
            record.invoice_date = date(2024, 3, day);
            corpus.insert(record);
        }

        let hits = corpus.find_by_vendor_and_date_range("acme co", date(2024, 3, 10), date(2024, 3, 12));
        let days: Vec<_> = hits.iter().map(|r| r.record.invoice_date).collect();
        assert_eq!(days, vec![date(2024, 3, 10), date(2024, 3, 12)]);
    }

    #[test]
    fn test_snapshot_ignores_later_inserts() {
        let corpus = MemoryCorpus::new();
        corpus.insert(acme_invoice());
        let snapshot = corpus.snapshot();

        let mut later = acme_invoice();
        later.invoice_number = "INV-200".to_string();
        corpus.insert(later);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.price_samples_for_code("hsn1").len(), 1);
        assert!(snapshot.find_by_vendor_and_invoice_number("Acme Co", "INV-200").is_none());
        assert_eq!(corpus.price_samples_for_code("HSN1").len(), 2);
    }

    #[test]
    fn test_tax_id_index() {
        let corpus = MemoryCorpus::new();
        corpus.insert(acme_invoice());
        assert_eq!(corpus.find_by_tax_id("24aaaci0931p1zl").len(), 1);
        assert!(corpus.find_by_tax_id("27AAPFU0939F1ZV").is_empty());
    }

    #[test]
    fn test_tax_id_index_uses_cleaned_form() {
        let corpus = MemoryCorpus::new();
        let mut record = acme_invoice();
        record.vendor_tax_id = Some("GSTIN: 24AAACI0931P1ZL".to_string());
        let id = corpus.insert(record);

        let hits = corpus.find_by_tax_id("24AAACI0931P1ZL");
        assert_eq!(hits.iter().map(|r| r.id).collect::<Vec<_>>(), vec![id]);
        assert_eq!(corpus.find_by_tax_id("gstin:24aaaci0931p1zl").len(), 1);
    }

    #[test]
    fn test_concurrent_inserts_and_reads() {
        let corpus = Arc::new(MemoryCorpus::new());
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let corpus = Arc::clone(&corpus);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let mut record = acme_invoice();
                        record.invoice_number = format!("T{}-{}", t, i);
                        corpus.insert(record);
                        let snapshot = corpus.snapshot();
                        // 水位线以下的记录必须全部可见
                        assert_eq!(snapshot.price_samples_for_code("HSN1").len(), snapshot.len());
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(corpus.len(), 200);
    }
}
