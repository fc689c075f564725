use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::invoice::{InvoiceRecord, LineItem};

/// 历史发票主表 (t_invoice_record)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InvoiceRow {
    pub fid: i64,
    pub finvoiceno: String,
    pub fvendorname: String,
    pub fvendortaxno: Option<String>,
    pub fbuyertaxno: Option<String>,
    pub finvoicedate: NaiveDate,
    pub ftotalamount: BigDecimal,
    pub fconfidence: f64,
}

/// 历史发票明细表 (t_invoice_line_item)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LineItemRow {
    pub fid: i64,          // 关联发票ID
    pub fentryid: i64,     // 明细行ID
    pub fdescription: String,
    pub fcode: String,     // HSN/SAC 编码
    pub frate: BigDecimal,
    pub fnum: BigDecimal,
    pub funitprice: BigDecimal,
    pub famount: BigDecimal,
}

/// 税号登记缓存表 (t_taxid_registry)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RegistryRow {
    pub ftaxno: String,
    pub fstatus: String,
    pub flegalname: String,
    pub ftradename: Option<String>,
}

impl InvoiceRow {
    /// 组装为评分用发票 (items 需已按 fentryid 排序)
    pub fn into_record(self, items: Vec<LineItemRow>) -> InvoiceRecord {
        InvoiceRecord {
            invoice_number: self.finvoiceno,
            vendor_name: self.fvendorname,
            vendor_tax_id: self.fvendortaxno,
            buyer_tax_id: self.fbuyertaxno,
            invoice_date: self.finvoicedate,
            total_amount: self.ftotalamount,
            line_items: items.into_iter().map(LineItemRow::into_line_item).collect(),
            extraction_confidence: self.fconfidence,
        }
    }
}

impl LineItemRow {
    pub fn into_line_item(self) -> LineItem {
        LineItem {
            description: self.fdescription,
            code: self.fcode,
            declared_rate: self.frate,
            quantity: self.fnum,
            unit_price: self.funitprice,
            line_total: self.famount,
        }
    }
}
