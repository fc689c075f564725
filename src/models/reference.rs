use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::invoice::normalize_code;

/// 编码类别：HSN (货物) / SAC (服务)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeKind {
    Hsn,
    Sac,
    Unknown,
}

impl CodeKind {
    /// SAC 为 99 开头的 6 位数字；HSN 为 4/6/8 位数字
    pub fn detect(code: &str) -> Self {
        let digits: String = code.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() == 6 && digits.starts_with("99") {
            CodeKind::Sac
        } else if matches!(digits.len(), 4 | 6 | 8) {
            CodeKind::Hsn
        } else {
            CodeKind::Unknown
        }
    }
}

impl fmt::Display for CodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CodeKind::Hsn => "HSN",
            CodeKind::Sac => "SAC",
            CodeKind::Unknown => "code",
        };
        f.write_str(s)
    }
}

/// 税率参考表: 编码 -> 允许的税率集合 (保持加载顺序)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateTable {
    rates: IndexMap<String, Vec<BigDecimal>>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个允许税率，重复税率自动去重
    pub fn insert(&mut self, code: &str, rate: BigDecimal) {
        let permitted = self.rates.entry(normalize_code(code)).or_default();
        if !permitted.iter().any(|r| *r == rate) {
            permitted.push(rate);
        }
    }

    pub fn with_rates(mut self, code: &str, rates: &[i64]) -> Self {
        for &rate in rates {
            self.insert(code, BigDecimal::from(rate));
        }
        self
    }

    pub fn permitted(&self, code: &str) -> Option<&[BigDecimal]> {
        self.rates.get(&normalize_code(code)).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// 从 CSV (code,rate) 读取，首行为表头
    pub fn from_csv_reader<R: std::io::Read>(reader: R) -> Result<Self, csv::Error> {
        let mut table = Self::new();
        let mut rdr = csv::Reader::from_reader(reader);
        for row in rdr.deserialize::<RateRow>() {
            let row = row?;
            table.insert(&row.code, row.rate);
        }
        Ok(table)
    }
}

/// 参考表行 (CSV / t_rate_reference)
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RateRow {
    pub code: String,
    pub rate: BigDecimal,
}
