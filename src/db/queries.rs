use chrono::NaiveDate;
use sqlx::PgPool;
use std::collections::HashMap;

use crate::corpus::MemoryCorpus;
use crate::error::AppError;
use crate::models::{
    ComplianceResult, InvoiceRecord, InvoiceRow, LineItemRow, RateRow, RateTable, RegistryRow,
};

/// 查询历史发票主表
pub async fn list_invoice_rows(
    pool: &PgPool,
    since: Option<NaiveDate>,
) -> Result<Vec<InvoiceRow>, sqlx::Error> {
    sqlx::query_as::<_, InvoiceRow>(
        r#"
        SELECT fid, finvoiceno, fvendorname, fvendortaxno, fbuyertaxno,
               finvoicedate, ftotalamount, fconfidence
        FROM t_invoice_record
        WHERE $1::date IS NULL OR finvoicedate >= $1
        ORDER BY fid
        "#
    )
    .bind(since)
    .fetch_all(pool)
    .await
}

/// 按发票ID查询明细 (按 fid, fentryid 排序)
pub async fn list_line_item_rows(
    pool: &PgPool,
    invoice_ids: &[i64],
) -> Result<Vec<LineItemRow>, sqlx::Error> {
    sqlx::query_as::<_, LineItemRow>(
        r#"
        SELECT fid, fentryid, fdescription, fcode, frate, fnum, funitprice, famount
        FROM t_invoice_line_item
        WHERE fid = ANY($1)
        ORDER BY fid, fentryid
        "#
    )
    .bind(invoice_ids)
    .fetch_all(pool)
    .await
}

/// 加载历史发票到内存语料，返回加载条数
pub async fn load_history(
    pool: &PgPool,
    corpus: &MemoryCorpus,
    since: Option<NaiveDate>,
) -> Result<usize, sqlx::Error> {
    let start_time = std::time::Instant::now();
    let invoices = list_invoice_rows(pool, since).await?;
    let ids: Vec<i64> = invoices.iter().map(|r| r.fid).collect();

    // 明细分块查询 (每1000张发票)
    let mut items_by_invoice: HashMap<i64, Vec<LineItemRow>> = HashMap::new();
    for chunk in ids.chunks(1000) {
        for item in list_line_item_rows(pool, chunk).await? {
            items_by_invoice.entry(item.fid).or_default().push(item);
        }
    }

    let total = invoices.len();
    for (idx, row) in invoices.into_iter().enumerate() {
        let items = items_by_invoice.remove(&row.fid).unwrap_or_default();
        corpus.insert(row.into_record(items));

        let current = idx + 1;
        if current % 10000 == 0 {
            tracing::info!("历史加载进度: {}/{}", current, total);
        }
    }

    tracing::info!("Loaded {} historical invoices in {:?}", total, start_time.elapsed());
    Ok(total)
}

/// 读取税率参考表
pub async fn load_rate_table(pool: &PgPool) -> Result<RateTable, sqlx::Error> {
    let rows = sqlx::query_as::<_, RateRow>(
        r#"
        SELECT fcode as code, frate as rate
        FROM t_rate_reference
        ORDER BY fcode, frate
        "#
    )
    .fetch_all(pool)
    .await?;

    let mut table = RateTable::new();
    for row in rows {
        table.insert(&row.code, row.rate);
    }
    Ok(table)
}

/// 税号登记缓存查询
pub async fn find_registry(
    pool: &PgPool,
    tax_id: &str,
) -> Result<Option<RegistryRow>, sqlx::Error> {
    sqlx::query_as::<_, RegistryRow>(
        r#"
        SELECT ftaxno, fstatus, flegalname, ftradename
        FROM t_taxid_registry
        WHERE ftaxno = $1
        "#
    )
    .bind(tax_id)
    .fetch_optional(pool)
    .await
}

/// 写入已评分发票、明细与发现 (单事务)，返回新发票ID
pub async fn insert_scored(
    pool: &PgPool,
    record: &InvoiceRecord,
    result: &ComplianceResult,
) -> Result<i64, AppError> {
    let start_time = std::time::Instant::now();
    let mut tx = pool.begin().await?;

    let invoice_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO t_invoice_record (
            finvoiceno, fvendorname, fvendortaxno, fbuyertaxno,
            finvoicedate, ftotalamount, fconfidence, fscore, frisklevel, fscoretime
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
        RETURNING fid
        "#
    )
    .bind(&record.invoice_number)
    .bind(&record.vendor_name)
    .bind(&record.vendor_tax_id)
    .bind(&record.buyer_tax_id)
    .bind(record.invoice_date)
    .bind(record.total_amount.clone())
    .bind(record.extraction_confidence)
    .bind(result.score as i32)
    .bind(result.risk_level.to_string())
    .fetch_one(&mut *tx)
    .await?;

    if !record.line_items.is_empty() {
        let mut query_builder = sqlx::QueryBuilder::new(
            "INSERT INTO t_invoice_line_item (
                fid, fentryid, fdescription, fcode, frate, fnum, funitprice, famount
            ) "
        );
        query_builder.push_values(record.line_items.iter().enumerate(), |mut b, (idx, item)| {
            b.push_bind(invoice_id)
                .push_bind(idx as i64 + 1)
                .push_bind(&item.description)
                .push_bind(&item.code)
                .push_bind(item.declared_rate.clone())
                .push_bind(item.quantity.clone())
                .push_bind(item.unit_price.clone())
                .push_bind(item.line_total.clone());
        });
        query_builder.build().execute(&mut *tx).await?;
    }

    if !result.findings.is_empty() {
        let mut details = Vec::with_capacity(result.findings.len());
        for finding in &result.findings {
            details.push(serde_json::to_string(&finding.kind)?);
        }

        let mut query_builder = sqlx::QueryBuilder::new(
            "INSERT INTO t_compliance_finding (
                finvoiceid, fseq, ftype, fseverity, flocation, fdescription, fdetail
            ) "
        );
        query_builder.push_values(
            result.findings.iter().zip(details).enumerate(),
            |mut b, (seq, (finding, detail))| {
                b.push_bind(invoice_id)
                    .push_bind(seq as i32)
                    .push_bind(finding.kind.name())
                    .push_bind(finding.severity.to_string())
                    .push_bind(finding.location.to_string())
                    .push_bind(finding.description.clone())
                    .push_bind(detail);
            },
        );
        query_builder.build().execute(&mut *tx).await?;
    }

    // 提交超时: 30秒
    match tokio::time::timeout(std::time::Duration::from_secs(30), tx.commit()).await {
        Ok(Ok(())) => {
            tracing::debug!(
                "✓ 发票 {} 写入成功, {} 条发现, 耗时: {:?}",
                record.invoice_number,
                result.findings.len(),
                start_time.elapsed()
            );
            Ok(invoice_id)
        }
        Ok(Err(e)) => {
            tracing::error!("✗ 发票 {} 提交失败: {:?}", record.invoice_number, e);
            Err(e.into())
        }
        Err(_) => {
            tracing::error!("✗ 发票 {} 提交超时 (>30秒)!", record.invoice_number);
            Err(sqlx::Error::PoolTimedOut.into())
        }
    }
}
