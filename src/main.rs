use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Local};
use invoice_risk_engine::db::{self, PgRegistryVerifier};
use invoice_risk_engine::models::{InvoiceRecord, RateTable};
use invoice_risk_engine::verification::prefetch_outcomes;
use invoice_risk_engine::{
    create_pool, export, AppConfig, BatchSummary, ComplianceEngine, MemoryCorpus,
};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::load("risk-engine.toml")?;
    info!("Starting batch with config: {:?}", config);

    // 创建数据库连接池
    let pool = create_pool(&config.database).await?;
    info!("Database pool created");

    // 加载历史语料
    let since = config
        .batch
        .history_days
        .and_then(|days| Local::now().date_naive().checked_sub_days(Days::new(days)));
    let corpus = Arc::new(MemoryCorpus::new());
    let loaded = db::load_history(&pool, &corpus, since).await?;
    info!("Historical corpus ready: {} invoices", loaded);

    // 税率参考表
    let rate_table = match &config.batch.rate_table_path {
        Some(path) => RateTable::from_csv_reader(File::open(path)?)?,
        None => db::load_rate_table(&pool).await?,
    };
    info!("Rate table loaded: {} codes", rate_table.len());
    if rate_table.is_empty() {
        warn!("Rate table is empty, every line item will be flagged as an invalid code");
    }

    // 读取待评分发票
    let records: Vec<InvoiceRecord> =
        serde_json::from_reader(File::open(&config.batch.input_path)?)?;
    info!("Read {} invoices from {}", records.len(), config.batch.input_path);

    // 税号登记查询 (可选)
    let verifier = config
        .verification
        .enabled
        .then(|| PgRegistryVerifier::new(pool.clone()));
    let outcomes = prefetch_outcomes(
        verifier.as_ref(),
        &records,
        Duration::from_millis(config.verification.timeout_ms),
        config.verification.concurrency,
    )
    .await;

    // 批内发票互不可见，统一对批次开始时的快照评分
    let engine = ComplianceEngine::new(config.engine.clone(), Arc::new(rate_table));
    let start_time = std::time::Instant::now();
    let results = {
        let snapshot = corpus.snapshot();
        engine.score_batch(&records, &snapshot, &outcomes)
    };
    info!("Scored {} invoices in {:?}", records.len(), start_time.elapsed());

    if config.batch.persist {
        let mut persisted = 0;
        for (record, result) in records.iter().zip(&results) {
            let Ok(result) = result else { continue };
            match db::insert_scored(&pool, record, result).await {
                Ok(_) => {
                    corpus.insert(record.clone());
                    persisted += 1;
                }
                Err(e) => warn!("invoice {} not persisted: {}", record.invoice_number, e),
            }
        }
        info!("Persisted {} scored invoices", persisted);
    }

    for (record, result) in records.iter().zip(&results) {
        if let Err(e) = result {
            warn!("invoice {} rejected: {}", record.invoice_number, e);
        }
    }

    export::export_findings(&records, &results, Path::new(&config.batch.output_path))?;

    let summary = BatchSummary::from_results(&results);
    info!(
        "Batch done: scored={}, rejected={}, risk low/medium/high={}/{}/{}, findings high/medium/low={}/{}/{}",
        summary.scored,
        summary.rejected,
        summary.low_risk,
        summary.medium_risk,
        summary.high_risk,
        summary.high_findings,
        summary.medium_findings,
        summary.low_findings
    );

    Ok(())
}
