use bigdecimal::BigDecimal;
use thiserror::Error;

/// 评分调用的输入形态错误，整次调用被拒绝
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("required field '{0}' is missing or blank")]
    MissingField(&'static str),
    #[error("field '{field}' must not be negative (got {value})")]
    NegativeAmount { field: String, value: BigDecimal },
    #[error("line_items[{index}].declared_rate {rate} is outside 0..=100")]
    RateOutOfRange { index: usize, rate: BigDecimal },
    #[error("extraction_confidence {0} is outside 0..=1")]
    ConfidenceOutOfRange(f64),
}

/// 批处理程序错误 (配置 / 数据库 / 文件)
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
