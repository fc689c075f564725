use serde::{Deserialize, Serialize};
use std::path::Path;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub verification: VerificationConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    /// 批处理只有历史加载与结果写入两类连接需求
    pub max_connections: u32,
    /// 超过该耗时的语句以 warn 级别记录
    pub slow_statement_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/invoice_risk".to_string()),
            max_connections: 10,
            slow_statement_secs: 5,
        }
    }
}

/// 评分引擎参数 (全部为可调默认值)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub arithmetic: ArithmeticConfig,
    pub duplicate: DuplicateConfig,
    pub outlier: OutlierConfig,
    pub vendor_amount: VendorAmountConfig,
    pub penalties: PenaltyConfig,
    pub bands: RiskBandConfig,
    /// 低于该识别置信度时记录系统提示
    pub low_confidence: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            arithmetic: ArithmeticConfig::default(),
            duplicate: DuplicateConfig::default(),
            outlier: OutlierConfig::default(),
            vendor_amount: VendorAmountConfig::default(),
            penalties: PenaltyConfig::default(),
            bands: RiskBandConfig::default(),
            low_confidence: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArithmeticConfig {
    pub tolerance_ratio: f64,   // 金额的 1%
    pub tolerance_floor: f64,   // 或 1.0 货币单位，取大者
    pub medium_deviation: f64,
    pub high_deviation: f64,
}

impl Default for ArithmeticConfig {
    fn default() -> Self {
        Self {
            tolerance_ratio: 0.01,
            tolerance_floor: 1.0,
            medium_deviation: 0.05,
            high_deviation: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateConfig {
    pub date_window_days: u64,
    pub amount_tolerance_ratio: f64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            date_window_days: 3,
            amount_tolerance_ratio: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierConfig {
    pub min_population: usize,
    pub mad_scale: f64,
    pub flag_multiple: f64,
    pub high_multiple: f64,
    /// MAD 为 0 时的最小离散度 (中位数的比例)
    pub zero_spread_ratio: f64,
    /// 密度聚类半径 (离散度的倍数)
    pub density_radius: f64,
    pub density_min_points: usize,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            min_population: 5,
            mad_scale: 1.4826,
            flag_multiple: 3.0,
            high_multiple: 5.0,
            zero_spread_ratio: 0.01,
            density_radius: 1.0,
            density_min_points: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorAmountConfig {
    pub multiple: f64,
    pub min_history: usize,
    pub lookback_days: u64,
}

impl Default for VendorAmountConfig {
    fn default() -> Self {
        Self {
            multiple: 3.0,
            min_history: 3,
            lookback_days: 365,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyConfig {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            high: 25,
            medium: 12,
            low: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskBandConfig {
    pub low_risk_min: u32,
    pub medium_risk_min: u32,
}

impl Default for RiskBandConfig {
    fn default() -> Self {
        Self {
            low_risk_min: 80,
            medium_risk_min: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
    pub concurrency: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 3000,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub input_path: String,
    pub output_path: String,
    /// 为空则从数据库 t_rate_reference 读取
    pub rate_table_path: Option<String>,
    pub persist: bool,
    pub history_days: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_path: "invoices.json".to_string(),
            output_path: "findings.csv".to_string(),
            rate_table_path: None,
            persist: true,
            history_days: None,
        }
    }
}

impl AppConfig {
    /// 加载顺序：默认值 -> 配置文件 (可选) -> 环境变量 RISK__SECTION__KEY
    pub fn load(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("RISK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.penalties.high, 25);
        assert_eq!(config.penalties.medium, 12);
        assert_eq!(config.penalties.low, 5);
        assert_eq!(config.duplicate.date_window_days, 3);
        assert_eq!(config.outlier.min_population, 5);
        assert!((config.outlier.mad_scale - 1.4826).abs() < 1e-12);
    }

    #[test]
    fn test_load_without_file_falls_back_to_defaults() {
        let config = AppConfig::load("does-not-exist.toml").unwrap();
        assert_eq!(config.engine.bands.low_risk_min, 80);
        assert_eq!(config.verification.timeout_ms, 3000);
        assert!(config.batch.persist);
    }

    #[test]
    fn test_environment_overrides_defaults() {
        std::env::set_var("RISK__ENGINE__PENALTIES__HIGH", "30");
        std::env::set_var("RISK__DATABASE__MAX_CONNECTIONS", "4");
        let loaded = AppConfig::load("does-not-exist.toml");
        std::env::remove_var("RISK__ENGINE__PENALTIES__HIGH");
        std::env::remove_var("RISK__DATABASE__MAX_CONNECTIONS");

        let config = loaded.unwrap();
        assert_eq!(config.engine.penalties.high, 30);
        assert_eq!(config.engine.penalties.medium, 12);
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.database.slow_statement_secs, 5);
    }
}
