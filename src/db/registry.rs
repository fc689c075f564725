use sqlx::PgPool;

use super::queries;
use crate::verification::{TaxIdVerdict, TaxIdVerifier, VerifierFault};

/// 基于本地登记缓存表 (t_taxid_registry) 的税号查询
pub struct PgRegistryVerifier {
    pool: PgPool,
}

impl PgRegistryVerifier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl TaxIdVerifier for PgRegistryVerifier {
    async fn verify(&self, tax_id: &str) -> Result<TaxIdVerdict, VerifierFault> {
        match queries::find_registry(&self.pool, tax_id).await {
            Ok(Some(row)) => Ok(TaxIdVerdict {
                is_valid: true,
                is_active: row.fstatus.trim().eq_ignore_ascii_case("active"),
                legal_name: row.flegalname,
                trade_name: row.ftradename.filter(|t| !t.trim().is_empty()),
            }),
            // 未登记
            Ok(None) => Ok(TaxIdVerdict {
                is_valid: false,
                is_active: false,
                legal_name: String::new(),
                trade_name: None,
            }),
            Err(e) => Err(VerifierFault(e.to_string())),
        }
    }
}
