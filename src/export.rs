use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::{AppError, EngineError};
use crate::models::{ComplianceResult, InvoiceRecord};

const HEADER: [&str; 9] = [
    "invoice_number",
    "vendor_name",
    "score",
    "risk_level",
    "finding_seq",
    "finding_type",
    "severity",
    "location",
    "description",
];

/// 导出评分结果到 CSV (每条发现一行；无发现的发票输出一行空发现；被拒绝的发票标记 REJECTED)
pub fn export_findings(
    records: &[InvoiceRecord],
    results: &[Result<ComplianceResult, EngineError>],
    output_path: &Path,
) -> Result<usize, AppError> {
    let file = File::create(output_path)?;
    let rows = write_findings(file, records, results)?;
    tracing::info!("Exported {} rows to {}", rows, output_path.display());
    Ok(rows)
}

pub fn write_findings<W: Write>(
    out: W,
    records: &[InvoiceRecord],
    results: &[Result<ComplianceResult, EngineError>],
) -> Result<usize, AppError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(HEADER)?;

    let mut rows = 0;
    for (record, result) in records.iter().zip(results) {
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                writer.write_record([
                    record.invoice_number.as_str(),
                    record.vendor_name.as_str(),
                    "",
                    "REJECTED",
                    "",
                    "",
                    "",
                    "",
                    e.to_string().as_str(),
                ])?;
                rows += 1;
                continue;
            }
        };

        let score = result.score.to_string();
        let risk_level = result.risk_level.to_string();
        if result.findings.is_empty() {
            writer.write_record([
                record.invoice_number.as_str(),
                record.vendor_name.as_str(),
                score.as_str(),
                risk_level.as_str(),
                "",
                "",
                "",
                "",
                "",
            ])?;
            rows += 1;
            continue;
        }

        for (seq, finding) in result.findings.iter().enumerate() {
            writer.write_record([
                record.invoice_number.clone(),
                record.vendor_name.clone(),
                score.clone(),
                risk_level.clone(),
                (seq + 1).to_string(),
                finding.kind.name().to_string(),
                finding.severity.to_string(),
                finding.location.to_string(),
                finding.description.clone(),
            ])?;
            rows += 1;
        }
    }

    writer.flush()?;
    Ok(rows)
}
