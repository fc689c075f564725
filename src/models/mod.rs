pub mod finding;
pub mod invoice;
pub mod reference;
pub mod result;
pub mod stored;

pub use finding::{
    Finding, FindingKind, FindingLocation, MismatchReason, PriceDeviation, Severity,
    SystemNote, TaxIdDefect,
};
pub use invoice::{InvoiceRecord, LineItem};
pub use reference::{CodeKind, RateRow, RateTable};
pub use result::{ComplianceResult, RiskLevel};
pub use stored::{InvoiceRow, LineItemRow, RegistryRow};
