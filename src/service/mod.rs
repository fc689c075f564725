pub mod aggregator;
pub mod arithmetic;
pub mod duplicate;
pub mod engine;
pub mod identifier;
pub mod price_outlier;
pub mod rate_code;
pub mod vendor_amount;

pub use aggregator::RiskAggregator;
pub use arithmetic::ArithmeticVerifier;
pub use duplicate::DuplicateDetector;
pub use engine::{BatchSummary, ComplianceEngine};
pub use identifier::IdentifierValidator;
pub use price_outlier::{PricePopulation, PriceOutlierDetector};
pub use rate_code::RateCodeChecker;
pub use vendor_amount::VendorAmountCheck;
