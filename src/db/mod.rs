pub mod pool;
pub mod queries;
pub mod registry;

pub use pool::create_pool;
pub use queries::*;
pub use registry::PgRegistryVerifier;
