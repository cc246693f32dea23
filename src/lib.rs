pub mod cli;
pub mod database_ops;
pub mod report;
pub mod tracing;

pub mod util {
    pub mod env;
}

pub use database_ops::catalog::{Statement, StatementOutput};
pub use database_ops::config::{DbConfig, TlsPolicy};
pub use database_ops::db::{with_session, Session};
pub use database_ops::error::{CatalogError, CatalogResult};
pub use database_ops::product::{Language, LocalizedField, Product, ProductType};
