pub mod dynamo_catalog;
pub mod memory_catalog;

use async_trait::async_trait;
use shared::{FilterPredicate, ProductRecord};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog error: {0}")]
    Backend(String),
    #[error("malformed catalog row: {0}")]
    InvalidRow(String),
}

/// Read-only view of the product catalog. Row order is backend-defined;
/// callers must not rely on anything beyond set equality.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn filter_products(
        &self,
        predicate: &FilterPredicate,
    ) -> Result<Vec<ProductRecord>, CatalogError>;
}
