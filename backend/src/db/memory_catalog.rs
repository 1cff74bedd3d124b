use shared::{FilterPredicate, ProductRecord};

use super::{CatalogError, ProductCatalog};

/// Catalog over an in-memory row set; shares the predicate semantics with
/// the DynamoDB backend through `FilterPredicate::matches`.
pub struct MemoryCatalog {
    records: Vec<ProductRecord>,
}

impl MemoryCatalog {
    pub fn new(records: Vec<ProductRecord>) -> Self {
        Self { records }
    }
}

#[async_trait::async_trait]
impl ProductCatalog for MemoryCatalog {
    async fn filter_products(
        &self,
        predicate: &FilterPredicate,
    ) -> Result<Vec<ProductRecord>, CatalogError> {
        let limit = predicate.limit.map_or(usize::MAX, |limit| limit as usize);
        Ok(self
            .records
            .iter()
            .filter(|record| predicate.matches(record))
            .take(limit)
            .cloned()
            .collect())
    }
}
