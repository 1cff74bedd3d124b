use std::collections::HashMap;

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use log::debug;
use shared::{FilterPredicate, ProductRecord};

use super::{CatalogError, ProductCatalog};

/// Product catalog over a DynamoDB table. The filter expression is built
/// from the typed predicate with expression attribute placeholders; request
/// field values never appear in the expression text itself.
#[derive(Clone)]
pub struct DynamoCatalog {
    client: Client,
    table_name: String,
}

struct ScanFilter {
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl DynamoCatalog {
    pub fn new(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    fn build_filter(predicate: &FilterPredicate) -> ScanFilter {
        let mut conditions = Vec::new();
        let mut names = HashMap::new();
        let mut values = HashMap::new();

        let mut equality = |field: &str, value: &str| {
            conditions.push(format!("#{field} = :{field}"));
            names.insert(format!("#{field}"), field.to_string());
            values.insert(format!(":{field}"), AttributeValue::S(value.to_string()));
        };

        equality("gender", &predicate.gender);
        if let Some(master_category) = &predicate.master_category {
            equality("master_category", master_category);
        }
        if let Some(sub_category) = &predicate.sub_category {
            equality("sub_category", sub_category);
        }
        if let Some(article_type) = &predicate.article_type {
            equality("article_type", article_type);
        }
        if let Some(base_colour) = &predicate.base_colour {
            equality("base_colour", base_colour);
        }
        if let Some(season) = &predicate.season {
            equality("season", season);
        }
        if let Some(usage) = &predicate.usage {
            equality("usage", usage);
        }

        match (predicate.start_year, predicate.end_year) {
            (Some(start), Some(end)) => {
                conditions.push("#year BETWEEN :start_year AND :end_year".to_string());
                names.insert("#year".to_string(), "year".to_string());
                values.insert(":start_year".to_string(), AttributeValue::N(start.to_string()));
                values.insert(":end_year".to_string(), AttributeValue::N(end.to_string()));
            }
            (Some(start), None) => {
                conditions.push("#year = :start_year".to_string());
                names.insert("#year".to_string(), "year".to_string());
                values.insert(":start_year".to_string(), AttributeValue::N(start.to_string()));
            }
            (None, Some(end)) => {
                conditions.push("#year <= :end_year".to_string());
                names.insert("#year".to_string(), "year".to_string());
                values.insert(":end_year".to_string(), AttributeValue::N(end.to_string()));
            }
            (None, None) => {}
        }

        ScanFilter {
            expression: conditions.join(" AND "),
            names,
            values,
        }
    }
}

#[async_trait::async_trait]
impl ProductCatalog for DynamoCatalog {
    async fn filter_products(
        &self,
        predicate: &FilterPredicate,
    ) -> Result<Vec<ProductRecord>, CatalogError> {
        let filter = Self::build_filter(predicate);
        let limit = predicate.limit.map_or(usize::MAX, |limit| limit as usize);
        debug!("catalog scan filter: {}", filter.expression);

        let mut records = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let mut request = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression(filter.expression.clone())
                .set_expression_attribute_names(Some(filter.names.clone()))
                .set_expression_attribute_values(Some(filter.values.clone()));
            if let Some(key) = start_key.take() {
                request = request.set_exclusive_start_key(Some(key));
            }
            let response = request
                .send()
                .await
                .map_err(|e| CatalogError::Backend(e.to_string()))?;

            for item in response.items() {
                records.push(item_to_record(item)?);
                if records.len() >= limit {
                    return Ok(records);
                }
            }
            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }
        Ok(records)
    }
}

fn item_to_record(item: &HashMap<String, AttributeValue>) -> Result<ProductRecord, CatalogError> {
    let string_field = |name: &str| -> Result<String, CatalogError> {
        item.get(name)
            .and_then(|av| av.as_s().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| CatalogError::InvalidRow(format!("missing {name}")))
    };
    let year = item
        .get("year")
        .and_then(|av| av.as_n().ok())
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| CatalogError::InvalidRow("missing year".to_string()))?;
    Ok(ProductRecord {
        image_id: string_field("image_id")?,
        gender: string_field("gender")?,
        master_category: string_field("master_category")?,
        sub_category: string_field("sub_category")?,
        article_type: string_field("article_type")?,
        base_colour: string_field("base_colour")?,
        season: string_field("season")?,
        year,
        usage: string_field("usage")?,
        display_name: string_field("display_name")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predicate() -> FilterPredicate {
        FilterPredicate {
            gender: "Women".to_string(),
            master_category: None,
            sub_category: Some("Dress".to_string()),
            article_type: None,
            base_colour: None,
            season: None,
            start_year: Some(2012),
            end_year: None,
            usage: None,
            limit: Some(10),
            augmentation_config: None,
        }
    }

    #[test]
    fn filter_expression_uses_placeholders_only() {
        let filter = DynamoCatalog::build_filter(&predicate());
        assert_eq!(
            filter.expression,
            "#gender = :gender AND #sub_category = :sub_category AND #year = :start_year"
        );
        assert!(!filter.expression.contains("Women"));
        assert_eq!(filter.names.get("#year"), Some(&"year".to_string()));
        assert_eq!(
            filter.values.get(":gender"),
            Some(&AttributeValue::S("Women".to_string()))
        );
    }

    #[test]
    fn year_bounds_become_a_between_clause() {
        let mut p = predicate();
        p.end_year = Some(2014);
        let filter = DynamoCatalog::build_filter(&p);
        assert!(
            filter
                .expression
                .ends_with("#year BETWEEN :start_year AND :end_year")
        );
        assert_eq!(
            filter.values.get(":end_year"),
            Some(&AttributeValue::N("2014".to_string()))
        );
    }
}
