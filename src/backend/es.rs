//! Elasticsearch-compatible HTTP client for the search backend.
//!
//! Every call goes through one shared `reqwest::Client` with a configured
//! request timeout; a timed-out call surfaces as a failed operation, it is
//! never retried here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::catalog::Product;
use crate::config::BackendConfig;

use super::query;
use super::{BackendError, BulkReport, ProductPage, SearchBackend, SearchHit};

/// How many per-document bulk failures to keep verbatim in the report.
const BULK_ERROR_SAMPLES: usize = 5;

pub struct EsBackend {
    client: Client,
    base_url: String,
    index: String,
    categories_cap: u32,
}

impl EsBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            categories_cap: config.categories_cap,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn search(&self, body: Value) -> Result<SearchResponse, BackendError> {
        let response = self
            .client
            .post(self.url(&format!("{}/_search", self.index)))
            .json(&body)
            .send()
            .await?;

        let response = Self::check(response).await?;
        response
            .json::<SearchResponse>()
            .await
            .map_err(|err| BackendError::Malformed(err.to_string()))
    }
}

#[async_trait]
impl SearchBackend for EsBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        let response = self.client.get(&self.base_url).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn recreate_index(&self, dims: usize) -> Result<(), BackendError> {
        let delete = self
            .client
            .delete(self.url(&self.index))
            .send()
            .await?;
        // a missing index is fine, anything else is not
        if !delete.status().is_success() && delete.status() != StatusCode::NOT_FOUND {
            Self::check(delete).await?;
        }

        let create = self
            .client
            .put(self.url(&self.index))
            .json(&query::index_mapping(dims))
            .send()
            .await?;
        Self::check(create).await?;

        log::info!("created index '{}' with {dims}-dim cosine vectors", self.index);
        Ok(())
    }

    async fn bulk_load(&self, products: &[Product]) -> Result<BulkReport, BackendError> {
        let mut body = String::new();
        let mut sent = 0usize;
        for product in products {
            if product.id.trim().is_empty() {
                log::warn!("skipping product without id in bulk load: {:?}", product.name);
                continue;
            }
            let action =
                serde_json::json!({"index": {"_index": self.index, "_id": product.id}});
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(
                &serde_json::to_string(product)
                    .map_err(|err| BackendError::Malformed(err.to_string()))?,
            );
            body.push('\n');
            sent += 1;
        }

        if sent == 0 {
            return Ok(BulkReport::default());
        }

        let response = self
            .client
            .post(self.url("_bulk"))
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let response = Self::check(response).await?;
        let bulk: BulkResponse = response
            .json()
            .await
            .map_err(|err| BackendError::Malformed(err.to_string()))?;

        let mut report = BulkReport {
            indexed: 0,
            failed: 0,
            errors: vec![],
        };
        for item in bulk.items {
            match item.index.error {
                None => report.indexed += 1,
                Some(error) => {
                    report.failed += 1;
                    if report.errors.len() < BULK_ERROR_SAMPLES {
                        report.errors.push(format!(
                            "{}: {} ({})",
                            item.index.id.unwrap_or_else(|| "?".to_string()),
                            error.reason.unwrap_or_default(),
                            error.kind
                        ));
                    }
                }
            }
        }

        Ok(report)
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>, BackendError> {
        let response = self
            .client
            .get(self.url(&format!("{}/_doc/{id}", self.index)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::check(response).await?;
        let doc: DocResponse = response
            .json()
            .await
            .map_err(|err| BackendError::Malformed(err.to_string()))?;

        Ok(doc.found.then_some(doc.source).flatten())
    }

    async fn keyword_search(
        &self,
        tokens: &[String],
        category: Option<&str>,
        size: u32,
    ) -> Result<Vec<SearchHit>, BackendError> {
        let body = query::keyword_search_body(tokens, category, size);
        let response = self.search(body).await?;
        Ok(response.hits.into_hits())
    }

    async fn knn_search(
        &self,
        vector: &[f32],
        k: u32,
        exclude_id: Option<&str>,
    ) -> Result<Vec<SearchHit>, BackendError> {
        let body = query::knn_body(vector, k, exclude_id);
        let response = self.search(body).await?;
        Ok(response.hits.into_hits())
    }

    async fn list_products(
        &self,
        category: Option<&str>,
        from: u32,
        size: u32,
    ) -> Result<ProductPage, BackendError> {
        let body = query::listing_body(category, from, size);
        let response = self.search(body).await?;

        let total = response.hits.total.map(|t| t.value).unwrap_or(0);
        let data = response
            .hits
            .hits
            .into_iter()
            .map(|hit| hit.source)
            .collect();

        Ok(ProductPage { data, total })
    }

    async fn categories(&self) -> Result<Vec<String>, BackendError> {
        let body = query::categories_body(self.categories_cap);
        let response = self.search(body).await?;

        let aggregations = response.aggregations.ok_or_else(|| {
            BackendError::Malformed("response missing aggregations".to_string())
        })?;

        let buckets = aggregations.unique_categories.buckets;
        if buckets.len() as u32 >= self.categories_cap {
            log::warn!(
                "category aggregation hit the cap of {}; the list may be truncated",
                self.categories_cap
            );
        }

        let mut categories: Vec<String> = buckets.into_iter().map(|b| b.key).collect();
        categories.sort();
        Ok(categories)
    }
}

// --- wire types ---

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
    #[serde(default)]
    aggregations: Option<Aggregations>,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<RawHit>,
}

impl HitsEnvelope {
    fn into_hits(self) -> Vec<SearchHit> {
        self.hits
            .into_iter()
            .map(|hit| SearchHit {
                id: hit.id,
                score: hit.score.unwrap_or(0.0),
                product: hit.source,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct TotalHits {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f32>,
    #[serde(rename = "_source")]
    source: Product,
}

#[derive(Debug, Deserialize)]
struct DocResponse {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source", default)]
    source: Option<Product>,
}

#[derive(Debug, Deserialize)]
struct Aggregations {
    unique_categories: TermsAgg,
}

#[derive(Debug, Deserialize)]
struct TermsAgg {
    buckets: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
struct Bucket {
    key: String,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<BulkItem>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    index: BulkItemStatus,
}

#[derive(Debug, Deserialize)]
struct BulkItemStatus {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<BulkItemError>,
}

#[derive(Debug, Deserialize)]
struct BulkItemError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> EsBackend {
        EsBackend::new(&BackendConfig {
            url: "http://localhost:9200/".to_string(),
            index: "products".to_string(),
            request_timeout_secs: 30,
            categories_cap: 100,
            bulk_chunk_size: 500,
        })
        .unwrap()
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let es = backend();
        assert_eq!(es.url("products/_search"), "http://localhost:9200/products/_search");
    }

    #[test]
    fn search_response_parses_hits_and_total() {
        let raw = r#"{
            "hits": {
                "total": {"value": 42, "relation": "eq"},
                "hits": [
                    {"_id": "p1", "_score": 1.5, "_source": {"id": "p1", "name": "A"}},
                    {"_id": "p2", "_score": null, "_source": {"id": "p2", "name": "B"}}
                ]
            }
        }"#;

        let response: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.hits.total.as_ref().unwrap().value, 42);

        let hits = response.hits.into_hits();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "p1");
        assert_eq!(hits[0].score, 1.5);
        assert_eq!(hits[0].product.name, "A");
        // kNN responses can omit _score for filtered-out candidates
        assert_eq!(hits[1].score, 0.0);
    }

    #[test]
    fn aggregation_response_parses_buckets() {
        let raw = r#"{
            "hits": {"total": {"value": 3}, "hits": []},
            "aggregations": {
                "unique_categories": {
                    "buckets": [
                        {"key": "Phone", "doc_count": 2},
                        {"key": "Laptop", "doc_count": 1}
                    ]
                }
            }
        }"#;

        let response: SearchResponse = serde_json::from_str(raw).unwrap();
        let buckets = response.aggregations.unwrap().unique_categories.buckets;
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].key, "Phone");
    }

    #[test]
    fn bulk_response_separates_failures() {
        let raw = r#"{
            "took": 3,
            "errors": true,
            "items": [
                {"index": {"_id": "p1", "status": 201}},
                {"index": {"_id": "p2", "status": 400,
                    "error": {"type": "mapper_parsing_exception", "reason": "bad vector"}}}
            ]
        }"#;

        let bulk: BulkResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(bulk.items.len(), 2);
        assert!(bulk.items[0].index.error.is_none());

        let error = bulk.items[1].index.error.as_ref().unwrap();
        assert_eq!(error.kind, "mapper_parsing_exception");
        assert_eq!(error.reason.as_deref(), Some("bad vector"));
    }

    #[test]
    fn doc_response_parses_found_and_missing() {
        let found: DocResponse = serde_json::from_str(
            r#"{"_id": "p1", "found": true, "_source": {"id": "p1", "name": "A"}}"#,
        )
        .unwrap();
        assert!(found.found);
        assert_eq!(found.source.unwrap().id, "p1");

        let missing: DocResponse =
            serde_json::from_str(r#"{"_id": "p1", "found": false}"#).unwrap();
        assert!(!missing.found);
        assert!(missing.source.is_none());
    }
}
