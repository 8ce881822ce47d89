//! Search backend abstraction.
//!
//! The backend stores product records and serves both inverted-index text
//! queries and nearest-neighbor vector queries. The retrieval layer talks
//! to it exclusively through [`SearchBackend`] so handlers can be tested
//! against an in-memory mock.

mod es;
pub mod query;

pub use es::EsBackend;

use async_trait::async_trait;

use crate::catalog::Product;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected backend response: {0}")]
    Malformed(String),
}

/// One scored hit from a search or kNN query.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub product: Product,
}

/// One page of catalog records plus the total matching count.
#[derive(Debug, Clone)]
pub struct ProductPage {
    pub data: Vec<Product>,
    pub total: u64,
}

/// Outcome of one bulk indexing request. Individual document failures are
/// counted and sampled, never hidden behind an overall success.
#[derive(Debug, Default)]
pub struct BulkReport {
    pub indexed: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl BulkReport {
    pub fn absorb(&mut self, other: BulkReport) {
        self.indexed += other.indexed;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Reachability check; fatal at startup when it fails.
    async fn ping(&self) -> Result<(), BackendError>;

    /// Drop and recreate the index with the vector mapping.
    async fn recreate_index(&self, dims: usize) -> Result<(), BackendError>;

    /// Index a batch of products in one bulk request, keyed by product id.
    async fn bulk_load(&self, products: &[Product]) -> Result<BulkReport, BackendError>;

    /// Fetch a single product by id.
    async fn get_product(&self, id: &str) -> Result<Option<Product>, BackendError>;

    /// Disjunctive token match over name/description, optional exact
    /// category restriction.
    async fn keyword_search(
        &self,
        tokens: &[String],
        category: Option<&str>,
        size: u32,
    ) -> Result<Vec<SearchHit>, BackendError>;

    /// k nearest neighbors by cosine similarity, optionally excluding one id.
    async fn knn_search(
        &self,
        vector: &[f32],
        k: u32,
        exclude_id: Option<&str>,
    ) -> Result<Vec<SearchHit>, BackendError>;

    /// Offset-paginated listing with total count.
    async fn list_products(
        &self,
        category: Option<&str>,
        from: u32,
        size: u32,
    ) -> Result<ProductPage, BackendError>;

    /// Distinct category labels, sorted lexicographically, bounded by the
    /// configured cap.
    async fn categories(&self) -> Result<Vec<String>, BackendError>;
}
