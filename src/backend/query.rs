//! Query body construction for the search backend.
//!
//! Pure builders returning `serde_json::Value`, so the exact shape sent to
//! the backend is unit-testable without a live index.

use serde_json::{json, Value};

/// Candidate pool size for approximate kNN.
pub const KNN_NUM_CANDIDATES: u32 = 50;

/// Split query text into whitespace-delimited tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Query text for category-steered semantic suggestions.
///
/// The category label is fused into the text itself rather than applied as
/// a hard filter, steering the vector toward the category's neighborhood
/// while still letting strong cross-category matches surface.
pub fn semantic_query_text(text: &str, category: Option<&str>) -> String {
    match category {
        Some(category) => format!("{category} | {text}"),
        None => text.to_string(),
    }
}

/// Disjunctive per-token match over `name` (boosted) and `description`,
/// requiring at least one token to match, optionally restricted to an
/// exact category.
pub fn keyword_search_body(tokens: &[String], category: Option<&str>, size: u32) -> Value {
    let mut should = Vec::with_capacity(tokens.len() * 2);
    for token in tokens {
        should.push(json!({"match": {"name": {"query": token, "boost": 2.0}}}));
        should.push(json!({"match": {"description": token}}));
    }

    let mut filter = Vec::new();
    if let Some(category) = category {
        filter.push(json!({"term": {"category": category}}));
    }

    json!({
        "size": size,
        "query": {
            "bool": {
                "should": should,
                "minimum_should_match": 1,
                "filter": filter,
            }
        }
    })
}

/// kNN body over the embedding field. Self-exclusion goes through an ids
/// must_not filter inside the knn clause, not by over-fetching and dropping
/// the top hit, which breaks under score ties.
pub fn knn_body(vector: &[f32], k: u32, exclude_id: Option<&str>) -> Value {
    let mut knn = json!({
        "field": "embedding",
        "query_vector": vector,
        "k": k,
        "num_candidates": KNN_NUM_CANDIDATES,
    });

    if let Some(id) = exclude_id {
        knn["filter"] = json!({"bool": {"must_not": [{"ids": {"values": [id]}}]}});
    }

    json!({"size": k, "knn": knn})
}

/// Offset-paginated catalog listing, category-filtered or unfiltered.
pub fn listing_body(category: Option<&str>, from: u32, size: u32) -> Value {
    let query = match category {
        Some(category) => json!({"term": {"category": category}}),
        None => json!({"match_all": {}}),
    };

    json!({
        "from": from,
        "size": size,
        "query": query,
        "track_total_hits": true,
    })
}

/// Distinct category labels via a terms aggregation, bounded by `cap`.
pub fn categories_body(cap: u32) -> Value {
    json!({
        "size": 0,
        "aggs": {
            "unique_categories": {
                "terms": {"field": "category", "size": cap}
            }
        }
    })
}

/// Index mapping: keyword identity/filter fields, analyzed text fields,
/// and a cosine dense_vector whose width must equal the encoder's.
pub fn index_mapping(dims: usize) -> Value {
    json!({
        "mappings": {
            "properties": {
                "id": {"type": "keyword"},
                "name": {"type": "text", "analyzer": "standard"},
                "description": {"type": "text", "analyzer": "standard"},
                "category": {"type": "keyword"},
                "price": {"type": "float"},
                "image_url": {"type": "keyword", "index": false},
                "content_hash": {"type": "keyword", "index": false},
                "embedding": {
                    "type": "dense_vector",
                    "dims": dims,
                    "index": true,
                    "similarity": "cosine",
                }
            }
        }
    })
}
