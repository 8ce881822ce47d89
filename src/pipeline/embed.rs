//! Batch embedding generation for changed products.
//!
//! The whole batch goes to the encoder in one call and the returned vectors
//! are assigned back strictly by index, so vector `i` always belongs to
//! product `i`. Any count or dimension mismatch fails the entire batch;
//! partially-filled embeddings are never produced.

use crate::catalog::Product;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("encoder failed: {0}")]
    Encoder(#[from] anyhow::Error),

    #[error("encoder returned {got} vectors for {expected} texts")]
    CountMismatch { expected: usize, got: usize },

    #[error("embedding for product {id} has {got} dimensions, expected {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        got: usize,
    },
}

/// Fixed template fed to the encoder for every product.
pub fn embed_text(product: &Product) -> String {
    format!(
        "Name: {}. Description: {}. Category: {}",
        product.name, product.description, product.category
    )
}

/// Embed `products` in one batch call and attach the vectors by index.
///
/// `encode` receives the full ordered text list and is invoked exactly once.
pub fn embed_products<F>(
    mut products: Vec<Product>,
    expected_dims: usize,
    encode: F,
) -> Result<Vec<Product>, EmbedError>
where
    F: FnOnce(&[String]) -> anyhow::Result<Vec<Vec<f32>>>,
{
    if products.is_empty() {
        return Ok(products);
    }

    let texts: Vec<String> = products.iter().map(embed_text).collect();
    let vectors = encode(&texts)?;

    if vectors.len() != products.len() {
        return Err(EmbedError::CountMismatch {
            expected: products.len(),
            got: vectors.len(),
        });
    }

    for (product, vector) in products.iter_mut().zip(vectors) {
        if vector.len() != expected_dims {
            return Err(EmbedError::DimensionMismatch {
                id: product.id.clone(),
                expected: expected_dims,
                got: vector.len(),
            });
        }
        product.embedding = Some(vector);
    }

    Ok(products)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, name: &str) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            description: "desc".to_string(),
            category: "Cat".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn embed_text_uses_fixed_template() {
        let p = product("1", "Mouse");
        assert_eq!(
            embed_text(&p),
            "Name: Mouse. Description: desc. Category: Cat"
        );
    }

    #[test]
    fn vectors_map_back_by_index() {
        let products = vec![product("1", "a"), product("2", "b"), product("3", "c")];

        // encode each text to a vector tagged with its batch position
        let embedded = embed_products(products, 2, |texts| {
            Ok(texts
                .iter()
                .enumerate()
                .map(|(i, _)| vec![i as f32, i as f32])
                .collect())
        })
        .unwrap();

        for (i, p) in embedded.iter().enumerate() {
            assert_eq!(p.embedding, Some(vec![i as f32, i as f32]));
        }
    }

    #[test]
    fn encoder_is_called_once_with_all_texts_in_order() {
        let products = vec![product("1", "a"), product("2", "b")];
        let mut calls = 0;

        embed_products(products, 1, |texts| {
            calls += 1;
            assert_eq!(texts.len(), 2);
            assert!(texts[0].contains("Name: a"));
            assert!(texts[1].contains("Name: b"));
            Ok(vec![vec![0.0], vec![0.0]])
        })
        .unwrap();

        assert_eq!(calls, 1);
    }

    #[test]
    fn empty_batch_skips_the_encoder() {
        let embedded = embed_products(vec![], 4, |_| {
            panic!("encoder must not be called for an empty batch")
        })
        .unwrap();
        assert!(embedded.is_empty());
    }

    #[test]
    fn count_mismatch_fails_the_whole_batch() {
        let products = vec![product("1", "a"), product("2", "b")];

        let err = embed_products(products, 2, |_| Ok(vec![vec![0.0, 0.0]])).unwrap_err();
        assert!(matches!(
            err,
            EmbedError::CountMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn dimension_mismatch_names_the_product() {
        let products = vec![product("p9", "a")];

        let err = embed_products(products, 3, |_| Ok(vec![vec![0.0]])).unwrap_err();
        match err {
            EmbedError::DimensionMismatch { id, expected, got } => {
                assert_eq!(id, "p9");
                assert_eq!(expected, 3);
                assert_eq!(got, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn encoder_failure_is_surfaced() {
        let products = vec![product("1", "a")];

        let err = embed_products(products, 2, |_| Err(anyhow::anyhow!("model crashed")))
            .unwrap_err();
        assert!(matches!(err, EmbedError::Encoder(_)));
    }
}
