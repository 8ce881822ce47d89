//! Content fingerprints for change detection.

use sha2::{Digest, Sha256};

use crate::catalog::Product;

/// Fields are joined with a unit separator so that moving characters
/// between adjacent fields cannot produce the same digest input.
const FIELD_SEPARATOR: u8 = 0x1f;

/// Compute the fingerprint of a product's canonical fields.
///
/// The canonical field list is fixed and documented: `id`, `name`,
/// `description`, `category`, `price`, `image_url`, in that order. `price`
/// is coerced to its decimal form, `None` to the empty string. Derived
/// fields (`content_hash`, `embedding`) never participate, so a record's
/// fingerprint is stable across pipeline runs.
pub fn content_hash(product: &Product) -> String {
    let price = product.price.map(|p| p.to_string()).unwrap_or_default();

    let fields = [
        product.id.as_str(),
        product.name.as_str(),
        product.description.as_str(),
        product.category.as_str(),
        price.as_str(),
        product.image_url.as_str(),
    ];

    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update([FIELD_SEPARATOR]);
        }
        hasher.update(field.as_bytes());
    }

    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
