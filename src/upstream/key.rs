use std::collections::BTreeMap;

use super::EndpointKind;

/// Derives the cache key for one logical request.
///
/// The key is an exact serialization of the endpoint kind and the
/// canonically ordered parameter set: equal requests always produce the
/// same key and distinct requests never collide. No hashing, so a key
/// found in the cache can be read straight back into the request that
/// produced it. Names and values are percent-encoded to keep `&`/`=`
/// unambiguous. Pure function, no I/O.
pub fn derive(kind: EndpointKind, params: &BTreeMap<String, String>) -> String {
    let mut key = String::from(kind.name());
    key.push('?');
    for (i, (name, value)) in params.iter().enumerate() {
        if i > 0 {
            key.push('&');
        }
        key.push_str(&urlencoding::encode(name));
        key.push('=');
        key.push_str(&urlencoding::encode(value));
    }
    key
}
