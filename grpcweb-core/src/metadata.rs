//! Header and trailer metadata.
//!
//! [`Metadata`] wraps an [`http::HeaderMap`], so keys are always lowercase and
//! a key may carry several values in insertion order.

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;

/// Response or request metadata (headers and trailers).
///
/// # Example
///
/// ```
/// use grpcweb_core::Metadata;
///
/// let mut md = Metadata::empty();
/// md.append("Hakase", "shinonome");
/// md.append("hakase", "nano");
///
/// assert_eq!(md.get("hakase"), Some("shinonome"));
/// assert_eq!(md.get_all("hakase").collect::<Vec<_>>(), ["shinonome", "nano"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    headers: HeaderMap,
}

impl Metadata {
    /// Create new metadata from HTTP headers.
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Create empty metadata.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get the first value for a key.
    ///
    /// Returns `None` if the key is not present or the value is not UTF-8.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(value_str)
    }

    /// Check if a key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.headers.contains_key(key)
    }

    /// Get all values for a key, in insertion order.
    pub fn get_all(&self, key: &str) -> impl Iterator<Item = &str> {
        self.headers
            .get_all(key)
            .iter()
            .filter_map(value_str)
    }

    /// Append a value, keeping any existing values for the key.
    ///
    /// The key is lowercased. Returns `false` (and stores nothing) if the key
    /// or value is not a valid HTTP header name or value.
    pub fn append(&mut self, key: &str, value: &str) -> bool {
        let Ok(name) = HeaderName::from_bytes(key.to_ascii_lowercase().as_bytes()) else {
            return false;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            return false;
        };
        self.headers.append(name, value);
        true
    }

    /// Replace all values for a key with a single value.
    pub fn insert(&mut self, key: &str, value: &str) -> bool {
        let Ok(name) = HeaderName::from_bytes(key.to_ascii_lowercase().as_bytes()) else {
            return false;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            return false;
        };
        self.headers.insert(name, value);
        true
    }

    /// Get the underlying HeaderMap.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Consume self and return the underlying HeaderMap.
    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }

    /// Iterate over all key/value pairs, skipping values that are not UTF-8.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .filter_map(|(k, v)| value_str(v).map(|v| (k.as_str(), v)))
    }

    /// Returns true if there is no metadata.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Render as an HTTP header block: one `key: value\r\n` line per value.
    pub fn to_header_block(&self) -> Vec<u8> {
        let mut block = Vec::new();
        for (name, value) in self.headers.iter() {
            block.extend_from_slice(name.as_str().as_bytes());
            block.extend_from_slice(b": ");
            block.extend_from_slice(value.as_bytes());
            block.extend_from_slice(b"\r\n");
        }
        block
    }

    /// Parse an HTTP header block leniently.
    ///
    /// Lines without a `:` separator and invalid names or values are skipped.
    pub fn from_header_block(block: &[u8]) -> Self {
        let mut metadata = Self::empty();
        for line in String::from_utf8_lossy(block).lines() {
            if let Some((key, value)) = line.split_once(':') {
                metadata.append(key.trim(), value.trim());
            }
        }
        metadata
    }
}

// `HeaderValue::to_str` only admits visible ASCII; values set through `append`
// are any UTF-8 text.
fn value_str(value: &HeaderValue) -> Option<&str> {
    std::str::from_utf8(value.as_bytes()).ok()
}

impl From<HeaderMap> for Metadata {
    fn from(headers: HeaderMap) -> Self {
        Self::new(headers)
    }
}

impl From<Metadata> for HeaderMap {
    fn from(metadata: Metadata) -> Self {
        metadata.headers
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Self::empty();
        for (k, v) in iter {
            metadata.append(k.as_ref(), v.as_ref());
        }
        metadata
    }
}
