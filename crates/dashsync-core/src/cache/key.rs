use std::fmt;

use serde::Serialize;

/// Cache key: a pure function of the operation and its normalized parameters.
///
/// Parameters are trimmed, empty values dropped, and sorted, so the same
/// logical query always maps to the same key regardless of argument order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(op: &str) -> Self {
        Self(escape(op.trim()))
    }

    pub fn with_params<I, K, V>(op: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut pairs: Vec<(String, String)> = params
            .into_iter()
            .map(|(k, v)| (k.as_ref().trim().to_string(), v.as_ref().trim().to_string()))
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .collect();
        pairs.sort();
        pairs.dedup();

        let mut key = escape(op.trim());
        for (i, (k, v)) in pairs.iter().enumerate() {
            key.push(if i == 0 { '?' } else { '&' });
            key.push_str(&escape(k));
            key.push('=');
            key.push_str(&escape(v));
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            '?' => out.push_str("%3F"),
            _ => out.push(c),
        }
    }
    out
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(op: &str) -> Self {
        CacheKey::new(op)
    }
}
