use url::form_urlencoded;

use crate::error::{Error, Result};

/// An ordered set of query or form parameters.
///
/// Empty values are never emitted: a parameter the caller left blank is omitted
/// entirely instead of being sent as `key=`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `key=value` unless `value` is empty.
    pub fn push(mut self, key: &str, value: impl AsRef<str>) -> Self {
        let value = value.as_ref();
        if !value.is_empty() {
            self.pairs.push((key.to_string(), value.to_string()));
        }
        self
    }

    /// Appends `key=value` for `Some` values.
    pub fn push_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.push(key, v.to_string()),
            None => self,
        }
    }

    /// Repeats `key=value` once per element, in the order given.
    pub fn push_all<I, V>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: AsRef<str>,
    {
        for v in values {
            self = self.push(key, v);
        }
        self
    }

    /// Appends `key=value`, failing with [`Error::InvalidArgument`] when `value` is empty.
    pub fn require(self, key: &str, value: impl AsRef<str>) -> Result<Self> {
        if value.as_ref().trim().is_empty() {
            return Err(Error::InvalidArgument(format!("'{}' parameter is required", key)));
        }
        Ok(self.push(key, value))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `application/x-www-form-urlencoded` rendering of the pairs.
    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }

    /// Appends the encoded pairs to `base`, choosing `?` or `&` as needed.
    pub fn with_query(&self, base: &str) -> String {
        if self.pairs.is_empty() {
            return base.to_string();
        }
        let sep = if base.contains('?') { '&' } else { '?' };
        format!("{}{}{}", base, sep, self.encode())
    }
}

/// Fails with [`Error::InvalidArgument`] unless at least one of `values` is non-empty.
pub(crate) fn require_one_of(names: &[&str], values: &[&str]) -> Result<()> {
    if values.iter().any(|v| !v.trim().is_empty()) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "either {} parameter is required",
            names
                .iter()
                .map(|n| format!("'{}'", n))
                .collect::<Vec<_>>()
                .join(" or ")
        )))
    }
}
