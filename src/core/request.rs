//! Transport-independent view of an inbound request
//!
//! Authenticators and the router only need the request head; the body is
//! handled by the server crate.

use std::collections::BTreeMap;

/// Decoded query parameters (last value wins for repeated keys)
pub type Params = BTreeMap<String, String>;

/// Header multimap with case-insensitive names
///
/// Names are stored lower-cased. Repeated headers keep their arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header value
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .push((name.as_ref().to_ascii_lowercase(), value.into()));
    }

    /// First value for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Every value for `name`, in arrival order
    pub fn get_all<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> + 'n
    where
        'a: 'n,
    {
        self.entries
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// Method, path, headers and query of a request
#[derive(Debug, Clone, Default)]
pub struct RequestHead {
    pub host: String,
    pub method: String,
    /// Percent-decoded path, e.g. `/folder/file.txt`
    pub path: String,
    pub headers: Headers,
    pub params: Params,
    pub client_ip: Option<String>,
}

impl RequestHead {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        RequestHead {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Query parameter lookup; a bare `?flag` has an empty value
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// Value of cookie `name` across all `Cookie` headers
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all("cookie")
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.trim())
    }
}
