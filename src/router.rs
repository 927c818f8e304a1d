//! Radix-tree route resolver.
//!
//! One [`matchit`] tree per HTTP method, mapping a path to an *endpoint*
//! name. Handlers are looked up by endpoint afterwards, so the same resolver
//! can also run backwards and build a URL from an endpoint plus parameters
//! (see [`url_for`](crate::url_for)).

use std::collections::{BTreeMap, HashMap};

use http::Method;
use matchit::Router as MatchitRouter;

use crate::error::{Error, HttpError};
use crate::urls::{encode_into, percent_decode};

/// Path parameters extracted by a successful match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params(HashMap<String, String>);

impl Params {
    /// For a route `/users/{id}`, `params.get("id")` on `/users/42` returns
    /// `Some("42")`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// The endpoint a request resolved to, with its path parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteMatch {
    endpoint: String,
    params: Params,
}

impl RouteMatch {
    pub fn endpoint(&self) -> &str { &self.endpoint }
    pub fn params(&self) -> &Params { &self.params }
}

/// The application's URL map.
///
/// Built once at startup through [`App`](crate::App); read-only while
/// serving.
#[derive(Default)]
pub struct Router {
    trees: HashMap<Method, MatchitRouter<String>>,
    patterns: HashMap<String, Vec<String>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `pattern` to `endpoint` for each of `methods`.
    ///
    /// Patterns use `{name}` for one segment and `{*name}` for the rest of
    /// the path.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is malformed or already registered for one of
    /// the methods.
    pub fn add(&mut self, pattern: &str, endpoint: &str, methods: &[Method]) {
        for method in methods {
            self.trees
                .entry(method.clone())
                .or_default()
                .insert(pattern, endpoint.to_owned())
                .unwrap_or_else(|e| panic!("invalid route `{method} {pattern}`: {e}"));
        }
        self.patterns.entry(endpoint.to_owned()).or_default().push(pattern.to_owned());
    }

    /// Resolves `method path` to an endpoint.
    ///
    /// `HEAD` falls back to the `GET` route. A path that exists under other
    /// methods yields `405` with those methods listed; anything else is `404`.
    /// Parameters come back percent-decoded.
    pub fn lookup(&self, method: &Method, path: &str) -> Result<RouteMatch, HttpError> {
        let fallback = (method == Method::HEAD).then_some(&Method::GET);
        for candidate in std::iter::once(method).chain(fallback) {
            let Some(tree) = self.trees.get(candidate) else { continue };
            if let Ok(matched) = tree.at(path) {
                let params = matched.params.iter()
                    .map(|(name, value)| (name, percent_decode(value, false)))
                    .collect();
                return Ok(RouteMatch { endpoint: matched.value.clone(), params });
            }
        }

        let mut allow: Vec<Method> = self.trees.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(m, _)| m.clone())
            .collect();
        if allow.is_empty() {
            return Err(HttpError::not_found());
        }
        if allow.contains(&Method::GET) && !allow.contains(&Method::HEAD) {
            allow.push(Method::HEAD);
        }
        allow.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Err(HttpError::method_not_allowed(allow))
    }

    /// Builds a URL for `endpoint`.
    ///
    /// Parameters named in the pattern are substituted; the rest are
    /// appended as a query string sorted by key. When an endpoint has several
    /// patterns, the first one whose parameters are all supplied wins.
    pub fn build(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String, Error> {
        let patterns = self.patterns.get(endpoint).ok_or_else(|| Error::Build {
            endpoint: endpoint.to_owned(),
            reason: "no such endpoint".to_owned(),
        })?;
        let values: BTreeMap<&str, &str> = params.iter().copied().collect();

        let mut last_reason = String::new();
        for pattern in patterns {
            match expand(pattern, &values) {
                Ok(url) => return Ok(url),
                Err(reason) => last_reason = reason,
            }
        }
        Err(Error::Build { endpoint: endpoint.to_owned(), reason: last_reason })
    }
}

fn expand(pattern: &str, values: &BTreeMap<&str, &str>) -> Result<String, String> {
    let mut url = String::new();
    let mut used = Vec::new();
    let mut rest = pattern;

    while let Some(open) = rest.find('{') {
        if rest[open..].starts_with("{{") {
            push_literal(&mut url, &rest[..=open]);
            rest = &rest[open + 2..];
            continue;
        }
        push_literal(&mut url, &rest[..open]);
        let close = rest[open..].find('}')
            .map(|i| i + open)
            .ok_or_else(|| format!("unterminated parameter in `{pattern}`"))?;
        let placeholder = &rest[open + 1..close];
        let (name, catch_all) = match placeholder.strip_prefix('*') {
            Some(name) => (name, true),
            None => (placeholder, false),
        };
        let value = values.get(name).ok_or_else(|| format!("missing parameter `{name}`"))?;
        encode_into(&mut url, value, catch_all);
        used.push(name);
        rest = &rest[close + 1..];
    }
    push_literal(&mut url, rest);

    let mut separator = '?';
    for (key, value) in values.iter().filter(|(k, _)| !used.contains(*k)) {
        url.push(separator);
        encode_into(&mut url, key, false);
        url.push('=');
        encode_into(&mut url, value, false);
        separator = '&';
    }
    Ok(url)
}

fn push_literal(url: &mut String, literal: &str) {
    url.push_str(&literal.replace("}}", "}"));
}
