use std::collections::HashSet;
use std::fmt;

use regex::Regex;
use serde_json::{Map, Value, json};

use crate::config::TransferConfig;
use crate::error::QueryError;

/// A required `key=value` property constraint. The value may use the server's
/// wildcard syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub key: String,
    pub value: String,
}

/// Parses a property filter of the form `key1=value1;key2=value2,...`.
pub fn parse_props(props: &str) -> Result<Vec<Property>, QueryError> {
    if props.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut seen = HashSet::new();
    props
        .split([';', ','])
        .map(|entry| {
            let malformed = || QueryError::MalformedProperty {
                props: props.to_string(),
                entry: entry.to_string(),
            };
            let (key, value) = entry.split_once('=').ok_or_else(malformed)?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() || value.contains('=') {
                return Err(malformed());
            }
            if !seen.insert(key.to_string()) {
                return Err(QueryError::DuplicateProperty {
                    props: props.to_string(),
                    key: key.to_string(),
                });
            }
            Ok(Property {
                key: key.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PathPair {
    path: String,
    name: String,
}

impl PathPair {
    fn new(path: &str, name: &str) -> Self {
        Self {
            path: path.to_string(),
            name: name.to_string(),
        }
    }
}

fn join(dir: &str, segment: &str) -> String {
    if dir.is_empty() {
        segment.to_string()
    } else {
        format!("{}/{}", dir, segment)
    }
}

/// The server stores path and name separately, so one wildcard pattern becomes
/// several (path, name) alternatives. When recursive, every `*` in the name
/// segment may also swallow intermediate directories.
fn path_pairs(pattern: &str, recursive: bool) -> Vec<PathPair> {
    let default_path = if recursive { "*" } else { "." };
    if pattern.is_empty() || pattern == "*" {
        return vec![PathPair::new(default_path, "*")];
    }

    let (dir, name) = pattern.rsplit_once('/').unwrap_or(("", pattern));
    let name = if name.is_empty() { "*" } else { name };
    let mut pairs = vec![PathPair::new(if dir.is_empty() { "." } else { dir }, name)];
    if !recursive {
        return pairs;
    }

    if name == "*" {
        pairs.push(PathPair::new(&join(dir, "*"), "*"));
        return pairs;
    }

    for (i, _) in name.match_indices('*') {
        let (head, tail) = (&name[..i], &name[i + 1..]);
        let pair = PathPair::new(&join(dir, &format!("{}*", head)), &format!("*{}", tail));
        if !pairs.contains(&pair) {
            pairs.push(pair);
        }
    }
    pairs
}

/// A search document ready to be posted, plus the client-side filter needed
/// when the pattern was a regular expression.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    aql: String,
    filter: Option<Regex>,
}

impl SearchQuery {
    pub fn aql(&self) -> &str {
        &self.aql
    }

    /// Whether an item returned by the server satisfies the original pattern.
    pub fn matches(&self, path: &str, name: &str) -> bool {
        match &self.filter {
            None => true,
            Some(re) if path == "." || path.is_empty() => re.is_match(name),
            Some(re) => re.is_match(&format!("{}/{}", path, name)),
        }
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.aql)
    }
}

pub struct QueryBuilder<'a> {
    recursive: bool,
    use_regexp: bool,
    props: &'a [Property],
}

impl<'a> QueryBuilder<'a> {
    pub fn new(recursive: bool, props: &'a [Property]) -> Self {
        Self {
            recursive,
            use_regexp: false,
            props,
        }
    }

    pub fn from_config(config: &'a TransferConfig) -> Self {
        Self::new(config.recursive, &config.props).regexp(config.use_regexp)
    }

    pub fn regexp(mut self, use_regexp: bool) -> Self {
        self.use_regexp = use_regexp;
        self
    }

    /// Translates `<repository>/<pattern>` into an `items.find(...)` query.
    pub fn build(&self, pattern: &str) -> Result<SearchQuery, QueryError> {
        let (repo, rest) = pattern
            .split_once('/')
            .filter(|(repo, _)| !repo.is_empty())
            .ok_or_else(|| QueryError::MissingRepository(pattern.to_string()))?;

        let (pairs, filter) = if self.use_regexp {
            let scope = if self.recursive { "*" } else { "." };
            let re = Regex::new(&format!("^(?:{})$", rest))?;
            (vec![PathPair::new(scope, "*")], Some(re))
        } else {
            (path_pairs(rest, self.recursive), None)
        };

        let mut criteria = Map::new();
        criteria.insert("repo".to_string(), json!(repo));
        for prop in self.props {
            criteria.insert(format!("@{}", prop.key), json!({ "$match": prop.value }));
        }
        let alternatives = pairs
            .iter()
            .map(|pair| {
                json!({
                    "$and": [{
                        "path": { "$match": pair.path },
                        "name": { "$match": pair.name },
                    }]
                })
            })
            .collect();
        criteria.insert("$or".to_string(), Value::Array(alternatives));

        Ok(SearchQuery {
            aql: format!("items.find({})", Value::Object(criteria)),
            filter,
        })
    }
}
