//! Tracker blocklist index.
//!
//! The blocklist document nests entities under categories:
//! `categories -> [ {entity: {url_kind: domains}} ]`, where `domains` is either a
//! list of domains or a map of `domain -> [subdomains]`. Everything is flattened
//! into one immutable `domain -> entity` map that is shared read-only by the
//! classifier and the aggregator.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// URL kind whose domains are not registered as trackers.
const PERFORMANCE_KIND: &str = "performance";

#[derive(Debug, Clone, Default)]
pub struct BlocklistIndex {
    domain_to_entity: HashMap<String, String>,
}

impl BlocklistIndex {
    /// Build an index from explicit `(domain, entity)` pairs. Later pairs win.
    pub fn from_entries<I, D, E>(entries: I) -> Self
    where
        I: IntoIterator<Item = (D, E)>,
        D: Into<String>,
        E: Into<String>,
    {
        let mut index = Self::default();
        for (domain, entity) in entries {
            let (domain, entity): (String, String) = (domain.into(), entity.into());
            index.register(&domain, &entity);
        }
        index
    }

    /// Parse a blocklist document. Any structural problem fails the whole load.
    pub fn from_json(raw: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(raw)?;

        // The published list wraps categories next to license metadata.
        let categories = match document.get("categories") {
            Some(categories) => categories,
            None => &document,
        };
        let categories = categories
            .as_object()
            .ok_or_else(|| shape("categories must be an object"))?;

        let mut index = Self::default();
        for (category, entries) in categories {
            let entries = entries
                .as_array()
                .ok_or_else(|| shape(format!("category {category:?} is not a list")))?;

            for entry in entries {
                let entry = entry
                    .as_object()
                    .ok_or_else(|| shape(format!("entry in {category:?} is not an object")))?;

                for (entity, kinds) in entry {
                    index.register_entity(category, entity, kinds)?;
                }
            }
        }

        if index.is_empty() {
            return Err(shape("no tracker domains registered"));
        }
        Ok(index)
    }

    /// Read and parse a blocklist document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let start_time = Instant::now();
        info!(action = "start", component = "blocklist_loading", file_path = ?path, "Loading tracker blocklist");

        let content = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let index = Self::from_json(&content)?;

        info!(
            action = "complete",
            component = "blocklist_loading",
            domain_count = index.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "Tracker blocklist loaded"
        );
        Ok(index)
    }

    fn register_entity(&mut self, category: &str, entity: &str, kinds: &Value) -> Result<()> {
        let kinds = kinds
            .as_object()
            .ok_or_else(|| shape(format!("entity {entity:?} in {category:?} is not an object")))?;

        for (kind, domains) in kinds {
            if kind == PERFORMANCE_KIND {
                continue;
            }
            match domains {
                Value::Array(list) => {
                    for domain in list {
                        self.register(expect_domain(entity, domain)?, entity);
                    }
                }
                Value::Object(map) => self.register_nested(entity, map)?,
                // Flags such as `"dnt": "w3c"` sit alongside the URL kinds.
                Value::String(_) | Value::Bool(_) => {
                    debug!(action = "skip", component = "blocklist_loading", entity, kind, "Skipping non-domain flag");
                }
                _ => {
                    return Err(shape(format!(
                        "{entity:?}/{kind:?} must list domains"
                    )))
                }
            }
        }
        Ok(())
    }

    fn register_nested(&mut self, entity: &str, map: &Map<String, Value>) -> Result<()> {
        for (domain, subdomains) in map {
            self.register(domain, entity);
            let subdomains = subdomains
                .as_array()
                .ok_or_else(|| shape(format!("subdomains of {domain:?} must be a list")))?;
            for subdomain in subdomains {
                self.register(expect_domain(entity, subdomain)?, entity);
            }
        }
        Ok(())
    }

    fn register(&mut self, domain: &str, entity: &str) {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        if domain.is_empty() {
            return;
        }
        self.domain_to_entity.insert(domain, entity.to_string());
    }

    /// Owning entity of a registered domain.
    pub fn entity(&self, domain: &str) -> Option<&str> {
        self.domain_to_entity.get(domain).map(String::as_str)
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.domain_to_entity.contains_key(domain)
    }

    pub fn known_domains(&self) -> impl Iterator<Item = &str> {
        self.domain_to_entity.keys().map(String::as_str)
    }

    pub fn domain_to_entity(&self) -> &HashMap<String, String> {
        &self.domain_to_entity
    }

    pub fn len(&self) -> usize {
        self.domain_to_entity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domain_to_entity.is_empty()
    }
}

fn expect_domain<'a>(entity: &str, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| shape(format!("non-string domain under {entity:?}: {value}")))
}

fn shape(reason: impl Into<String>) -> Error {
    Error::BlocklistShape(reason.into())
}
