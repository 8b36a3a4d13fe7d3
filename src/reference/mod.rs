pub mod client;

use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::EngineResult;
use crate::models::{ListFieldInfo, ReferenceLists, SchemaTable};
pub use client::{ListPayload, ReferenceApiClient};

fn list_type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"type\.name\s*=\s*(?:'([^']*)'|"([^"]*)")"#).expect("list type pattern is valid")
    })
}

/// List type named by a filter expression such as `type.name='Civility'`.
pub fn parse_list_type(filter_expression: &str) -> Option<String> {
    let captures = list_type_pattern().captures(filter_expression)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str().to_string())
}

/// One entry per schema row whose filter expression names a reference list.
/// `values` are left empty until the lists are fetched.
pub fn resolve_lists(schema: &SchemaTable) -> Vec<ListFieldInfo> {
    schema
        .rows
        .iter()
        .filter_map(|row| {
            parse_list_type(row.filter_expression()).map(|list_type| ListFieldInfo {
                field_path: row.field_path().trim().to_string(),
                list_type,
                values: Vec::new(),
            })
        })
        .collect()
}

pub fn distinct_list_types(fields: &[ListFieldInfo]) -> BTreeSet<String> {
    fields.iter().map(|f| f.list_type.clone()).collect()
}

/// Already-fetched lists, keyed by site and list type. Shared between runs; entries are
/// only ever added, never changed.
#[derive(Debug, Clone, Default)]
pub struct ReferenceListCache {
    entries: Arc<RwLock<HashMap<(String, String), BTreeSet<String>>>>,
}

impl ReferenceListCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits `list_types` into what the cache already holds and what is missing.
    pub async fn lookup(&self, site: &str, list_types: &BTreeSet<String>) -> (ReferenceLists, BTreeSet<String>) {
        let entries = self.entries.read().await;
        let mut found = ReferenceLists::new();
        let mut missing = BTreeSet::new();

        for list_type in list_types {
            match entries.get(&(site.to_string(), list_type.clone())) {
                Some(values) => found.insert(list_type.clone(), values.iter().cloned()),
                None => {
                    missing.insert(list_type.clone());
                }
            }
        }
        (found, missing)
    }

    pub async fn store(&self, site: &str, lists: &ReferenceLists) {
        let mut entries = self.entries.write().await;
        for list_type in lists.list_types() {
            if let Some(values) = lists.get(list_type) {
                entries
                    .entry((site.to_string(), list_type.clone()))
                    .or_insert_with(|| values.clone());
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Fetches reference lists through the REST client, consulting the cache first.
pub struct ReferenceListResolver {
    client: ReferenceApiClient,
    cache: Option<ReferenceListCache>,
    total_timeout: Duration,
}

impl ReferenceListResolver {
    pub fn new(client: ReferenceApiClient, total_timeout: Duration) -> Self {
        Self {
            client,
            cache: None,
            total_timeout,
        }
    }

    pub fn with_cache(mut self, cache: ReferenceListCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn fetch_list_values(
        &self,
        system_secret: &str,
        list_types: &BTreeSet<String>,
    ) -> EngineResult<ReferenceLists> {
        let site = self.client.site_key();

        let (mut lists, missing) = match &self.cache {
            Some(cache) => cache.lookup(&site, list_types).await,
            None => (ReferenceLists::new(), list_types.clone()),
        };

        if missing.is_empty() {
            debug!(list_types = list_types.len(), "all reference lists served from cache");
            return Ok(lists);
        }

        let fetched = self
            .client
            .fetch_list_values(system_secret, &missing, self.total_timeout)
            .await?;

        if let Some(cache) = &self.cache {
            cache.store(&site, &fetched).await;
        }

        for list_type in fetched.list_types() {
            if let Some(values) = fetched.get(list_type) {
                lists.insert(list_type.clone(), values.iter().cloned());
            }
        }

        info!(
            fetched = missing.len(),
            cached = list_types.len() - missing.len(),
            "reference lists resolved"
        );
        Ok(lists)
    }

    /// Parses the schema, fetches the lists it references and fills in each field's values.
    pub async fn resolve(&self, schema: &SchemaTable, system_secret: &str) -> EngineResult<(Vec<ListFieldInfo>, ReferenceLists)> {
        let mut fields = resolve_lists(schema);
        let list_types = distinct_list_types(&fields);
        let lists = self.fetch_list_values(system_secret, &list_types).await?;
        lists.fill(&mut fields);
        Ok((fields, lists))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReferenceApiConfig;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn schema() -> SchemaTable {
        SchemaTable::from_raw(
            row(&["Field", "Key", "Filter", "Type"]),
            vec![
                row(&["person.civility", "Non", "type.name='Civility'", "List"]),
                row(&["person.function", "Non", "type.name = \"Function\"", "List"]),
                row(&["person.name", "Oui", "", "Text"]),
                row(&["person.company", "Non", "status='active'", "Link"]),
                row(&["person.title", "Non", "type.name  =  'Civility' and active=1", "List"]),
            ],
        )
    }

    #[test]
    fn test_parse_list_type_quote_styles() {
        assert_eq!(parse_list_type("type.name='Civility'").as_deref(), Some("Civility"));
        assert_eq!(parse_list_type("type.name=\"Department\"").as_deref(), Some("Department"));
        assert_eq!(parse_list_type("type.name = 'Legal Entity'").as_deref(), Some("Legal Entity"));
        assert_eq!(parse_list_type("status='active'"), None);
        assert_eq!(parse_list_type(""), None);
    }

    #[test]
    fn test_resolve_lists_one_entry_per_matching_row() {
        let fields = resolve_lists(&schema());

        let pairs: Vec<(&str, &str)> = fields
            .iter()
            .map(|f| (f.field_path.as_str(), f.list_type.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("person.civility", "Civility"),
                ("person.function", "Function"),
                ("person.title", "Civility"),
            ]
        );
        assert!(fields.iter().all(|f| f.values.is_empty()));
        assert_eq!(distinct_list_types(&fields).len(), 2);
    }

    #[tokio::test]
    async fn test_cache_lookup_splits_found_and_missing() {
        let cache = ReferenceListCache::new();
        let mut lists = ReferenceLists::new();
        lists.insert("Civility", row(&["M.", "Mme"]));
        cache.store("https://a.example.com", &lists).await;

        let wanted: BTreeSet<String> = ["Civility", "Function"].iter().map(|s| s.to_string()).collect();
        let (found, missing) = cache.lookup("https://a.example.com", &wanted).await;
        assert!(found.contains_type("Civility"));
        assert_eq!(missing.into_iter().collect::<Vec<_>>(), vec!["Function"]);

        let (other_site, missing) = cache.lookup("https://b.example.com", &wanted).await;
        assert!(other_site.is_empty());
        assert_eq!(missing.len(), 2);
    }

    #[tokio::test]
    async fn test_fully_cached_lists_skip_the_network() {
        let client = ReferenceApiClient::new(
            "https://unreachable.invalid/login",
            &ReferenceApiConfig::default(),
            Duration::from_secs(1),
        )
        .unwrap();
        let cache = ReferenceListCache::new();
        let mut lists = ReferenceLists::new();
        lists.insert("Civility", row(&["M.", "Mme"]));
        cache.store(&client.site_key(), &lists).await;

        let resolver = ReferenceListResolver::new(client, Duration::from_secs(1)).with_cache(cache);
        let wanted: BTreeSet<String> = ["Civility".to_string()].into_iter().collect();
        let resolved = resolver.fetch_list_values("unused", &wanted).await.unwrap();

        assert_eq!(resolved.get("Civility").map(|v| v.len()), Some(2));
    }
}
