//! Equality-conjunction queries over a collection's indexes.
//!
//! A query is `cond ( "+" cond )*` where `cond = fieldLocator ":" value`.
//! `+` is AND; there is no disjunction, negation, inequality, or grouping.
//! The value is everything after the first `:`, matched verbatim against
//! index entries, so neither separator may appear inside a value.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::key::Key;

use super::index::{Index, IndexInfo};
use super::Collection;

const AND_SEPARATOR: char = '+';
const CONDITION_SEPARATOR: char = ':';

/// One planned equality condition of a query.
#[derive(Debug)]
struct QueryCondition {
    field_locator: String,
    value: String,
    query_position: usize,
    index_info: Option<IndexInfo>,
}

impl Collection {
    /// Evaluates an equality-conjunction query and returns the decoded
    /// matching documents, in no particular order. Every condition must be
    /// backed by an index; collection scans are not supported.
    pub fn search(&self, query: &str) -> Result<Vec<Value>> {
        let plan = self.plan(query)?;

        if let Some(condition) = plan.iter().find(|c| c.index_info.is_none()) {
            return Err(Error::UnindexedCondition(format!(
                "field {} in query {query}",
                condition.field_locator
            )));
        }

        // Intersect posting lists, most selective condition first. Each
        // index payload is loaded at most once per query.
        let mut candidates: Option<HashSet<Key>> = None;
        let mut loaded: HashMap<String, Index> = HashMap::new();
        for condition in &plan {
            let index = match loaded.entry(condition.field_locator.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    entry.insert(self.load_index(&condition.field_locator)?)
                }
            };
            let matches = index.lookup(&condition.value);
            candidates = Some(match candidates {
                None => matches.iter().copied().collect(),
                Some(previous) => matches
                    .iter()
                    .filter(|k| previous.contains(k))
                    .copied()
                    .collect(),
            });
            // An empty intersection can never grow again.
            if candidates.as_ref().is_some_and(|c| c.is_empty()) {
                return Ok(Vec::new());
            }
        }

        let keys = candidates.unwrap_or_default();
        let mut results = Vec::with_capacity(keys.len());
        for doc_key in keys {
            results.push(self.get_struct::<Value>(doc_key)?);
        }
        Ok(results)
    }

    /// Parses the query into conditions and orders them for execution:
    /// indexed conditions before unindexed ones, then by ascending distinct
    /// value count, with the original query position as the tiebreak.
    fn plan(&self, query: &str) -> Result<Vec<QueryCondition>> {
        if query.trim().is_empty() {
            return Err(Error::Syntax("empty query".to_string()));
        }

        let mut conditions = Vec::new();
        let mut info_cache: HashMap<String, Option<IndexInfo>> = HashMap::new();
        for (position, part) in query.split(AND_SEPARATOR).enumerate() {
            let Some((field_locator, value)) = part.split_once(CONDITION_SEPARATOR) else {
                return Err(Error::Syntax(format!("invalid query around `{part}`")));
            };
            if field_locator.is_empty() {
                return Err(Error::Syntax(format!("invalid query around `{part}`")));
            }

            let index_info = match info_cache.get(field_locator) {
                Some(cached) => cached.clone(),
                None => {
                    let info = self.index_info(field_locator)?;
                    info_cache.insert(field_locator.to_string(), info.clone());
                    info
                }
            };

            conditions.push(QueryCondition {
                field_locator: field_locator.to_string(),
                value: value.to_string(),
                query_position: position,
                index_info,
            });
        }

        conditions.sort_by(|a, b| match (&a.index_info, &b.index_info) {
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a_info), Some(b_info)) => a_info
                .num_values
                .cmp(&b_info.num_values)
                .then(a.query_position.cmp(&b.query_position)),
            (None, None) => a.query_position.cmp(&b.query_position),
        });
        Ok(conditions)
    }
}
