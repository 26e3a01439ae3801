//! Ad-hoc queries against a program's store.
//!
//! This module provides:
//! - [`Query`] - A body plus projection, ordering and limit
//! - [`QueryExecutor`] - Validates and runs queries against a [`FactStore`]

use std::cmp::Ordering;
use std::collections::BTreeSet;

use eddy_foundation::{Error, Result};
use eddy_store::{Bindings, FactStore};
use tracing::debug;

use crate::pattern::{Body, Order, PatternMatcher};
use crate::rule::RuleCompiler;

// =============================================================================
// Query
// =============================================================================

/// A read-only query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    /// What to match.
    pub body: Body,
    /// Variables to keep (all when empty).
    pub select: Vec<String>,
    /// Sort keys, applied in order.
    pub order_by: Vec<(String, Order)>,
    /// Maximum results to return.
    pub limit: Option<usize>,
}

impl Query {
    /// Creates a query over a body.
    #[must_use]
    pub fn new(body: Body) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    /// Keeps only the named variables.
    #[must_use]
    pub fn select<'a>(mut self, vars: impl IntoIterator<Item = &'a str>) -> Self {
        self.select = vars
            .into_iter()
            .map(|v| v.strip_prefix('?').unwrap_or(v).to_string())
            .collect();
        self
    }

    /// Adds a sort key.
    #[must_use]
    pub fn order_by(mut self, var: &str, order: Order) -> Self {
        self.order_by
            .push((var.strip_prefix('?').unwrap_or(var).to_string(), order));
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl From<Body> for Query {
    fn from(body: Body) -> Self {
        Self::new(body)
    }
}

// =============================================================================
// Query Executor
// =============================================================================

/// Executes queries against a store.
pub struct QueryExecutor;

impl QueryExecutor {
    /// Runs a query.
    ///
    /// Results are deduplicated after projection. Without sort keys they come
    /// back in binding order.
    ///
    /// # Errors
    /// Returns a registration error if the body uses unbound variables or a
    /// selected or sort variable is never bound.
    pub fn execute(query: &Query, store: &FactStore) -> Result<Vec<Bindings>> {
        let bound = RuleCompiler::check_body("query", &query.body, BTreeSet::new())?;
        let named = query
            .select
            .iter()
            .chain(query.order_by.iter().map(|(var, _)| var));
        for var in named {
            if !bound.contains(var) {
                return Err(Error::unbound_variable("query", var.as_str()));
            }
        }

        let mut matcher = PatternMatcher::new(store);
        let rows = matcher.match_body(&query.body);
        let stats = matcher.stats();
        if stats.full_scans > 0 {
            debug!(full_scans = stats.full_scans, "query degraded to a full scan");
        }

        let mut rows: Vec<Bindings> = if query.select.is_empty() {
            rows
        } else {
            let projected: BTreeSet<Bindings> = rows
                .iter()
                .map(|row| row.project(query.select.iter().map(String::as_str)))
                .collect();
            projected.into_iter().collect()
        };

        if !query.order_by.is_empty() {
            rows.sort_by(|a, b| compare(a, b, &query.order_by));
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    /// Returns the first result.
    ///
    /// # Errors
    /// See [`QueryExecutor::execute`].
    pub fn execute_one(query: &Query, store: &FactStore) -> Result<Option<Bindings>> {
        Ok(Self::execute(query, store)?.into_iter().next())
    }

    /// Returns true if the query has at least one result.
    ///
    /// # Errors
    /// See [`QueryExecutor::execute`].
    pub fn exists(query: &Query, store: &FactStore) -> Result<bool> {
        Ok(Self::execute_one(query, store)?.is_some())
    }

    /// Counts the results.
    ///
    /// # Errors
    /// See [`QueryExecutor::execute`].
    pub fn count(query: &Query, store: &FactStore) -> Result<usize> {
        Ok(Self::execute(query, store)?.len())
    }
}

fn compare(a: &Bindings, b: &Bindings, keys: &[(String, Order)]) -> Ordering {
    for (var, order) in keys {
        let ord = a.get(var).cmp(&b.get(var));
        let ord = match order {
            Order::Ascending => ord,
            Order::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.cmp(b)
}
