//! Route rows, matching, and the caching plan provider.

use crate::config::FailureMode;
use crate::message::context::Side;
use crate::plan::builder::PlanBuilder;
use crate::plan::TransformationPlan;
use crate::telemetry::event_id;
use crate::transform::TransformCatalog;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("route store failure: {0}")]
    Store(String),
}

/// One persisted route row: method (or `*`), literal path prefix, catalog
/// key, side, order, optional params JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub method: String,
    pub path: String,
    pub transformer: String,
    pub side: Side,
    pub order: i32,
    #[serde(default)]
    pub params: Option<String>,
}

impl RouteEntry {
    pub fn is_wildcard_method(&self) -> bool {
        self.method == "*"
    }

    pub fn matches_method(&self, method: &str) -> bool {
        self.is_wildcard_method() || self.method.eq_ignore_ascii_case(method)
    }

    pub fn matches_path(&self, path: &str) -> bool {
        path.starts_with(&self.path)
    }
}

/// Per-route execution policy. `timeout == ZERO` and `failure_mode == None`
/// both mean "fall back to the global default".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutePolicy {
    pub timeout: Duration,
    pub failure_mode: Option<FailureMode>,
    pub allow_parallel: bool,
}

/// Rewrites id-like path segments to `{id}`: any segment parseable as an
/// i64 or a UUID.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !segment.is_empty()
                && (segment.parse::<i64>().is_ok() || Uuid::parse_str(segment).is_ok())
            {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Cache key: `"<METHOD>:<normalized-path>"`.
pub fn plan_cache_key(method: &str, path: &str) -> String {
    format!("{}:{}", method.to_ascii_uppercase(), normalize_path(path))
}

/// Longest-prefix-wins row selection with exact method preferred over the
/// `*` wildcard. Returns every row belonging to the winning route.
pub fn select_rows<'a>(rows: &'a [RouteEntry], method: &str, path: &str) -> Vec<&'a RouteEntry> {
    let exact: Vec<&RouteEntry> = rows
        .iter()
        .filter(|row| !row.is_wildcard_method() && row.matches_method(method))
        .filter(|row| row.matches_path(path))
        .collect();

    let pool: Vec<&RouteEntry> = if exact.is_empty() {
        rows.iter()
            .filter(|row| row.is_wildcard_method() && row.matches_path(path))
            .collect()
    } else {
        exact
    };

    let Some(best_len) = pool.iter().map(|row| row.path.len()).max() else {
        return Vec::new();
    };

    pool.into_iter()
        .filter(|row| row.path.len() == best_len)
        .collect()
}

/// Maps an incoming message to a ready-to-run plan.
#[async_trait]
pub trait PlanProvider: Send + Sync {
    async fn resolve(&self, method: &str, path: &str) -> Arc<TransformationPlan>;
}

/// Persistence back end supplying route rows and per-route policies.
#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn load_routes(&self) -> Result<Vec<RouteEntry>, PlanError>;

    async fn load_policy(&self, method: &str, path: &str) -> Result<RoutePolicy, PlanError> {
        let _ = (method, path);
        Ok(RoutePolicy::default())
    }
}

/// In-memory route store for embedding hosts and tests; the declarative
/// analogue of a configuration-file route table.
#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
    policies: Vec<(String, RoutePolicy)>,
}

impl RouteTable {
    pub fn from_entries(entries: Vec<RouteEntry>) -> Self {
        Self {
            entries,
            policies: Vec::new(),
        }
    }

    /// Attaches a policy to a path prefix; the longest matching prefix wins
    /// at lookup time.
    pub fn with_policy(mut self, path_prefix: impl Into<String>, policy: RoutePolicy) -> Self {
        self.policies.push((path_prefix.into(), policy));
        self
    }
}

#[async_trait]
impl RouteStore for RouteTable {
    async fn load_routes(&self) -> Result<Vec<RouteEntry>, PlanError> {
        Ok(self.entries.clone())
    }

    async fn load_policy(&self, _method: &str, path: &str) -> Result<RoutePolicy, PlanError> {
        let policy = self
            .policies
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, policy)| policy.clone())
            .unwrap_or_default();
        Ok(policy)
    }
}

struct CachedPlan {
    plan: Arc<TransformationPlan>,
    expires_at: Instant,
}

/// Plan provider with a process-wide concurrent cache keyed on
/// `"<METHOD>:<normalized-path>"`. Provider failure degrades to the empty
/// plan so the host forwards untransformed.
pub struct CachingPlanProvider {
    store: Arc<dyn RouteStore>,
    builder: PlanBuilder,
    cache: DashMap<String, CachedPlan>,
    ttl: Duration,
}

impl CachingPlanProvider {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    pub fn new(store: Arc<dyn RouteStore>, catalog: Arc<TransformCatalog>, ttl: Duration) -> Self {
        Self {
            store,
            builder: PlanBuilder::new(catalog),
            cache: DashMap::new(),
            ttl,
        }
    }

    pub fn with_default_ttl(store: Arc<dyn RouteStore>, catalog: Arc<TransformCatalog>) -> Self {
        Self::new(store, catalog, Self::DEFAULT_TTL)
    }

    pub fn invalidate(&self, method: &str, path: &str) {
        self.cache.remove(&plan_cache_key(method, path));
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn cached_plan_count(&self) -> usize {
        self.cache.len()
    }

    async fn build_plan(
        &self,
        method: &str,
        path: &str,
    ) -> Result<Arc<TransformationPlan>, PlanError> {
        let rows = self.store.load_routes().await?;
        let selected: Vec<RouteEntry> = select_rows(&rows, method, path)
            .into_iter()
            .cloned()
            .collect();

        if selected.is_empty() {
            return Ok(Arc::new(TransformationPlan::empty()));
        }

        let policy = self.store.load_policy(method, path).await?;
        Ok(Arc::new(self.builder.build(&selected, &policy)))
    }
}

#[async_trait]
impl PlanProvider for CachingPlanProvider {
    async fn resolve(&self, method: &str, path: &str) -> Arc<TransformationPlan> {
        let key = plan_cache_key(method, path);

        if let Some(cached) = self.cache.get(&key) {
            if cached.expires_at > Instant::now() {
                return cached.plan.clone();
            }
        }

        match self.build_plan(method, path).await {
            Ok(plan) => {
                self.cache.insert(
                    key,
                    CachedPlan {
                        plan: plan.clone(),
                        expires_at: Instant::now() + self.ttl,
                    },
                );
                plan
            }
            Err(err) => {
                tracing::error!(
                    target: "reqrep::plan",
                    event = "plan_resolve_failed",
                    event_id = event_id::PLAN_RESOLVE_FAILED,
                    method = %method,
                    path = %path,
                    error = %err,
                );
                Arc::new(TransformationPlan::empty())
            }
        }
    }
}
