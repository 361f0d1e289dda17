// Agent kinds and the agent cache
//
// AgentCatalog maps a kind tag ("support") to a factory closure, populated
// once at process start; adding a new agent kind is one registry entry and
// never touches the turn engine. AgentCache reuses constructed agents per
// (kind, scope) with an explicit eviction policy: LRU at a capacity bound
// plus TTL expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::info;

use crate::agent::Agent;
use crate::error::{AgentError, Result};
use crate::traits::{CompletionClient, HistoryStore};

/// Factory building an agent of one kind over the shared backends
pub type AgentFactory =
    Arc<dyn Fn(Arc<dyn HistoryStore>, Arc<dyn CompletionClient>) -> Result<Agent> + Send + Sync>;

/// Lookup table from agent kind to factory.
pub struct AgentCatalog {
    history: Arc<dyn HistoryStore>,
    completion: Arc<dyn CompletionClient>,
    // Registration order preserved for listing
    kinds: Vec<(String, AgentFactory)>,
}

impl AgentCatalog {
    /// Create a catalog over the given backends
    pub fn new(history: Arc<dyn HistoryStore>, completion: Arc<dyn CompletionClient>) -> Self {
        Self {
            history,
            completion,
            kinds: Vec::new(),
        }
    }

    /// Register an agent kind. Later registrations of the same tag are
    /// rejected the same way duplicate tools are.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        factory: impl Fn(Arc<dyn HistoryStore>, Arc<dyn CompletionClient>) -> Result<Agent>
            + Send
            + Sync
            + 'static,
    ) -> Result<()> {
        let kind = kind.into();
        if self.kinds.iter().any(|(k, _)| *k == kind) {
            return Err(AgentError::config(format!(
                "agent kind already registered: {kind}"
            )));
        }
        self.kinds.push((kind, Arc::new(factory)));
        Ok(())
    }

    /// Available kind tags, in registration order
    pub fn kinds(&self) -> Vec<&str> {
        self.kinds.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Check whether a kind is registered
    pub fn supports(&self, kind: &str) -> bool {
        self.kinds.iter().any(|(k, _)| k == kind)
    }

    /// Construct a fresh agent of the given kind
    pub fn create(&self, kind: &str) -> Result<Agent> {
        let factory = self
            .kinds
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, f)| f)
            .ok_or_else(|| AgentError::config(format!("unsupported agent kind: {kind}")))?;
        factory(self.history.clone(), self.completion.clone())
    }
}

impl std::fmt::Debug for AgentCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCatalog")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Cache of constructed agents keyed by `kind:scope`.
///
/// Eviction is explicit: entries expire `ttl` after insertion, and when the
/// map is full the least recently used entry is dropped. Lookups refresh
/// recency but never the TTL, so long-lived scopes still rebuild
/// periodically instead of pinning stale configuration forever.
pub struct AgentCache {
    catalog: AgentCatalog,
    inner: Mutex<HashMap<String, CacheEntry>>,
    max_entries: usize,
    ttl: Duration,
}

struct CacheEntry {
    agent: Arc<Agent>,
    inserted_at: Instant,
    last_accessed: Instant,
}

impl AgentCache {
    /// Default capacity bound
    pub const DEFAULT_MAX_ENTRIES: usize = 256;
    /// Default TTL
    pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

    /// Create a cache with default bounds
    pub fn new(catalog: AgentCatalog) -> Self {
        Self::with_bounds(catalog, Self::DEFAULT_MAX_ENTRIES, Self::DEFAULT_TTL)
    }

    /// Create a cache with explicit bounds
    pub fn with_bounds(catalog: AgentCatalog, max_entries: usize, ttl: Duration) -> Self {
        Self {
            catalog,
            inner: Mutex::new(HashMap::new()),
            max_entries,
            ttl,
        }
    }

    /// The underlying catalog
    pub fn catalog(&self) -> &AgentCatalog {
        &self.catalog
    }

    /// Get the cached agent for `kind` and `scope`, constructing and
    /// inserting one if absent or expired.
    pub fn get_or_create(&self, kind: &str, scope: &str) -> Result<Arc<Agent>> {
        let key = format!("{kind}:{scope}");
        let mut inner = self.inner.lock().expect("agent cache poisoned");

        if let Some(entry) = inner.get_mut(&key) {
            if entry.inserted_at.elapsed() <= self.ttl {
                entry.last_accessed = Instant::now();
                return Ok(entry.agent.clone());
            }
            inner.remove(&key);
        }

        let agent = Arc::new(self.catalog.create(kind)?);

        // Drop expired entries, then the LRU one if still at capacity
        let ttl = self.ttl;
        inner.retain(|_, e| e.inserted_at.elapsed() <= ttl);
        if inner.len() >= self.max_entries {
            if let Some(lru_key) = inner
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone())
            {
                info!(evicted = %lru_key, "Agent cache at capacity, evicting LRU entry");
                inner.remove(&lru_key);
            }
        }

        inner.insert(
            key,
            CacheEntry {
                agent: agent.clone(),
                inserted_at: Instant::now(),
                last_accessed: Instant::now(),
            },
        );
        Ok(agent)
    }

    /// Current number of cached agents
    pub fn len(&self) -> usize {
        self.inner.lock().expect("agent cache poisoned").len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all cached agents
    pub fn clear(&self) {
        self.inner.lock().expect("agent cache poisoned").clear();
    }
}
