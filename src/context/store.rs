use crate::config::RuntimeConfig;
use dashmap::DashMap;
use may::coroutine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Errors raised by the context store.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The key is not set on the unit nor on any of its ancestors
    #[error("context key `{key}` not found in unit or any ancestor")]
    KeyNotFound { key: String },

    /// The unit id was never allocated or has already been released
    #[error("execution unit {id} does not exist")]
    UnknownUnit { id: UnitId },

    #[error("context key `{key}` could not be encoded")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("context key `{key}` holds a value of another shape")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Identifier of an execution unit. Assigned monotonically, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(u64);

impl UnitId {
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct Node {
    parent: Option<UnitId>,
    values: HashMap<String, Value>,
}

/// Arena of execution units and their local values.
///
/// Each node records its parent id; lookups walk parent links towards the root. Units
/// live on coroutines spread over several OS threads, so the arena is a sharded map.
#[derive(Debug)]
pub struct ContextStore {
    nodes: DashMap<UnitId, Node>,
    next_id: AtomicU64,
    root: UnitId,
    stack_size: usize,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStore {
    /// A store holding only the process root unit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_runtime(RuntimeConfig::from_env())
    }

    #[must_use]
    pub fn with_runtime(runtime: RuntimeConfig) -> Self {
        let root = UnitId(0);
        let nodes = DashMap::new();
        nodes.insert(
            root,
            Node {
                parent: None,
                values: HashMap::new(),
            },
        );
        Self {
            nodes,
            next_id: AtomicU64::new(1),
            root,
            stack_size: runtime.stack_size,
        }
    }

    #[must_use]
    pub fn root_id(&self) -> UnitId {
        self.root
    }

    /// Handle to the process root. Dropping it never releases the root.
    #[must_use]
    pub fn root(self: &Arc<Self>) -> Unit {
        Unit {
            inner: Arc::new(UnitInner {
                store: Arc::clone(self),
                id: self.root,
                owned: false,
                _parent: None,
            }),
        }
    }

    /// Allocate a unit. Without a parent the unit hangs off the process root.
    pub fn new_unit(&self, parent: Option<UnitId>) -> UnitId {
        let id = UnitId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let parent = parent.unwrap_or(self.root);
        self.nodes.insert(
            id,
            Node {
                parent: Some(parent),
                values: HashMap::new(),
            },
        );
        debug!(unit = %id, parent = %parent, "Execution unit created");
        id
    }

    /// Write into `unit`'s local store only.
    pub fn set(&self, unit: UnitId, key: &str, value: Value) -> Result<(), ContextError> {
        let mut node = self
            .nodes
            .get_mut(&unit)
            .ok_or(ContextError::UnknownUnit { id: unit })?;
        node.values.insert(key.to_string(), value);
        Ok(())
    }

    /// Look `key` up in `unit`, then in each ancestor up to the root.
    ///
    /// A released ancestor ends the walk.
    pub fn get(&self, unit: UnitId, key: &str) -> Result<Value, ContextError> {
        if !self.nodes.contains_key(&unit) {
            return Err(ContextError::UnknownUnit { id: unit });
        }
        let mut current = Some(unit);
        while let Some(id) = current {
            // The shard guard is dropped before moving to the parent.
            current = {
                let Some(node) = self.nodes.get(&id) else {
                    break;
                };
                if let Some(value) = node.values.get(key) {
                    return Ok(value.clone());
                }
                node.parent
            };
        }
        Err(ContextError::KeyNotFound {
            key: key.to_string(),
        })
    }

    /// Like [`ContextStore::get`], with a fallback instead of an error for missing keys.
    pub fn get_or(&self, unit: UnitId, key: &str, default: Value) -> Value {
        self.get(unit, key).unwrap_or(default)
    }

    #[must_use]
    pub fn parent_of(&self, unit: UnitId) -> Option<UnitId> {
        self.nodes.get(&unit).and_then(|n| n.parent)
    }

    #[must_use]
    pub fn contains(&self, unit: UnitId) -> bool {
        self.nodes.contains_key(&unit)
    }

    /// Number of live units, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop a unit's local store. The root cannot be released.
    pub fn release(&self, unit: UnitId) -> bool {
        if unit == self.root {
            return false;
        }
        let removed = self.nodes.remove(&unit).is_some();
        if removed {
            debug!(unit = %unit, "Execution unit released");
        }
        removed
    }
}

struct UnitInner {
    store: Arc<ContextStore>,
    id: UnitId,
    owned: bool,
    /// Keeps ancestors alive for as long as this unit is
    _parent: Option<Unit>,
}

impl Drop for UnitInner {
    fn drop(&mut self) {
        if self.owned {
            self.store.release(self.id);
        }
    }
}

/// Reference-counted handle to one execution unit.
///
/// The unit's local store is released when the last handle goes away. A child holds a
/// handle to its parent, so a sub-task that outlives its request still sees the
/// request's values.
#[derive(Clone)]
pub struct Unit {
    inner: Arc<UnitInner>,
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("id", &self.inner.id)
            .field("parent", &self.inner._parent.as_ref().map(Unit::id))
            .finish()
    }
}

impl Unit {
    #[must_use]
    pub fn id(&self) -> UnitId {
        self.inner.id
    }

    #[must_use]
    pub fn store(&self) -> &Arc<ContextStore> {
        &self.inner.store
    }

    #[must_use]
    pub fn parent(&self) -> Option<&Unit> {
        self.inner._parent.as_ref()
    }

    /// Create a child unit whose lookups fall back to this one.
    #[must_use]
    pub fn child(&self) -> Unit {
        let store = Arc::clone(&self.inner.store);
        let id = store.new_unit(Some(self.inner.id));
        Unit {
            inner: Arc::new(UnitInner {
                store,
                id,
                owned: true,
                _parent: Some(self.clone()),
            }),
        }
    }

    pub fn set(&self, key: &str, value: Value) {
        // The handle keeps the node alive, so the unit always exists here.
        if let Err(e) = self.inner.store.set(self.inner.id, key, value) {
            error!(unit = %self.inner.id, key = %key, error = %e, "Context write lost");
        }
    }

    pub fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), ContextError> {
        let value = serde_json::to_value(value).map_err(|source| ContextError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.set(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Value, ContextError> {
        self.inner.store.get(self.inner.id, key)
    }

    #[must_use]
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.inner.store.get_or(self.inner.id, key, default)
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, ContextError> {
        let value = self.get(key)?;
        serde_json::from_value(value).map_err(|source| ContextError::Decode {
            key: key.to_string(),
            source,
        })
    }

    /// Run `f` on a new coroutine with a fresh child of this unit.
    pub fn spawn<F, T>(&self, f: F) -> std::io::Result<coroutine::JoinHandle<T>>
    where
        F: FnOnce(Unit) -> T + Send + 'static,
        T: Send + 'static,
    {
        let child = self.child();
        let stack_size = self.inner.store.stack_size;
        debug!(
            parent = %self.inner.id,
            unit = %child.id(),
            stack_size = stack_size,
            "Spawning sub-task"
        );
        // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may runtime.
        // The closure is Send + 'static and owns its unit handle, so nothing it touches
        // can dangle; thread-local state is not relied upon inside it.
        unsafe {
            coroutine::Builder::new()
                .stack_size(stack_size)
                .spawn(move || f(child))
        }
    }
}
