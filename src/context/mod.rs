//! # Context Module
//!
//! Per-request state without process-wide globals.
//!
//! Every inbound request gets its own execution unit, a child of the process root.
//! Sub-tasks spawned from a request get a child of the request's unit. Reading a key
//! walks from the unit up to the root, so a sub-task sees what its request set while
//! two concurrent requests never see each other's values.
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use zealrouter::context::ContextStore;
//!
//! let store = Arc::new(ContextStore::new());
//! let root = store.root();
//! root.set("site", json!("zeal"));
//!
//! let request = root.child();
//! request.set("user", json!("ada"));
//! let task = request.child();
//!
//! assert_eq!(task.get("user").unwrap(), json!("ada"));
//! assert_eq!(task.get("site").unwrap(), json!("zeal"));
//! assert!(root.child().get("user").is_err());
//! ```

mod request;
mod store;
#[cfg(test)]
mod tests;

pub use request::{
    populate, RequestContext, KEY_COOKIE, KEY_GET, KEY_POST, KEY_REQUEST, KEY_SERVER, KEY_SESSION,
};
pub use store::{ContextError, ContextStore, Unit, UnitId};
