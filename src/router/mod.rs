//! # Router Module
//!
//! The router module holds the ordered route table and the pattern matcher that turns
//! path templates into anchored regular expressions.
//!
//! ## Overview
//!
//! The router is responsible for:
//! - Compiling path templates (`/quiz/{page}`), catch-all templates and raw patterns
//! - Matching incoming requests against routes in registration order
//! - Extracting named captures for the parameter binder
//!
//! ## Architecture
//!
//! The router uses a two-phase approach:
//!
//! 1. **Compilation**: At startup, each template is converted into a regex pattern with
//!    one named group per placeholder. Raw patterns are wrapped so they only ever match
//!    a whole path.
//!
//! 2. **Matching**: For each request the router tests routes in the order they were
//!    registered and returns the first one whose method set and pattern both match.
//!    First match wins; there is no specificity ranking and no backtracking between
//!    routes, so `/a/{x}` and `/a/{x}/{y}` are simply two independent routes.
//!
//! ## Example
//!
//! ```rust
//! use zealrouter::router::{RoutePattern, RouteOptions, RouteTarget, Router};
//! use http::Method;
//!
//! let mut router = Router::new();
//! router
//!     .register(
//!         RoutePattern::template("/user/{id}/post/{postId}").unwrap(),
//!         RouteOptions::new(),
//!         RouteTarget::Isolated("report".into()),
//!     )
//!     .unwrap();
//!
//! let m = router.route(&Method::GET, "/user/42/post/7").unwrap();
//! assert_eq!(m.get_path_param("id"), Some("42"));
//! assert_eq!(m.get_path_param("postId"), Some("7"));
//! assert!(router.route(&Method::GET, "/user/42/post").is_none());
//! ```
//!
//! ## Performance
//!
//! Matching is O(n) in the number of routes, which is what first-match-wins demands.
//! Captures are stored in a `SmallVec` so typical routes do not allocate for them.

mod core;
mod error;
mod pattern;

pub use core::{
    MethodSet, ParamVec, Route, RouteMatch, RouteOptions, RouteTarget, Router, MAX_INLINE_PARAMS,
};
pub use error::RegistrationError;
pub use pattern::{namespaced, PatternKind, RoutePattern};
