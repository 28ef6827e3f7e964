//! # Binder Module
//!
//! Reflection-free parameter binding for route handlers.
//!
//! ## Overview
//!
//! A handler declares, at registration time, the ordered list of parameters it wants
//! ([`ParamDecl`]). The router resolves those declarations once against the route's
//! placeholder names and produces a [`BindingPlan`]. On every request the plan turns
//! the matched captures plus the framework-provided objects into an ordered [`Args`]
//! list that is handed to the handler.
//!
//! ## Precedence
//!
//! For each declared parameter, in declaration order:
//!
//! 1. a value captured by the route pattern under that name
//! 2. a reserved framework object (`app`/`self`, `request`, `response`, `context`)
//! 3. the declared default value
//! 4. [`Arg::Absent`]
//!
//! A route placeholder literally named `request` therefore shadows the reserved request
//! object. Missing parameters are never an error: the handler receives `Arg::Absent`
//! and decides what that means.
//!
//! ## Example
//!
//! ```rust,ignore
//! use zealrouter::binder::{Args, ParamDecl};
//!
//! let decls = vec![ParamDecl::new("page"), ParamDecl::with_default("tab", "main".into())];
//! // ... registered with a route, later on each request:
//! fn handler(args: Args) {
//!     let page = args.text("page").unwrap_or_default();
//!     let tab = args.text("tab").unwrap_or("main");
//! }
//! ```

mod core;

pub use core::{bind, Arg, Args, BindingPlan, ParamDecl, Reserved, ReservedObjects};
