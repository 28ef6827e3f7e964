//! # CLI Module
//!
//! Command line for the bundled demo application.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! ```bash
//! zealrouter serve --addr 127.0.0.1:9501 --config zeal.yaml
//! ```
//!
//! ### `routes`
//!
//! Print the route table in the order routes are matched:
//!
//! ```bash
//! zealrouter routes
//! ```
//!
//! The same binary doubles as the isolated worker; `main` checks for that before
//! parsing any arguments.

mod commands;


pub use commands::{run_cli, Cli, Commands};
