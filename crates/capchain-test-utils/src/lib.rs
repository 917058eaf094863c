//! Test utilities for capchain integration tests
//!
//! Shared helpers for the capchain workspace. This crate does not depend on
//! `capchain-core`, so core's own tests can use it as a dev-dependency.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! capchain-test-utils = { path = "../capchain-test-utils" }
//! ```
//!
//! # Modules
//!
//! - [`timing`]: timing wrappers and duration assertions
//! - [`fixtures`]: PNG writers and fake screenshot tools on a private `PATH`
//!
//! # Example
//!
//! ```no_run
//! use capchain_test_utils::fixtures::ToolBox;
//!
//! let tools = ToolBox::new();
//! // Writes a 40x30 PNG to its last argument and exits 0
//! tools.png_tool("scrot", 40, 30);
//! // Use tools.search_path() as the runner's PATH
//! ```

pub mod fixtures;
pub mod timing;
