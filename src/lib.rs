//! Turbine - a dynamic template engine
//!
//! Turbine renders text templates with:
//! - `{{...}}` actions with fields, calls, pipelines and arithmetic
//! - Template composition via extends, blocks, yield, import and include
//! - A concurrent template Set with globals, host functions and loaders
//!
//! ```
//! use turbine::{Set, Value};
//! use std::collections::HashMap;
//!
//! let set = Set::new();
//! set.parse_template("hello", "Hello {{.}}!").unwrap();
//! let out = set.render("hello", HashMap::new(), Value::from("world")).unwrap();
//! assert_eq!(out, "Hello world!");
//! ```

// Enforce error handling best practices
#![cfg_attr(
    not(test),
    warn(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::unimplemented,
        clippy::todo,
    )
)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used,))]

pub mod ast;
pub mod builtins;
pub mod engine;
pub mod error;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod scope;
pub mod value;

mod renderer;

// Re-export main types for public API
pub use ast::{Expression, Node, Template};
pub use engine::Set;
pub use error::{Error, Result};
pub use loader::{FileLoader, Loader, MemoryLoader};
pub use parser::parse;
pub use value::{Function, Object, Value};
