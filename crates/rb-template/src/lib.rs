// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod eval;
pub mod lexer;
pub mod parser;
pub mod render;
pub mod value;

pub use parser::{Expr, Node};
pub use render::{load_directory_schema, render_directory, render_inline, render_text, SCHEMA_MARKER};
pub use value::Value;
