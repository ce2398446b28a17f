// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod blocks;
pub mod error;
pub mod exec;
pub mod tree;

pub use blocks::{BlockOutputs, BlockRecord};
pub use error::{ErrorCode, ErrorInfo};
pub use exec::{
    is_valid_identifier, parse_outputs, BlockKind, Executable, ExecutableKind, ExecutionStatus,
    LogEntry,
};
pub use tree::{language_for_filename, FileTreeNode, NodeKind, RenderedFile};
