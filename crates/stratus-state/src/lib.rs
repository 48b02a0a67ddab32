//! Stratus State - Persistence of stack outputs and rendered revisions
//!
//! This crate provides:
//! - `StateStore`: async storage trait with file and in-memory backends
//! - Loading the resolved outputs of every upstream stack before evaluation
//! - Importing outputs exported by the provisioning engine
//! - Diffing two rendered revisions of a stack

pub mod diff;
pub mod error;
pub mod outputs;
pub mod store;

pub use diff::{
    ChangeType, DiffContent, DiffEngine, DiffLine, DiffResult, LineType, OutputChange,
    ResourceChange,
};
pub use error::{Result, StateError};
pub use outputs::{outputs_from_value, parse_outputs};
pub use store::{
    FileStore, MemoryStore, OperationCounts, StackRecord, StateStore, load_upstream,
};
