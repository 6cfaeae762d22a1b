//! # allocsweep-tree
//!
//! A small node-tree document with a parenthesized text format. Every heap
//! block the document owns is obtained through a process-wide pair of
//! allocation functions that callers may replace with
//! [`set_memory_management_functions`]. An allocation function may report
//! exhaustion either by returning null or by unwinding; both surface as
//! [`TreeError::OutOfMemory`] and leave the document as it was.

pub mod document;
pub mod error;
#[allow(unsafe_code)]
pub mod memory;
mod parse;
#[allow(unsafe_code)]
pub mod string;
#[allow(unsafe_code)]
pub mod vec;

pub use document::{Children, Document, NodeId};
pub use error::{ParseErrorKind, TreeError};
pub use memory::{
    AllocationFunction, DeallocationFunction, get_memory_allocation_function,
    get_memory_deallocation_function, set_memory_management_functions,
};
pub use string::HookString;
pub use vec::HookVec;
