//! Core types and traits for the Strata arena framework.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by every other crate in the workspace:
//! allocation handles, alignment requirements, strategy tags and the
//! [`RawAllocator`] trait that external allocators plug into.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod alloc;
pub mod heap;
pub mod raw;
pub mod strategy;

pub use alloc::{Alignment, Allocation, MAX_ALIGNMENT};
pub use heap::SystemHeap;
pub use raw::RawAllocator;
pub use strategy::{Operation, Strategy};
