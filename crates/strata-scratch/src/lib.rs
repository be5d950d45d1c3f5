//! Thread-scoped scratch arenas.
//!
//! Each thread can own a [`ScratchPool`] of three marked-stack arenas.
//! [`acquire_scratch`] pushes a mark on the first slot the caller is not
//! already holding and returns a [`ScratchArena`] guard; dropping the
//! guard pops the mark, discarding everything allocated through it.
//!
//! Scopes must nest. Pass the ids of scratch arenas still in use as the
//! avoid arguments so a nested scope never lands on a slot whose memory
//! the caller is still reading.
//!
//! ```
//! use strata_scratch::{acquire_scratch, free_thread_scratch, init_thread_scratch, ScratchConfig};
//!
//! init_thread_scratch(&ScratchConfig::new(4096))?;
//! let outer = acquire_scratch(None, None)?.expect("scratch is enabled");
//! assert!(outer.alloc(64)?.is_some());
//! {
//!     let inner = acquire_scratch(Some(outer.id()), None)?.expect("scratch is enabled");
//!     assert_ne!(inner.id(), outer.id());
//!     inner.alloc(128)?;
//! }
//! outer.release()?;
//! free_thread_scratch()?;
//! # Ok::<(), strata_scratch::ScratchError>(())
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod pool;
mod thread;

pub use config::ScratchConfig;
pub use error::ScratchError;
pub use pool::{ScratchId, ScratchPool, SCRATCH_SLOTS_PER_THREAD};
pub use thread::{
    acquire_scratch, free_thread_scratch, init_thread_scratch, init_thread_scratch_from,
    thread_scratch_enabled, thread_scratch_idle, ScratchArena,
};
