//! Patch data model for the smix software mixer.
//!
//! Patches are owned by the loaded module and only borrowed by the
//! mixing engine, which never mutates them.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod patch;

pub use patch::{LoopMode, Patch, PatchBank, PatchData, PatchKey, DEFAULT_BASE_NOTE};
