#![cfg_attr(not(feature = "std"), no_std)]

//! Common element types and helpers shared by every lanecl crate.

extern crate alloc;

mod element;

pub use element::*;

/// Seeded random generation for reproducible data.
pub mod rand;
