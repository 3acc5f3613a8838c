//! Sort an iTunes Music Library XML playlist by a chosen track attribute.
//!
//! Values resolve through a per-attribute strategy chain: embedded tags
//! first, then a remote metadata service, then local audio analysis,
//! whichever the attribute declares. Tracks without a value sort last in
//! both directions. Only the target playlist's item order and display name
//! are mutated; every other node of the document round-trips untouched.

pub mod attrs;
pub mod audio;
pub mod cli;
pub mod engine;
pub mod error;
pub mod library;
pub mod plist;
pub mod rank;
pub mod resolve;
pub mod spotify;
pub mod tags;
