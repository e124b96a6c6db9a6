//! kdbg-debuginfo — read-only debug information lookups.
//!
//! The compiled kernel ships a debug-info artifact mapping addresses to
//! labels, methods and source positions. This crate defines the lookup
//! contract ([`DebugInfoStore`]), an in-memory implementation loaded from
//! the artifact ([`DebugInfoTable`]), and the memoizing [`DebugInfoCache`]
//! the engine queries on every break.

pub mod asm_listing;
pub mod cache;
pub mod error;
pub mod store;
pub mod table;
pub mod types;

pub use asm_listing::AsmListing;
pub use cache::{DebugInfoCache, LookupKey};
pub use error::DebugInfoError;
pub use store::DebugInfoStore;
pub use table::{DebugInfoData, DebugInfoTable};
pub use types::*;
