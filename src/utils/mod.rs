//! Utility Module
//!
//! - [`interner`]: String interning for shader define names and values
//! - [`warn_once`]: Deduplicated warning log
//!
//! # String Interning
//!
//! Interned strings (Symbols) compare and hash in O(1), which keeps define
//! sets cheap to use inside program cache keys.
//!
//! ```rust,ignore
//! use kiln::utils::interner;
//!
//! let a = interner::intern("USE_FOG");
//! let b = interner::intern("USE_FOG");
//! assert_eq!(a, b);
//! ```

pub mod interner;
pub mod warn_once;

pub use interner::Symbol;
pub use warn_once::warn_once;
