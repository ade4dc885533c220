//! squall-router: Zero-dependency routing primitives
//!
//! Single Source of Truth (SSOT) for the parts of routing that need no I/O,
//! used by squall-core's static and dynamic responder storage.
//!
//! ## Features
//! - Perfect-hash tables over request start lines (O(1) static lookup)
//! - Greedy byte-position selection for short route keys
//! - Route path components: literals, `:params`, trailing `*` catch-alls
//! - Component-wise matching and positional parameter capture
//! - Zero external dependencies
//!
//! ## Example
//! ```
//! use squall_router::{KeyWidth, PerfectHashTable};
//!
//! let routes = ["GET / HTTP/1.1", "GET /hello HTTP/1.1", "POST /users HTTP/1.1"];
//! let table = PerfectHashTable::build(
//!     routes.iter().map(|r| (*r, r.as_bytes())),
//!     KeyWidth::B8,
//!     false,
//! )
//! .unwrap()
//! .expect("three routes always fit");
//!
//! assert_eq!(table.lookup_bytes(b"GET /hello HTTP/1.1"), Some(1));
//! assert!(table.table_size() >= routes.len());
//! ```

pub mod key;
pub mod path;
pub mod perfect_hash;

pub use key::{select_positions, KeyWidth, RouteKey, MAX_KEY_OFFSET};
pub use path::{
    capture_parameters, has_catch_all, has_parameters, matches_catchall, matches_exact,
    parse_path, render_path, split_path, PathComponent, PathError,
};
pub use perfect_hash::{
    GenerateError, HashCandidate, PerfectHashGenerator, PerfectHashTable, EMPTY_SLOT,
    MAX_ENTRIES, MAX_TABLE_BITS, MULTIPLIERS, SHIFT_WINDOW,
};
