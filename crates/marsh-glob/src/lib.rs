//! marsh-glob: shell pattern matching and pathname expansion.
//!
//! Two pieces, matching the two ways a shell uses patterns:
//!
//! - [`Pattern`] compiles one shell wildcard pattern and answers match
//!   queries: whole-string (for `case` and `[[ == ]]`), anchored prefix
//!   and suffix lengths (for `${v#pat}` / `${v%pat}`), and substring
//!   search (for `${v/pat/rep}`).
//! - [`expand_pathname`] matches a `/`-separated pattern against the
//!   filesystem with the shell's hidden-file, `globstar`, and trailing
//!   slash rules.

pub mod pattern;
pub mod walker;

pub use pattern::{escape, has_meta, Pattern};
pub use walker::{expand_pathname, WalkOptions};
