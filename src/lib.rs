//! `ToggleKeeper` - feature toggle management over a schemaless key-value store
//!
//! Applications register named features; each feature is either a single on/off
//! switch or a set of named switches whose names come from a configured category.
//! This crate maps those features onto flat store keys, keeps toggle values and
//! metadata consistent, records an audit trail and dispatches post-mutation hooks.

// Deny the most critical lints that could lead to bugs or security issues
#![deny(
    // Security and correctness
    unsafe_code,
    unsafe_op_in_unsafe_fn,

    // Code quality - things that are almost always bugs
    unreachable_code,
    unreachable_patterns,
    unused_must_use,

    // Documentation - broken links are bugs
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links,
)]
// Warn on things that should be fixed but aren't necessarily bugs
#![warn(
    // Documentation - missing docs should be added gradually
    missing_docs,

    // Clippy categories for overall code quality
    clippy::all,
    clippy::pedantic,
    clippy::nursery,

    // Performance
    clippy::inefficient_to_string,
    clippy::large_types_passed_by_value,
    clippy::needless_pass_by_value,
    clippy::unnecessary_wraps,

    // Correctness
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::exit,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,

    // Complexity and readability
    clippy::cognitive_complexity,
    clippy::large_enum_variant,
    clippy::match_same_arms,
    clippy::too_many_lines,

    // Style consistency
    clippy::enum_glob_use,
    clippy::inconsistent_struct_constructor,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::redundant_closure_for_method_calls,
    clippy::semicolon_if_nothing_returned,
    clippy::wildcard_imports,

    // Future compatibility
    future_incompatible,
    rust_2018_idioms,
)]
// Allow some pedantic lints that are too noisy or not applicable
#![allow(
    clippy::module_name_repetitions,  // Common pattern in Rust
    clippy::missing_errors_doc,        // Will add gradually
    clippy::missing_panics_doc,        // Will add gradually
)]

// Note: `missing_docs` is set to `warn` instead of `deny` so documentation can be
// added gradually without blocking compilation.

/// Administrative operations with actor resolution
pub mod admin;
/// Configuration management for the store and the category table
pub mod config;
/// Shared handles passed to every core operation
pub mod context;
/// Core business logic - features, applications, audit trail and hooks
pub mod core;
/// SeaORM entity definitions for the SQLite key-value adapter
pub mod entities;
/// Unified error types and result handling
pub mod errors;
/// Domain types shared across the crate
pub mod models;
/// Key-value store contract and adapters
pub mod store;

#[cfg(test)]
pub mod test_utils;
