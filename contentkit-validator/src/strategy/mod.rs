//! Validation source strategies.
//!
//! Only the filesystem strategy exists; `validate_fs()` is the public entry
//! point built on it.

pub mod fs;
