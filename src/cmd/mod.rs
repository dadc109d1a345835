//! Command-line arguments for the `mr-*` binaries.

pub mod master;
pub mod sequential;
pub mod worker;
