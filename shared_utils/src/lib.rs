//! Helpers shared by the `options_flow` and `short_volume` binaries.

pub mod env;
pub mod logging;
