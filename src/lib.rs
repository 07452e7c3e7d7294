#![warn(clippy::pedantic)]
// Noisy doc/signature lints
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// format!("{}", x) is kept over format!("{x}")
#![allow(clippy::uninlined_format_args)]
// Token counts and millisecond timestamps cross integer widths in the wire formats
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod bus;
pub mod channels;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dedup;
pub mod errors;
pub mod gateway;
pub mod relay;
pub mod render;
pub mod session;
pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
