#![allow(clippy::too_many_arguments, clippy::needless_range_loop, clippy::float_cmp,
         clippy::collapsible_if, clippy::manual_range_contains)]

pub mod q_shared;
pub mod qfiles;
pub mod md4;
pub mod error;
pub mod config;
pub mod trace;
pub mod pmove;
