//! Command-line entry points for the calnotes application.

mod app;
mod main;

pub use app::*;
pub use main::*;
