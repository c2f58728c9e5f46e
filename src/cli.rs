//! CLI domain: parse, route, output, and presentation only.
//! No engine logic here; the route table dispatches to the engine and plan loader.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{format_partition_text, format_results_json, format_results_text};
pub use route::{CommandOutput, RunContext};
