//! Command-line surface over the kinetics engine.
//!
//! Each subcommand builds a scheme from the shared [`SchemeArgs`], runs one
//! analysis and returns an [`ExecutionSummary`] that [`render_summary`]
//! writes as plain text.

mod commands;

pub use commands::{
    BoundArgs, Cli, CliError, Command, ExecutionSummary, LimitArgs, PointArgs, SchemeArgs,
    SolverMethod, SteadyStateArgs, Value, render_summary, run_cli,
};

#[cfg(test)]
mod tests;
