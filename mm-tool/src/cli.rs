//! Root CLI structure for mmtool

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mmtool")]
#[command(about = "Inspect, search and run motion matching databases", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show counts, ranges and feature statistics of a database
    Info(crate::commands::info::InfoArgs),

    /// Run one search against a database frame
    Search(crate::commands::search::SearchArgs),

    /// Drive a character with fixed input and report its motion
    Simulate(crate::commands::simulate::SimulateArgs),

    /// Write a synthetic locomotion asset directory
    Synth(crate::commands::synth::SynthArgs),
}
