use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Filter a log file through a composable predicate tree, with context
/// lines around matches and optional live follow
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log file to filter; reads stdin when omitted
    pub file: Option<PathBuf>,

    /// Case-insensitive substring term (repeatable; terms combine with OR)
    #[arg(short = 's', long = "substring", value_name = "TEXT")]
    pub substrings: Vec<String>,

    /// Regular-expression term (repeatable; terms combine with OR)
    #[arg(short = 'e', long = "regex", value_name = "PATTERN")]
    pub regexes: Vec<String>,

    /// Make regex terms case-sensitive
    #[arg(long)]
    pub case_sensitive: bool,

    /// Number of context lines to show around each match
    #[arg(short = 'C', long, default_value_t = 0)]
    pub context: usize,

    /// Keep the file open and print new matches as they are appended
    #[arg(short, long)]
    pub follow: bool,

    /// Load the filter tree from a saved profile instead of term flags
    #[arg(long, value_name = "FILE", conflicts_with_all = ["substrings", "regexes"])]
    pub profile: Option<PathBuf>,

    /// Write the effective filter tree to a profile file before running
    #[arg(long, value_name = "FILE")]
    pub save_profile: Option<PathBuf>,

    /// Hide original line numbers
    #[arg(long)]
    pub no_line_numbers: bool,

    /// When to colorize output
    #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    /// Tracing filter, e.g. "debug" or "log_sift=trace"
    #[arg(long, env = "LOG_SIFT_LOG", default_value = "warn")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

pub fn cli_parse() -> Cli {
    Cli::parse()
}
