pub mod cli;
pub mod commands;
pub mod engine;
pub mod filter;
pub mod persist;
pub mod session;
pub mod source;
pub mod store;
pub mod stream;

use anyhow::Context;
use colored::{Color, Colorize};
use indicatif::ProgressBar;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::filter::EnvFilter;

pub use cli::{Cli, ColorMode, cli_parse};
pub use commands::{
    AddChild, CommandExecutor, FilterCommand, RemoveChild, SetHighlightColor, SetValue,
    ToggleEnabled,
};
pub use engine::{FilterPass, FilteredLogLine, run_filter};
pub use filter::{
    DEFAULT_HIGHLIGHT_COLOR, FilterError, FilterKind, FilterNode, FilterTree, NodePath,
};
pub use persist::{PersistError, load_tree, save_tree};
pub use session::FilterSession;
pub use source::{FileTail, LineFeed, read_initial};
pub use store::{LineStore, StoredLine};
pub use stream::{FilterStream, FilterUpdate, StreamError, StreamEvent, StreamHandle};

/// Highlight color keys assigned round-robin to CLI filter terms.
const TERM_COLOR_KEYS: [&str; 6] = ["Red", "Green", "Yellow", "Blue", "Magenta", "Cyan"];

/// Poll interval for `--follow`.
const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(250);

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Builds the filter root from a saved profile or from term flags.
/// Multiple terms combine with OR, each assigned its own highlight color.
fn build_filter_root(cli: &Cli) -> anyhow::Result<Option<FilterNode>> {
    if let Some(path) = &cli.profile {
        let root = persist::load_tree(path)
            .with_context(|| format!("failed to load profile '{}'", path.display()))?;
        return Ok(Some(root));
    }

    let mut terms: Vec<FilterNode> = Vec::new();
    for text in &cli.substrings {
        terms.push(FilterNode::substring(text.as_str()));
    }
    for pattern in &cli.regexes {
        terms.push(FilterNode::regex(pattern.as_str(), cli.case_sensitive));
    }
    for (i, term) in terms.iter_mut().enumerate() {
        term.highlight_color = TERM_COLOR_KEYS[i % TERM_COLOR_KEYS.len()].to_string();
    }

    Ok(match terms.len() {
        0 => None,
        1 => terms.pop(),
        _ => Some(FilterNode::or(terms)),
    })
}

/// Enabled leaf terms of the tree, used to pick per-line highlight colors.
fn collect_highlight_leaves(root: &FilterNode) -> Vec<FilterNode> {
    fn walk(node: &FilterNode, out: &mut Vec<FilterNode>) {
        if !node.enabled {
            return;
        }
        if node.children().is_empty() {
            if node.value().is_some() {
                out.push(node.clone());
            }
        } else {
            for child in node.children() {
                walk(child, out);
            }
        }
    }
    let mut leaves = Vec::new();
    walk(root, &mut leaves);
    leaves
}

fn highlight_color(key: &str) -> Option<Color> {
    match key.to_ascii_lowercase().as_str() {
        "red" => Some(Color::Red),
        "green" => Some(Color::Green),
        "yellow" => Some(Color::Yellow),
        "blue" => Some(Color::Blue),
        "magenta" => Some(Color::Magenta),
        "cyan" => Some(Color::Cyan),
        "white" => Some(Color::White),
        _ => None,
    }
}

fn colorize(line: &FilteredLogLine, leaves: &[FilterNode]) -> String {
    if line.is_context {
        return line.text.dimmed().to_string();
    }
    for leaf in leaves {
        if leaf.highlight_color != DEFAULT_HIGHLIGHT_COLOR
            && leaf.is_match(&line.text)
            && let Some(color) = highlight_color(&leaf.highlight_color)
        {
            return line.text.color(color).to_string();
        }
    }
    line.text.to_string()
}

fn format_line(line: &FilteredLogLine, leaves: &[FilterNode], show_numbers: bool) -> String {
    let text = colorize(line, leaves);
    if show_numbers {
        // grep convention: ':' for matches, '-' for context lines.
        let separator = if line.is_context { '-' } else { ':' };
        format!("{:>6}{separator} {text}", line.number)
    } else {
        text
    }
}

/// Reads the file into the session. In follow mode the trailing partial
/// line (no newline yet) is held back so the tail reader picks it up
/// once the writer completes it; the returned byte offset is where the
/// tail should resume.
fn load_file(path: &Path, feed: &LineFeed, follow: bool) -> anyhow::Result<u64> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("loading {}", path.display()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read log file '{}'", path.display()))?;
    let cut = if follow {
        content.rfind('\n').map_or(0, |i| i + 1)
    } else {
        content.len()
    };

    let mut count = 0u64;
    for line in content[..cut].lines() {
        feed.append_line(line);
        count += 1;
        if count % 50_000 == 0 {
            spinner.set_message(format!("loaded {count} lines"));
        }
    }
    spinner.finish_and_clear();
    Ok(cut as u64)
}

pub fn run() -> anyhow::Result<()> {
    let cli = cli_parse();
    init_tracing(&cli.log_level);

    // Set up color handling based on user preference
    match cli.color {
        ColorMode::Always => {
            // Force colors on
            unsafe {
                std::env::set_var("CLICOLOR_FORCE", "1");
            }
        }
        ColorMode::Never => {
            // Disable colors
            unsafe {
                std::env::set_var("NO_COLOR", "1");
            }
        }
        ColorMode::Auto => {
            // Default behavior - let the terminal decide
        }
    }

    let root = build_filter_root(&cli)?;
    if let Some(path) = &cli.save_profile {
        match &root {
            Some(root) => persist::save_tree(root, path)
                .with_context(|| format!("failed to save profile '{}'", path.display()))?,
            None => eprintln!(
                "warning: no filter terms given, nothing saved to '{}'",
                path.display()
            ),
        }
    }

    let mut session = FilterSession::new();
    let events = session.subscribe();
    let feed = session.feed();

    let tail_offset = match &cli.file {
        Some(path) => Some(load_file(path, &feed, cli.follow)?),
        None => {
            if cli.follow {
                anyhow::bail!("--follow requires a file path");
            }
            let stdin = std::io::stdin();
            read_initial(stdin.lock(), &feed, |_| {}).context("failed to read stdin")?;
            None
        }
    };

    session.set_filter(root.clone(), cli.context);
    let leaves = root.as_ref().map(collect_highlight_leaves).unwrap_or_default();

    let _tail = match (&cli.file, cli.follow, tail_offset) {
        (Some(path), true, Some(offset)) => Some(FileTail::spawn(
            path.clone(),
            feed.clone(),
            offset,
            TAIL_POLL_INTERVAL,
        )),
        _ => None,
    };

    let show_numbers = !cli.no_line_numbers;
    loop {
        let event = events.recv().context("filter stream terminated")?;
        match event {
            StreamEvent::Update(FilterUpdate::Replace {
                lines,
                initial_load_complete,
            }) => {
                for line in &lines {
                    println!("{}", format_line(line, &leaves, show_numbers));
                }
                if initial_load_complete && !cli.follow {
                    break;
                }
            }
            StreamEvent::Update(FilterUpdate::Append { lines }) => {
                for line in &lines {
                    println!("{}", format_line(line, &leaves, show_numbers));
                }
            }
            StreamEvent::TotalLines(total) => debug!(total, "lines processed"),
            StreamEvent::Error(err) => eprintln!("warning: {err}"),
        }
    }

    Ok(())
}
