//! Command-line flags and configuration resolution.

use std::{
    io::{BufRead, Write},
    path::PathBuf,
};

use anyhow::{Context, Result, bail};
use chatload_core::{Configuration, PromptCategory};
use clap::Parser;

use crate::interactive::Prompter;

#[derive(Parser, Debug, Default)]
#[command(name = "chatload")]
#[command(about = "Paced conversational load generator for chat endpoints", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Endpoint address (ws:// or wss://)
    #[arg(short, long, env = "CHATLOAD_URL")]
    pub url: Option<String>,

    /// Prompt category: general, qa, creative, technical, educational or custom
    #[arg(short, long, env = "CHATLOAD_CATEGORY")]
    pub category: Option<PromptCategory>,

    /// Custom prompt (repeatable; implies the custom category)
    #[arg(short = 'p', long = "prompt")]
    pub prompts: Vec<String>,

    /// File with one custom prompt per line
    #[arg(long)]
    pub prompts_file: Option<PathBuf>,

    /// Seconds between prompts [default: 3]
    #[arg(short, long, env = "CHATLOAD_INTERVAL")]
    pub interval: Option<f64>,

    /// Number of prompts to send [default: 50]
    #[arg(short = 'n', long, env = "CHATLOAD_MAX_MESSAGES")]
    pub max_messages: Option<u32>,

    /// Where to write the session log [default: chat-log-<date>.json]
    #[arg(short, long, env = "CHATLOAD_LOG")]
    pub log: Option<PathBuf>,

    /// Ask for every setting not given on the command line
    #[arg(long)]
    pub interactive: bool,

    /// Disable keyboard controls (p: pause, q: stop)
    #[arg(long)]
    pub no_keys: bool,

    /// Print the built-in prompt categories and exit
    #[arg(long)]
    pub list_categories: bool,

    /// Print the resolved configuration without connecting
    #[arg(long)]
    pub dry_run: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

/// Read custom prompts, one per non-empty line.
fn read_prompts_file(path: &PathBuf) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompts file {}", path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Resolve flags (and optionally interactive answers) into a configuration.
///
/// Flags and environment variables win; the prompter only fills gaps.
pub fn resolve<R: BufRead, W: Write>(
    cli: &Cli,
    mut prompter: Option<&mut Prompter<R, W>>,
) -> Result<Configuration> {
    let url = match (&cli.url, prompter.as_deref_mut()) {
        (Some(url), _) => url.clone(),
        (None, Some(p)) => p.ask("Endpoint address", None)?,
        (None, None) => bail!("An endpoint address is required (--url or CHATLOAD_URL)"),
    };

    let mut custom = cli.prompts.clone();
    if let Some(path) = &cli.prompts_file {
        custom.extend(read_prompts_file(path)?);
    }

    let category = match (cli.category, prompter.as_deref_mut()) {
        (Some(c), _) => c,
        (None, _) if !custom.is_empty() => PromptCategory::Custom,
        (None, Some(p)) => p.ask_category()?,
        (None, None) => PromptCategory::default(),
    };

    if category == PromptCategory::Custom && custom.is_empty() {
        if let Some(p) = prompter.as_deref_mut() {
            custom = p.ask_prompts()?;
        }
    }

    let mut builder = Configuration::builder(url)
        .category(category)
        .custom_prompts(custom);

    let interval = match (cli.interval, prompter.as_deref_mut()) {
        (Some(secs), _) => Some(secs),
        (None, Some(p)) => Some(p.ask_number("Seconds between prompts", 3.0)?),
        (None, None) => None,
    };
    if let Some(secs) = interval {
        builder = builder.interval_secs(secs)?;
    }

    let max_messages = match (cli.max_messages, prompter.as_deref_mut()) {
        (Some(n), _) => Some(n),
        (None, Some(p)) => Some(p.ask_count("Number of prompts", 50)?),
        (None, None) => None,
    };
    if let Some(n) = max_messages {
        builder = builder.max_messages(n);
    }

    let log = match (&cli.log, prompter) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(p)) => p.ask_optional("Log file (empty for default)")?.map(PathBuf::from),
        (None, None) => None,
    };
    if let Some(path) = log {
        builder = builder.log_path(path);
    }

    Ok(builder.build()?)
}
