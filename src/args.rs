use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::records::CrawlMode;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Desktop,
    Mobile,
    Both,
}

#[derive(Parser, Debug)]
#[command(
    name = "cookiescope",
    about = "Classify crawled third parties, trackers and cookies for privacy analysis",
    version,
    long_about = None
)]
pub struct Args {
    /// Path to the tracker blocklist document
    #[arg(short, long, default_value = "data/disconnect_blocklist.json")]
    pub blocklist: PathBuf,

    /// Directory containing crawled visit records (*.json)
    #[arg(short, long, default_value = "crawl_data")]
    pub records: PathBuf,

    /// Crawl mode to report on
    #[arg(short, long, value_enum, default_value_t = ModeArg::Both)]
    pub mode: ModeArg,

    /// Number of entries in each ranked table
    #[arg(short, long, default_value_t = 10)]
    pub top: usize,

    /// Number of longest-lived cookies to display
    #[arg(long, default_value_t = 3)]
    pub cookies: usize,

    /// Path to custom consent phrase file
    #[arg(short, long)]
    pub phrases: Option<PathBuf>,

    /// Consent probe timeout per phrase, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub probe_timeout_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Number of worker threads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Redact domain names for privacy
    #[arg(long)]
    pub redact: bool,

    /// Initialize accept_words.txt with default consent phrases
    #[arg(long)]
    pub init: bool,
}

impl Args {
    pub fn modes(&self) -> Vec<CrawlMode> {
        match self.mode {
            ModeArg::Desktop => vec![CrawlMode::Desktop],
            ModeArg::Mobile => vec![CrawlMode::Mobile],
            ModeArg::Both => CrawlMode::ALL.to_vec(),
        }
    }
}
