use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing::error;

use cookiescope::analysis::print_analysis_results;
use cookiescope::phrases::DEFAULT_PHRASE_FILE;
use cookiescope::utils::{setup_logging, validate_args};
use cookiescope::{analyze_crawl, init_default_phrases, Args};

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    if args.init {
        return init_default_phrases(Path::new(DEFAULT_PHRASE_FILE));
    }

    validate_args(&args)?;

    match analyze_crawl(&args) {
        Ok(report) => {
            print_analysis_results(&report, &args);
            Ok(())
        }
        Err(e) => {
            error!(action = "fail", component = "analysis", error = ?e, "Analysis failed");
            std::process::exit(1);
        }
    }
}
