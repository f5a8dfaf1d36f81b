pub mod analysis;
pub mod args;
pub mod blocklist;
pub mod consent;
pub mod cookies;
pub mod domain;
pub mod error;
pub mod phrases;
pub mod records;
pub mod stats;
pub mod utils;

pub use analysis::{analyze_crawl, build_report, AnalysisReport};
pub use args::Args;
pub use blocklist::BlocklistIndex;
pub use consent::{attempt_consent, ConsentHeuristic, ConsentOutcome, PageInteractor};
pub use cookies::{lifespan_seconds, CookieAttributes, Lifespan, LifespanResult, LifespanSource};
pub use domain::{ClassifiedDomain, DomainClassifier, SuffixPolicy};
pub use error::{Error, Result};
pub use phrases::{init_default_phrases, load_accept_phrases};
pub use records::{CrawlMode, VisitRecord};
pub use stats::{prevalence, top_redirection_pairs, PrevalenceTable};
