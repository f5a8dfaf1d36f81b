//! Cookie-consent banner dismissal.
//!
//! Candidate phrases are probed strictly in order against a live page, each
//! probe bounded by a short timeout. The first clickable match is clicked and
//! the search stops. Misses are expected: wording varies across sites and
//! locales, so a failed search is reported as an outcome rather than an error.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";

fn whitespace() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern compiles"))
}

/// XPath `normalize-space` followed by ASCII case folding.
pub fn normalize_text(text: &str) -> String {
    whitespace()
        .replace_all(text.trim(), " ")
        .to_ascii_lowercase()
}

/// Matches a clickable element whose text or `value` attribute equals a phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementLocator {
    phrase: String,
}

impl ElementLocator {
    pub fn new(phrase: &str) -> Self {
        Self {
            phrase: normalize_text(phrase),
        }
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// XPath expression for drivers that resolve elements natively.
    pub fn xpath(&self) -> String {
        let literal = xpath_literal(&self.phrase);
        format!(
            "//*[normalize-space(translate(., '{UPPERCASE}', '{LOWERCASE}')) = {literal} \
             or translate(@value, '{UPPERCASE}', '{LOWERCASE}') = {literal}]"
        )
    }

    /// Same predicate as [`ElementLocator::xpath`], for in-memory pages.
    pub fn matches(&self, text: &str, value: Option<&str>) -> bool {
        normalize_text(text) == self.phrase
            || value.is_some_and(|value| value.to_ascii_lowercase() == self.phrase)
    }
}

fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{s}'")
    } else if !s.contains('"') {
        format!("\"{s}\"")
    } else {
        let parts: Vec<String> = s.split('\'').map(|part| format!("'{part}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// Failure of a single page interaction.
#[derive(thiserror::Error, Debug)]
pub enum InteractionError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Driver(String),
}

/// Page-interaction collaborator supplied by the browser driver.
///
/// One handle per visit; the heuristic never issues concurrent calls.
pub trait PageInteractor {
    type Element;

    /// Wait up to `timeout` for a clickable element matching `locator`.
    fn wait_for_clickable(
        &mut self,
        locator: &ElementLocator,
        timeout: Duration,
    ) -> Result<Self::Element, InteractionError>;

    fn click(&mut self, element: Self::Element) -> Result<(), InteractionError>;
}

/// Result of probing the page for one phrase.
#[derive(Debug)]
pub enum ProbeOutcome<E> {
    Found(E),
    TimedOut,
    InteractionError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConsentOutcome {
    Accepted { phrase: String, attempts: usize },
    NotFound { attempts: usize },
    ClickFailed { phrase: String, reason: String },
}

impl ConsentOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, ConsentOutcome::Accepted { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ConsentHeuristic {
    phrases: Vec<String>,
    probe_timeout: Duration,
}

impl ConsentHeuristic {
    pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(100);

    /// `phrases` are tried in the given order.
    pub fn new(phrases: Vec<String>) -> Self {
        Self {
            phrases,
            probe_timeout: Self::DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Upper bound on the time spent probing when nothing matches.
    pub fn worst_case_duration(&self) -> Duration {
        self.probe_timeout * self.phrases.len() as u32
    }

    /// An element that only turned up after the probe budget ran out counts as a miss.
    fn probe<P: PageInteractor>(&self, page: &mut P, locator: &ElementLocator) -> ProbeOutcome<P::Element> {
        let start_time = Instant::now();
        match page.wait_for_clickable(locator, self.probe_timeout) {
            Ok(_) if start_time.elapsed() > self.probe_timeout => {
                debug!(
                    action = "probe",
                    component = "consent",
                    phrase = locator.phrase(),
                    elapsed_ms = start_time.elapsed().as_millis(),
                    "Driver overran the probe timeout"
                );
                ProbeOutcome::TimedOut
            }
            Ok(element) => ProbeOutcome::Found(element),
            Err(InteractionError::Timeout(_)) => ProbeOutcome::TimedOut,
            Err(InteractionError::Driver(reason)) => ProbeOutcome::InteractionError(reason),
        }
    }

    pub fn run<P: PageInteractor>(&self, page: &mut P) -> ConsentOutcome {
        let start_time = Instant::now();

        for (attempt, phrase) in self.phrases.iter().enumerate() {
            let locator = ElementLocator::new(phrase);
            let element = match self.probe(page, &locator) {
                ProbeOutcome::Found(element) => element,
                ProbeOutcome::TimedOut => {
                    debug!(action = "probe", component = "consent", phrase = locator.phrase(), "Phrase not found before timeout");
                    continue;
                }
                ProbeOutcome::InteractionError(reason) => {
                    debug!(action = "probe", component = "consent", phrase = locator.phrase(), error = %reason, "Probe failed");
                    continue;
                }
            };

            return match page.click(element) {
                Ok(()) => {
                    info!(
                        action = "complete",
                        component = "consent",
                        phrase = locator.phrase(),
                        attempts = attempt + 1,
                        duration_ms = start_time.elapsed().as_millis(),
                        "Consent banner accepted"
                    );
                    ConsentOutcome::Accepted {
                        phrase: phrase.clone(),
                        attempts: attempt + 1,
                    }
                }
                Err(e) => {
                    let reason = e.to_string();
                    warn!(
                        action = "click",
                        component = "consent",
                        phrase = locator.phrase(),
                        reason = %reason,
                        "Consent control could not be clicked"
                    );
                    ConsentOutcome::ClickFailed {
                        phrase: phrase.clone(),
                        reason,
                    }
                }
            };
        }

        info!(
            action = "complete",
            component = "consent",
            attempts = self.phrases.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "No consent control found"
        );
        ConsentOutcome::NotFound {
            attempts: self.phrases.len(),
        }
    }
}

/// Try to accept a consent banner with the default probe timeout.
pub fn attempt_consent<P: PageInteractor>(page: &mut P, phrases: &[String]) -> bool {
    ConsentHeuristic::new(phrases.to_vec()).run(page).accepted()
}
