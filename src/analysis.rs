use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::blocklist::BlocklistIndex;
use crate::consent::ConsentHeuristic;
use crate::cookies::LifespanResult;
use crate::domain::DomainClassifier;
use crate::records::{load_records, CrawlMode, VisitRecord};
use crate::stats::{self, MetricSummary, PrevalenceTable};
use crate::utils::{format_lifespan, format_number, redact_domain};
use crate::{phrases, Args};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongLivedCookie {
    pub website_domain: String,
    pub cookie_name: String,
    pub lifespan: LifespanResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeReport {
    pub mode: CrawlMode,
    pub visits: usize,
    pub third_parties: PrevalenceTable<String>,
    pub trackers: PrevalenceTable<String>,
    pub entities: PrevalenceTable<String>,
    pub redirections: PrevalenceTable<(String, String)>,
    pub longest_lived_cookies: Vec<LongLivedCookie>,
    pub requests: Option<MetricSummary>,
    pub third_party_counts: Option<MetricSummary>,
    pub tracker_counts: Option<MetricSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsentSummary {
    pub phrase_count: usize,
    pub probe_timeout: Duration,
    pub worst_case: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub record_count: usize,
    pub blocklist_domains: usize,
    pub modes: Vec<ModeReport>,
    pub consent: Option<ConsentSummary>,
}

/// Fold classified records into per-mode rankings.
pub fn build_report(
    records: &[VisitRecord],
    index: &BlocklistIndex,
    modes: &[CrawlMode],
    top: usize,
    cookie_count: usize,
    now: DateTime<Utc>,
) -> AnalysisReport {
    let start_time = Instant::now();
    let classifier = DomainClassifier::new(index);
    let summaries = stats::summarize_visits(records, &classifier);

    let modes = modes
        .iter()
        .map(|&mode| {
            let longest_lived_cookies = stats::longest_lived_cookies(records, mode, cookie_count, now)
                .into_iter()
                .map(|lifespan| {
                    let owner = &records[lifespan.owner_index];
                    LongLivedCookie {
                        website_domain: owner.website_domain.clone(),
                        cookie_name: owner.cookies[lifespan.cookie_index].name.clone(),
                        lifespan,
                    }
                })
                .collect();

            ModeReport {
                mode,
                visits: records.iter().filter(|r| r.crawl_mode == mode).count(),
                third_parties: stats::third_party_prevalence(records, mode).truncated(top),
                trackers: stats::tracker_prevalence(records, mode, &classifier).truncated(top),
                entities: stats::entity_prevalence(records, mode, &classifier).truncated(top),
                redirections: stats::top_redirection_pairs(records, mode, &classifier, top),
                longest_lived_cookies,
                requests: stats::compare_metric(&summaries, mode, |s| s.nr_requests as f64),
                third_party_counts: stats::compare_metric(&summaries, mode, |s| s.third_party_count as f64),
                tracker_counts: stats::compare_metric(&summaries, mode, |s| s.tracker_domains.len() as f64),
            }
        })
        .collect();

    info!(
        action = "complete",
        component = "report",
        record_count = records.len(),
        duration_ms = start_time.elapsed().as_millis(),
        "Report built"
    );

    AnalysisReport {
        record_count: records.len(),
        blocklist_domains: index.len(),
        modes,
        consent: None,
    }
}

pub fn analyze_crawl(args: &Args) -> Result<AnalysisReport> {
    let total_start_time = Instant::now();
    info!(action = "start", component = "analysis", "Starting crawl analysis");

    let index = BlocklistIndex::load(&args.blocklist)
        .with_context(|| format!("Cannot classify without a valid blocklist ({:?})", args.blocklist))?;

    let workers = args.workers.unwrap_or_else(|| {
        let cpu_count = num_cpus::get();
        std::cmp::min(cpu_count, 8)
    });
    info!(action = "configure", component = "analysis", worker_count = workers, "Using workers for processing");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("Failed to build worker pool")?;

    let mut report = pool.install(|| -> Result<AnalysisReport> {
        let records = load_records(&args.records)
            .with_context(|| format!("Failed to read visit records from {:?}", args.records))?;
        Ok(build_report(
            &records,
            &index,
            &args.modes(),
            args.top,
            args.cookies,
            Utc::now(),
        ))
    })?;

    report.consent = consent_summary(args);

    info!(
        action = "complete",
        component = "analysis",
        duration_ms = total_start_time.elapsed().as_millis(),
        "Analysis completed successfully"
    );
    Ok(report)
}

/// Probe budget of the configured phrase list. The crawl report does not depend
/// on it, so an unusable phrase file only drops this section.
pub fn consent_summary(args: &Args) -> Option<ConsentSummary> {
    let phrases = match phrases::load_accept_phrases(args.phrases.as_deref()) {
        Ok(phrases) => phrases,
        Err(e) => {
            warn!(action = "skip", component = "consent", error = %format!("{e:#}"), "Consent phrases unavailable");
            return None;
        }
    };

    let consent = ConsentHeuristic::new(phrases).with_probe_timeout(Duration::from_millis(args.probe_timeout_ms));
    Some(ConsentSummary {
        phrase_count: consent.phrases().len(),
        probe_timeout: consent.probe_timeout(),
        worst_case: consent.worst_case_duration(),
    })
}

fn display(domain: &str, redact: bool) -> String {
    if redact {
        redact_domain(domain)
    } else {
        domain.to_string()
    }
}

fn print_table(title: &str, table: &PrevalenceTable<String>, unit: &str, redact: bool) {
    if table.is_empty() {
        return;
    }
    println!("\n{title}:");
    for (key, count) in table.entries() {
        println!("- {}: {} {}", display(key, redact), format_number(*count), unit);
    }
}

fn print_metric(label: &str, summary: Option<&MetricSummary>) {
    if let Some(summary) = summary {
        println!(
            "- {}: min {}, max {}, median {}",
            label, summary.min, summary.max, summary.median
        );
    }
}

pub fn print_analysis_results(report: &AnalysisReport, args: &Args) {
    println!("\n--- Crawl Privacy Analysis ---");
    println!("Visit records analyzed: {}", format_number(report.record_count));
    println!("Blocklist domains: {}", format_number(report.blocklist_domains));

    if let Some(consent) = &report.consent {
        println!(
            "Consent phrases: {} ({}ms per probe, at most {}ms per visit)",
            format_number(consent.phrase_count),
            consent.probe_timeout.as_millis(),
            consent.worst_case.as_millis()
        );
    }

    for mode in &report.modes {
        println!("\n=== {} crawl ({} visits) ===", mode.mode, format_number(mode.visits));

        print_table(
            &format!("Top {} third-party domains", mode.third_parties.len()),
            &mode.third_parties,
            "websites",
            args.redact,
        );
        print_table(
            &format!("Top {} tracker domains", mode.trackers.len()),
            &mode.trackers,
            "websites",
            args.redact,
        );
        print_table(
            &format!("Top {} tracker entities", mode.entities.len()),
            &mode.entities,
            "websites",
            false,
        );

        if !mode.redirections.is_empty() {
            println!("\nTop {} tracker redirections:", mode.redirections.len());
            for ((source, target), count) in mode.redirections.entries() {
                println!(
                    "- {} -> {}: {}",
                    display(source, args.redact),
                    display(target, args.redact),
                    format_number(*count)
                );
            }
        }

        if !mode.longest_lived_cookies.is_empty() {
            println!("\nLongest-lived cookies:");
            for cookie in &mode.longest_lived_cookies {
                println!(
                    "- {} on {}: {} ({:?})",
                    cookie.cookie_name,
                    display(&cookie.website_domain, args.redact),
                    format_lifespan(cookie.lifespan.age_seconds),
                    cookie.lifespan.source
                );
            }
        }

        if mode.visits > 0 {
            println!("\nPer-website metrics:");
            print_metric("Requests", mode.requests.as_ref());
            print_metric("Third parties", mode.third_party_counts.as_ref());
            print_metric("Trackers", mode.tracker_counts.as_ref());
        }
    }
}
