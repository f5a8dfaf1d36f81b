//! Prevalence and ranking over classified visit records.
//!
//! Every function here is a pure fold over borrowed records: no I/O, no
//! caching between calls.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;

use crate::cookies::{self, LifespanResult};
use crate::domain::DomainClassifier;
use crate::records::{CrawlMode, VisitRecord};

/// Keys ranked by count, highest first. Equal counts keep first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrevalenceTable<K> {
    entries: Vec<(K, usize)>,
}

impl<K: Eq + Hash + Clone> PrevalenceTable<K> {
    pub fn from_observations<I>(observations: I) -> Self
    where
        I: IntoIterator<Item = K>,
    {
        let mut positions: HashMap<K, usize> = HashMap::new();
        let mut entries: Vec<(K, usize)> = Vec::new();
        for key in observations {
            match positions.get(&key) {
                Some(&position) => entries[position].1 += 1,
                None => {
                    positions.insert(key.clone(), entries.len());
                    entries.push((key, 1));
                }
            }
        }

        // Stable sort keeps insertion order among ties.
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        Self { entries }
    }

    pub fn count(&self, key: &K) -> usize {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map_or(0, |(_, count)| *count)
    }
}

impl<K> PrevalenceTable<K> {
    pub fn entries(&self) -> &[(K, usize)] {
        &self.entries
    }

    pub fn top(&self, n: usize) -> &[(K, usize)] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn truncated(mut self, n: usize) -> Self {
        self.entries.truncate(n);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn in_mode<'r>(records: &'r [VisitRecord], mode: CrawlMode) -> impl Iterator<Item = &'r VisitRecord> {
    records.iter().filter(move |record| record.crawl_mode == mode)
}

/// Count the keys `field` yields for every record crawled in `mode`.
pub fn prevalence<'r, K, F, I>(records: &'r [VisitRecord], mode: CrawlMode, field: F) -> PrevalenceTable<K>
where
    K: Eq + Hash + Clone,
    F: FnMut(&'r VisitRecord) -> I,
    I: IntoIterator<Item = K>,
{
    PrevalenceTable::from_observations(in_mode(records, mode).flat_map(field))
}

pub fn third_party_prevalence(records: &[VisitRecord], mode: CrawlMode) -> PrevalenceTable<String> {
    prevalence(records, mode, |record| record.third_party_domains.iter().cloned())
}

/// Third-party domains that classify as trackers.
pub fn tracker_prevalence(
    records: &[VisitRecord],
    mode: CrawlMode,
    classifier: &DomainClassifier<'_>,
) -> PrevalenceTable<String> {
    prevalence(records, mode, |record| {
        record
            .third_party_domains
            .iter()
            .filter(|domain| classifier.is_tracker(domain))
            .cloned()
            .collect::<Vec<_>>()
    })
}

/// Tracker entities, counted once per visit.
pub fn entity_prevalence(
    records: &[VisitRecord],
    mode: CrawlMode,
    classifier: &DomainClassifier<'_>,
) -> PrevalenceTable<String> {
    prevalence(records, mode, |record| {
        classifier
            .tracker_entities(record.third_party_domains.iter().map(String::as_str))
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>()
    })
}

/// The `n` most frequent redirection pairs with a tracker on either end.
pub fn top_redirection_pairs(
    records: &[VisitRecord],
    mode: CrawlMode,
    classifier: &DomainClassifier<'_>,
    n: usize,
) -> PrevalenceTable<(String, String)> {
    prevalence(records, mode, |record| {
        record
            .redirection_pairs
            .iter()
            .filter(|(source, target)| classifier.is_tracker(source) || classifier.is_tracker(target))
            .cloned()
            .collect::<Vec<_>>()
    })
    .truncated(n)
}

/// The `k` longest-lived cookies in `mode`. `owner_index` points into `records`.
pub fn longest_lived_cookies(
    records: &[VisitRecord],
    mode: CrawlMode,
    k: usize,
    now: DateTime<Utc>,
) -> Vec<LifespanResult> {
    let owners = records
        .iter()
        .enumerate()
        .filter(|(_, record)| record.crawl_mode == mode)
        .map(|(index, record)| (index, record.cookies.as_slice()));
    cookies::longest_lived(owners, k, now)
}

/// Per-visit classification of third parties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitSummary {
    pub website_domain: String,
    pub crawl_mode: CrawlMode,
    pub third_party_count: usize,
    pub tracker_domains: Vec<String>,
    pub tracker_entities: Vec<String>,
    pub nr_requests: usize,
}

/// Classify every record. Records are independent, so this runs on the
/// current rayon pool.
pub fn summarize_visits(records: &[VisitRecord], classifier: &DomainClassifier<'_>) -> Vec<VisitSummary> {
    records
        .par_iter()
        .map(|record| {
            let tracker_domains: Vec<String> = record
                .third_party_domains
                .iter()
                .filter(|domain| classifier.is_tracker(domain))
                .cloned()
                .collect();
            let tracker_entities = classifier
                .tracker_entities(tracker_domains.iter().map(String::as_str))
                .into_iter()
                .map(str::to_string)
                .collect();
            VisitSummary {
                website_domain: record.website_domain.clone(),
                crawl_mode: record.crawl_mode,
                third_party_count: record.third_party_domains.len(),
                tracker_domains,
                tracker_entities,
                nr_requests: record.nr_requests,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSummary {
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

impl MetricSummary {
    pub fn from_values(mut values: Vec<f64>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        values.sort_by(f64::total_cmp);

        let mid = values.len() / 2;
        let median = if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        };
        Some(Self {
            min: values[0],
            max: values[values.len() - 1],
            median,
        })
    }
}

/// Min, max and median of a per-visit metric within one crawl mode.
pub fn compare_metric<F>(summaries: &[VisitSummary], mode: CrawlMode, metric: F) -> Option<MetricSummary>
where
    F: Fn(&VisitSummary) -> f64,
{
    MetricSummary::from_values(
        summaries
            .iter()
            .filter(|summary| summary.crawl_mode == mode)
            .map(metric)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::BlocklistIndex;
    use crate::cookies::CookieAttributes;

    fn record(site: &str, mode: CrawlMode, third_parties: &[&str]) -> VisitRecord {
        let mut record = VisitRecord::new(site, mode);
        record.third_party_domains = third_parties.iter().map(|d| d.to_string()).collect();
        record
    }

    fn index() -> BlocklistIndex {
        BlocklistIndex::from_entries([
            ("doubleclick.net", "Google"),
            ("google-analytics.com", "Google"),
            ("adnetwork.example", "Acme Ads"),
        ])
    }

    #[test]
    fn test_prevalence_counts_and_ranks() {
        let records = vec![
            record("a.com", CrawlMode::Desktop, &["cdn.net", "doubleclick.net"]),
            record("b.com", CrawlMode::Desktop, &["doubleclick.net", "fonts.net"]),
            record("c.com", CrawlMode::Mobile, &["cdn.net"]),
            record("d.com", CrawlMode::Desktop, &["fonts.net", "doubleclick.net"]),
        ];

        let table = third_party_prevalence(&records, CrawlMode::Desktop);
        assert_eq!(
            table.entries(),
            &[
                ("doubleclick.net".to_string(), 3),
                ("fonts.net".to_string(), 2),
                ("cdn.net".to_string(), 1),
            ]
        );
        assert_eq!(table.count(&"cdn.net".to_string()), 1);
        assert_eq!(table.count(&"missing.net".to_string()), 0);
        assert_eq!(table.top(1).len(), 1);
        assert_eq!(table.top(10).len(), 3);
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let table = PrevalenceTable::from_observations(["b", "a", "c", "a", "b", "c"]);
        assert_eq!(table.entries(), &[("b", 2), ("a", 2), ("c", 2)]);
    }

    #[test]
    fn test_empty_input() {
        let table = third_party_prevalence(&[], CrawlMode::Mobile);
        assert!(table.is_empty());

        let records = vec![record("a.com", CrawlMode::Desktop, &["cdn.net"])];
        assert!(third_party_prevalence(&records, CrawlMode::Mobile).is_empty());
    }

    #[test]
    fn test_tracker_and_entity_prevalence() {
        let index = index();
        let classifier = DomainClassifier::new(&index);
        let records = vec![
            record("a.com", CrawlMode::Desktop, &["stats.g.doubleclick.net", "google-analytics.com", "cdn.net"]),
            record("b.com", CrawlMode::Desktop, &["x.adnetwork.example", "stats.g.doubleclick.net"]),
        ];

        let trackers = tracker_prevalence(&records, CrawlMode::Desktop, &classifier);
        assert_eq!(trackers.entries()[0], ("stats.g.doubleclick.net".to_string(), 2));
        assert_eq!(trackers.len(), 3);

        let entities = entity_prevalence(&records, CrawlMode::Desktop, &classifier);
        assert_eq!(
            entities.entries(),
            &[("Google".to_string(), 2), ("Acme Ads".to_string(), 1)]
        );
    }

    #[test]
    fn test_top_redirection_pairs() {
        let index = index();
        let classifier = DomainClassifier::new(&index);
        let pair = |s: &str, t: &str| (s.to_string(), t.to_string());

        let mut first = VisitRecord::new("a.com", CrawlMode::Mobile);
        first.redirection_pairs = vec![
            pair("www.a.com", "a.com"),
            pair("ad.doubleclick.net", "sync.adnetwork.example"),
            pair("a.com", "px.adnetwork.example"),
        ];
        let mut second = VisitRecord::new("b.com", CrawlMode::Mobile);
        second.redirection_pairs = vec![
            pair("a.com", "px.adnetwork.example"),
            pair("cdn.b.com", "cdn.net"),
        ];
        let records = vec![first, second];

        let table = top_redirection_pairs(&records, CrawlMode::Mobile, &classifier, 10);
        assert_eq!(
            table.entries(),
            &[
                (pair("a.com", "px.adnetwork.example"), 2),
                (pair("ad.doubleclick.net", "sync.adnetwork.example"), 1),
            ]
        );

        let top_one = top_redirection_pairs(&records, CrawlMode::Mobile, &classifier, 1);
        assert_eq!(top_one.len(), 1);
        assert!(top_redirection_pairs(&records, CrawlMode::Desktop, &classifier, 10).is_empty());
    }

    #[test]
    fn test_longest_lived_cookies_by_mode() {
        let cookie = |name: &str, max_age: &str| {
            CookieAttributes::from_pairs([(name, "v"), ("Max-Age", max_age)]).unwrap()
        };
        let mut desktop = VisitRecord::new("a.com", CrawlMode::Desktop);
        desktop.cookies = vec![cookie("a", "10"), cookie("b", "99999")];
        let mut mobile = VisitRecord::new("a.com", CrawlMode::Mobile);
        mobile.cookies = vec![cookie("c", "50")];
        let mut desktop_two = VisitRecord::new("b.com", CrawlMode::Desktop);
        desktop_two.cookies = vec![cookie("d", "10")];
        let records = vec![desktop, mobile, desktop_two];

        let top = longest_lived_cookies(&records, CrawlMode::Desktop, 2, Utc::now());
        let positions: Vec<(usize, usize)> = top.iter().map(|r| (r.owner_index, r.cookie_index)).collect();
        assert_eq!(positions, vec![(0, 1), (0, 0)]);
    }

    #[test]
    fn test_summaries_and_metric_comparison() {
        let index = index();
        let classifier = DomainClassifier::new(&index);
        let mut records = vec![
            record("a.com", CrawlMode::Desktop, &["doubleclick.net", "cdn.net"]),
            record("b.com", CrawlMode::Desktop, &["cdn.net"]),
            record("c.com", CrawlMode::Desktop, &["doubleclick.net", "google-analytics.com", "x.adnetwork.example"]),
            record("d.com", CrawlMode::Desktop, &[]),
        ];
        for (record, requests) in records.iter_mut().zip([10, 40, 20, 30]) {
            record.nr_requests = requests;
        }

        let summaries = summarize_visits(&records, &classifier);
        assert_eq!(summaries[2].tracker_entities, vec!["Google", "Acme Ads"]);
        assert_eq!(summaries[0].tracker_domains, vec!["doubleclick.net"]);

        let requests = compare_metric(&summaries, CrawlMode::Desktop, |s| s.nr_requests as f64).unwrap();
        assert_eq!(requests, MetricSummary { min: 10.0, max: 40.0, median: 25.0 });

        let trackers = compare_metric(&summaries, CrawlMode::Desktop, |s| s.tracker_domains.len() as f64).unwrap();
        assert_eq!(trackers.median, 0.5);
        assert_eq!(trackers.max, 3.0);
        assert_eq!(compare_metric(&summaries, CrawlMode::Mobile, |s| s.nr_requests as f64), None);
    }
}
