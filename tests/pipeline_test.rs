//! End-to-end tests: blocklist and crawl records on disk through to the report.

use clap::Parser;
use cookiescope::{
    analyze_crawl, records::load_records, Args, BlocklistIndex, CrawlMode, DomainClassifier,
    LifespanSource,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const BLOCKLIST: &str = r#"{
    "license": "GPLv3",
    "categories": {
        "Advertising": [
            {"Acme Ads": {"http://adnetwork.example/": ["adnetwork.example"]}},
            {"Google": {"http://www.google.com/": ["doubleclick.net"], "performance": ["gstatic.com"]}}
        ],
        "Analytics": [
            {"Metrics Co": {"analytics": {"metrics.example": ["collect.metrics.example"]}}}
        ]
    }
}"#;

fn write_fixtures(dir: &Path) {
    fs::write(dir.join("blocklist.json"), BLOCKLIST).unwrap();

    let records = dir.join("crawl_data");
    fs::create_dir(&records).unwrap();

    fs::write(
        records.join("news.example.com_desktop.json"),
        r#"{
            "website_domain": "news.example.com",
            "tranco_rank": 1,
            "crawl_mode": "Desktop",
            "requests_list": [
                {"request_url": "https://news.example.com/", "nr_cookies": 0,
                 "response_headers": {"set-cookie": "consent=1; Expires=Wed, 21 Oct 2099 07:28:00 GMT"}},
                {"request_url": "https://ad.doubleclick.net/pixel", "nr_cookies": 1,
                 "response_headers": {"location": "https://sync.adnetwork.example/match",
                                      "set-cookie": "IDE=abc; Max-Age=34128000; Secure"}},
                {"request_url": "https://www.gstatic.com/font.woff", "nr_cookies": 0,
                 "response_headers": null}
            ]
        }"#,
    )
    .unwrap();

    fs::write(
        records.join("shop.example.org_desktop.json"),
        r#"{
            "website_domain": "shop.example.org",
            "crawl_mode": "desktop",
            "third_party_domains": ["doubleclick.net", "collect.metrics.example", "fonts.example"],
            "nr_requests": 40,
            "cookies": [
                {"cart": "7", "Expires": "Session"},
                {"uid": "u1", "Expires": "not a date"},
                {"_mc": "x", "Max-Age": "600"}
            ],
            "redirection_pairs": [["shop.example.org", "collect.metrics.example"]]
        }"#,
    )
    .unwrap();

    fs::write(
        records.join("shop.example.org_mobile.json"),
        r#"{"website_domain": "shop.example.org", "crawl_mode": "Mobile",
            "third_party_domains": ["fonts.example"]}"#,
    )
    .unwrap();

    // Malformed records are skipped.
    fs::write(records.join("broken.json"), "{ not json").unwrap();
    fs::write(records.join("no_mode.json"), r#"{"website_domain": "x.example"}"#).unwrap();
    fs::write(records.join("notes.txt"), "ignored").unwrap();
}

#[test]
fn test_records_load_and_classify() {
    let temp_dir = TempDir::new().unwrap();
    write_fixtures(temp_dir.path());

    let index = BlocklistIndex::load(&temp_dir.path().join("blocklist.json")).unwrap();
    let classifier = DomainClassifier::new(&index);
    assert!(!index.contains("gstatic.com"));

    let records = load_records(&temp_dir.path().join("crawl_data")).unwrap();
    assert_eq!(records.len(), 3);

    let news = records
        .iter()
        .find(|r| r.website_domain == "news.example.com")
        .unwrap();
    assert_eq!(news.crawl_mode, CrawlMode::Desktop);
    assert_eq!(news.third_party_domains, vec!["doubleclick.net", "gstatic.com"]);
    assert_eq!(news.cookies.len(), 2);
    assert_eq!(
        news.redirection_pairs,
        vec![("ad.doubleclick.net".to_string(), "sync.adnetwork.example".to_string())]
    );

    let trackers: Vec<bool> = news
        .third_party_domains
        .iter()
        .map(|d| classifier.is_tracker(d))
        .collect();
    assert_eq!(trackers, vec![true, false]);
    assert_eq!(classifier.entity("collect.metrics.example"), Some("Metrics Co"));
}

#[test]
fn test_full_analysis() {
    let temp_dir = TempDir::new().unwrap();
    write_fixtures(temp_dir.path());

    let blocklist = temp_dir.path().join("blocklist.json");
    let records = temp_dir.path().join("crawl_data");
    let args = Args::parse_from([
        "cookiescope",
        "--blocklist",
        blocklist.to_str().unwrap(),
        "--records",
        records.to_str().unwrap(),
        "--workers",
        "2",
        "--cookies",
        "2",
    ]);

    let report = analyze_crawl(&args).unwrap();
    assert_eq!(report.record_count, 3);

    let desktop = report
        .modes
        .iter()
        .find(|m| m.mode == CrawlMode::Desktop)
        .unwrap();
    assert_eq!(desktop.visits, 2);
    assert_eq!(desktop.trackers.entries()[0], ("doubleclick.net".to_string(), 2));
    assert_eq!(desktop.entities.entries()[0], ("Google".to_string(), 2));
    assert_eq!(desktop.redirections.len(), 2);

    // Longest first: the 2099 consent cookie, then the 395-day IDE cookie.
    let cookies: Vec<(&str, LifespanSource)> = desktop
        .longest_lived_cookies
        .iter()
        .map(|c| (c.cookie_name.as_str(), c.lifespan.source))
        .collect();
    assert_eq!(
        cookies,
        vec![
            ("consent", LifespanSource::Expires),
            ("IDE", LifespanSource::MaxAge)
        ]
    );

    let mobile = report
        .modes
        .iter()
        .find(|m| m.mode == CrawlMode::Mobile)
        .unwrap();
    assert_eq!(mobile.visits, 1);
    assert!(mobile.trackers.is_empty());

    let consent = report.consent.unwrap();
    assert!(consent.phrase_count > 0);
}

#[test]
fn test_invalid_blocklist_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    write_fixtures(temp_dir.path());
    fs::write(temp_dir.path().join("blocklist.json"), r#"{"categories": {"Ads": 3}}"#).unwrap();

    let blocklist = temp_dir.path().join("blocklist.json");
    let records = temp_dir.path().join("crawl_data");
    let args = Args::parse_from([
        "cookiescope",
        "--blocklist",
        blocklist.to_str().unwrap(),
        "--records",
        records.to_str().unwrap(),
    ]);

    assert!(analyze_crawl(&args).is_err());
}

#[test]
fn test_missing_phrase_file_keeps_report() {
    let temp_dir = TempDir::new().unwrap();
    write_fixtures(temp_dir.path());

    let blocklist = temp_dir.path().join("blocklist.json");
    let records = temp_dir.path().join("crawl_data");
    let phrases = temp_dir.path().join("no_such_words.txt");
    let args = Args::parse_from([
        "cookiescope",
        "--blocklist",
        blocklist.to_str().unwrap(),
        "--records",
        records.to_str().unwrap(),
        "--phrases",
        phrases.to_str().unwrap(),
        "--mode",
        "desktop",
    ]);

    let report = analyze_crawl(&args).unwrap();
    assert_eq!(report.record_count, 3);
    assert_eq!(report.modes.len(), 1);
    assert_eq!(report.modes[0].mode, CrawlMode::Desktop);
    assert!(report.consent.is_none());
}
