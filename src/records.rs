//! Visit records produced by the crawler.
//!
//! Each crawl writes one JSON document per `(website, crawl mode)` pair. Raw
//! documents are validated here into typed [`VisitRecord`]s; fields the crawler
//! did not record directly (third parties, cookies, redirects) are derived from
//! the captured request list.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::cookies::CookieAttributes;
use crate::domain::{first_level_domain, has_valid_tld, host_of};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlMode {
    Desktop,
    Mobile,
}

impl CrawlMode {
    pub const ALL: [CrawlMode; 2] = [CrawlMode::Desktop, CrawlMode::Mobile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
        }
    }
}

impl fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrawlMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desktop" => Ok(Self::Desktop),
            "mobile" => Ok(Self::Mobile),
            other => Err(format!("unknown crawl mode {other:?}")),
        }
    }
}

/// One crawl observation. Never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitRecord {
    pub website_domain: String,
    pub crawl_mode: CrawlMode,
    pub tranco_rank: Option<u64>,
    /// Ordered and deduplicated.
    pub third_party_domains: Vec<String>,
    pub cookies: Vec<CookieAttributes>,
    pub redirection_pairs: Vec<(String, String)>,
    pub nr_requests: usize,
    /// Sum of the cookies sent with each request.
    pub nr_request_cookies: usize,
}

#[derive(Debug, Deserialize)]
struct RawVisitRecord {
    website_domain: Option<String>,
    crawl_mode: Option<String>,
    tranco_rank: Option<u64>,
    third_party_domains: Option<Vec<String>>,
    nr_requests: Option<usize>,
    #[serde(default)]
    requests_list: Vec<RawRequest>,
    cookies: Option<Vec<Map<String, Value>>>,
    redirection_pairs: Option<Vec<(String, String)>>,
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    request_url: String,
    #[serde(default)]
    response_headers: Option<Map<String, Value>>,
    #[serde(default)]
    nr_cookies: usize,
}

impl RawRequest {
    fn response_header(&self, name: &str) -> Vec<&str> {
        let Some(headers) = &self.response_headers else {
            return Vec::new();
        };
        headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .flat_map(|(_, value)| match value {
                Value::String(s) => s.lines().collect::<Vec<_>>(),
                Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                _ => Vec::new(),
            })
            .collect()
    }
}

impl VisitRecord {
    pub fn new(website_domain: impl Into<String>, crawl_mode: CrawlMode) -> Self {
        Self {
            website_domain: website_domain.into(),
            crawl_mode,
            tranco_rank: None,
            third_party_domains: Vec::new(),
            cookies: Vec::new(),
            redirection_pairs: Vec::new(),
            nr_requests: 0,
            nr_request_cookies: 0,
        }
    }

    /// Validate one crawler document. `origin` names the source in diagnostics.
    pub fn from_json(raw: &str, origin: &str) -> Result<Self> {
        let malformed = |reason: String| Error::MalformedRecord {
            origin: origin.to_string(),
            reason,
        };

        let raw: RawVisitRecord =
            serde_json::from_str(raw).map_err(|e| malformed(e.to_string()))?;

        let website_domain = raw
            .website_domain
            .as_deref()
            .map(str::trim)
            .filter(|domain| !domain.is_empty())
            .ok_or_else(|| malformed("missing website_domain".to_string()))?
            .to_ascii_lowercase();
        let crawl_mode = raw
            .crawl_mode
            .as_deref()
            .ok_or_else(|| malformed("missing crawl_mode".to_string()))?
            .parse::<CrawlMode>()
            .map_err(malformed)?;

        let third_party_domains = match &raw.third_party_domains {
            Some(domains) => dedup_domains(domains.iter().map(String::as_str)),
            None => derive_third_parties(&website_domain, &raw.requests_list),
        };

        let cookies = match &raw.cookies {
            Some(maps) => maps
                .iter()
                .filter_map(CookieAttributes::from_json_object)
                .collect(),
            None => raw
                .requests_list
                .iter()
                .flat_map(|request| request.response_header("set-cookie"))
                .filter_map(CookieAttributes::parse_set_cookie)
                .collect(),
        };

        let redirection_pairs = match raw.redirection_pairs {
            Some(pairs) => pairs,
            None => derive_redirection_pairs(&raw.requests_list),
        };

        Ok(Self {
            website_domain,
            crawl_mode,
            tranco_rank: raw.tranco_rank,
            third_party_domains,
            cookies,
            redirection_pairs,
            nr_requests: raw.nr_requests.unwrap_or(raw.requests_list.len()),
            nr_request_cookies: raw.requests_list.iter().map(|r| r.nr_cookies).sum(),
        })
    }
}

fn dedup_domains<'a, I>(domains: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut unique: Vec<String> = Vec::new();
    for domain in domains {
        let domain = domain.trim().to_ascii_lowercase();
        if !domain.is_empty() && !unique.contains(&domain) {
            unique.push(domain);
        }
    }
    unique
}

fn derive_third_parties(website_domain: &str, requests: &[RawRequest]) -> Vec<String> {
    let first_party = first_level_domain(website_domain);
    let candidates: Vec<String> = requests
        .iter()
        .filter_map(|request| host_of(&request.request_url))
        .filter(|host| has_valid_tld(host))
        .map(|host| first_level_domain(&host))
        .filter(|domain| *domain != first_party)
        .collect();
    dedup_domains(candidates.iter().map(String::as_str))
}

fn derive_redirection_pairs(requests: &[RawRequest]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for request in requests {
        let Ok(source) = Url::parse(&request.request_url) else {
            continue;
        };
        let Some(source_host) = source.host_str() else {
            continue;
        };
        for location in request.response_header("location") {
            let Some(target_host) = source
                .join(location.trim())
                .ok()
                .and_then(|target| target.host_str().map(str::to_ascii_lowercase))
            else {
                continue;
            };
            let source_host = source_host.to_ascii_lowercase();
            if target_host != source_host {
                pairs.push((source_host, target_host));
            }
        }
    }
    pairs
}

/// Load every `*.json` record under `dir`. Malformed records are skipped with
/// a diagnostic; an unreadable directory is an error.
pub fn load_records(dir: &Path) -> Result<Vec<VisitRecord>> {
    let start_time = Instant::now();
    info!(action = "start", component = "record_loading", directory = ?dir, "Loading visit records");

    let io_error = |source| Error::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_error)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let loaded: Vec<Option<VisitRecord>> = files
        .par_iter()
        .map(|path| {
            let origin = path.display().to_string();
            let record = fs::read_to_string(path)
                .map_err(|source| Error::Io {
                    path: path.clone(),
                    source,
                })
                .and_then(|content| VisitRecord::from_json(&content, &origin));
            match record {
                Ok(record) => {
                    debug!(action = "parse", component = "record_loading", file_path = %origin, "Loaded visit record");
                    Some(record)
                }
                Err(e) => {
                    warn!(action = "skip", component = "record_loading", file_path = %origin, error = %e, "Skipping malformed visit record");
                    None
                }
            }
        })
        .collect();

    let skipped = loaded.iter().filter(|record| record.is_none()).count();
    let records: Vec<VisitRecord> = loaded.into_iter().flatten().collect();

    info!(
        action = "complete",
        component = "record_loading",
        record_count = records.len(),
        skipped,
        duration_ms = start_time.elapsed().as_millis(),
        "Visit records loaded"
    );
    Ok(records)
}
