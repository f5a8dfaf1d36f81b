use serde::Serialize;
use url::Url;

use crate::blocklist::BlocklistIndex;

pub fn has_valid_tld(domain: &str) -> bool {
    if domain.is_empty() || domain.len() < 3 || !domain.contains('.') {
        return false;
    }

    if let Some(last_dot) = domain.rfind('.') {
        if last_dot == domain.len() - 1 {
            return false;
        }
        let tld = &domain[last_dot + 1..];
        // Internationalized TLDs arrive from `url` in their punycode form.
        if let Some(encoded) = tld.strip_prefix("xn--") {
            return !encoded.is_empty()
                && encoded
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        }
        tld.len() >= 2
            && tld
                .chars()
                .all(|c| c.is_ascii_lowercase() && c.is_ascii_alphabetic())
    } else {
        false
    }
}

const SECOND_LEVEL_SUFFIXES: &[&str] = &["ac", "co", "com", "edu", "gov", "ne", "net", "or", "org"];

/// Lower-cased host of a URL, if it has one.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url)
        .or_else(|_| Url::parse(&format!("https://{url}")))
        .ok()?;
    parsed.host_str().map(|host| host.to_ascii_lowercase())
}

/// Approximate registrable domain: the last two labels, or three under a
/// country-code second-level suffix such as `co.uk`.
pub fn first_level_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() <= 2 {
        return host;
    }

    let second_level = parts[parts.len() - 2];
    let country_tld = parts[parts.len() - 1].len() == 2;
    let keep = if country_tld && SECOND_LEVEL_SUFFIXES.contains(&second_level) {
        3
    } else {
        2
    };
    parts[parts.len() - keep..].join(".")
}

/// Bounds for suffix stepping.
///
/// A candidate is first collapsed to its last `max_labels` labels, then the
/// leftmost label is stripped at most `max_strips` times. Both bounds are
/// heuristics inherited from public-suffix practice rather than derived limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuffixPolicy {
    pub max_labels: usize,
    pub max_strips: usize,
}

impl Default for SuffixPolicy {
    fn default() -> Self {
        Self {
            max_labels: 5,
            max_strips: 4,
        }
    }
}

/// Result of classifying one observed domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedDomain {
    pub observed: String,
    pub matched_suffix: Option<String>,
    pub entity: Option<String>,
}

impl ClassifiedDomain {
    pub fn is_tracker(&self) -> bool {
        self.matched_suffix.is_some()
    }
}

/// Classifies domains against an immutable blocklist index.
#[derive(Debug, Clone, Copy)]
pub struct DomainClassifier<'a> {
    index: &'a BlocklistIndex,
    policy: SuffixPolicy,
}

impl<'a> DomainClassifier<'a> {
    pub fn new(index: &'a BlocklistIndex) -> Self {
        Self::with_policy(index, SuffixPolicy::default())
    }

    pub fn with_policy(index: &'a BlocklistIndex, policy: SuffixPolicy) -> Self {
        Self { index, policy }
    }

    pub fn index(&self) -> &'a BlocklistIndex {
        self.index
    }

    /// Blocklist entry matched by `domain`, if any.
    pub fn matched_suffix(&self, domain: &str) -> Option<&'a str> {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        if domain.is_empty() {
            return None;
        }
        if let Some((known, _)) = self.index.domain_to_entity().get_key_value(&domain) {
            return Some(known.as_str());
        }

        let labels: Vec<&str> = domain.split('.').collect();
        let start = labels.len().saturating_sub(self.policy.max_labels);
        let collapsed = labels[start..].join(".");

        let mut current = collapsed.as_str();
        for step in 0..=self.policy.max_strips {
            if let Some((known, _)) = self.index.domain_to_entity().get_key_value(current) {
                return Some(known.as_str());
            }
            if step == self.policy.max_strips {
                break;
            }
            current = current.split_once('.')?.1;
        }
        None
    }

    pub fn is_tracker(&self, domain: &str) -> bool {
        self.matched_suffix(domain).is_some()
    }

    /// Owning entity of a tracker domain.
    pub fn entity(&self, domain: &str) -> Option<&'a str> {
        self.matched_suffix(domain)
            .and_then(|suffix| self.index.entity(suffix))
    }

    pub fn classify(&self, domain: &str) -> ClassifiedDomain {
        let matched = self.matched_suffix(domain);
        ClassifiedDomain {
            observed: domain.to_string(),
            matched_suffix: matched.map(str::to_string),
            entity: matched
                .and_then(|suffix| self.index.entity(suffix))
                .map(str::to_string),
        }
    }

    /// Deduplicated entities behind `domains`, in first-seen order.
    pub fn tracker_entities<'d, I>(&self, domains: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'d str>,
    {
        let mut entities: Vec<&'a str> = Vec::new();
        for domain in domains {
            if let Some(entity) = self.entity(domain) {
                if !entities.contains(&entity) {
                    entities.push(entity);
                }
            }
        }
        entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> BlocklistIndex {
        BlocklistIndex::from_entries([
            ("doubleclick.net", "Google"),
            ("adnetwork.example", "Acme Ads"),
            ("pixel.social.example", "Social Co"),
        ])
    }

    #[test]
    fn test_exact_match() {
        let index = index();
        let classifier = DomainClassifier::new(&index);

        for domain in ["doubleclick.net", "adnetwork.example", "pixel.social.example"] {
            let result = classifier.classify(domain);
            assert_eq!(result.matched_suffix.as_deref(), Some(domain));
            assert!(result.is_tracker());
        }
    }

    #[test]
    fn test_suffix_stepping_resolves_entity() {
        let index = index();
        let classifier = DomainClassifier::new(&index);

        let result = classifier.classify("track.adnetwork.example");
        assert_eq!(result.matched_suffix.as_deref(), Some("adnetwork.example"));
        assert_eq!(result.entity.as_deref(), Some("Acme Ads"));

        let result = classifier.classify("a.b.c.stats.g.doubleclick.net");
        assert_eq!(result.matched_suffix.as_deref(), Some("doubleclick.net"));
        assert_eq!(result.entity.as_deref(), Some("Google"));

        assert!(!classifier.is_tracker("unrelated.example"));
        assert!(!classifier.is_tracker("social.example"));
        assert_eq!(classifier.entity("unrelated.example"), None);
    }

    #[test]
    fn test_strip_bound_without_collapse() {
        let index = index();
        let policy = SuffixPolicy {
            max_labels: usize::MAX,
            max_strips: 4,
        };
        let classifier = DomainClassifier::with_policy(&index, policy);

        // Four strips reach the entry.
        assert!(classifier.is_tracker("a.b.c.d.doubleclick.net"));
        // Five strips would be needed.
        assert!(!classifier.is_tracker("a.b.c.d.e.doubleclick.net"));
    }

    #[test]
    fn test_malformed_domains_never_match() {
        let index = index();
        let classifier = DomainClassifier::new(&index);

        for domain in ["", "localhost", ".", "...", "net"] {
            let result = classifier.classify(domain);
            assert_eq!(result.matched_suffix, None);
            assert_eq!(result.entity, None);
        }
    }

    #[test]
    fn test_classification_is_idempotent() {
        let index = index();
        let classifier = DomainClassifier::new(&index);
        let first = classifier.classify("ads.Track.AdNetwork.example");
        let second = classifier.classify("ads.Track.AdNetwork.example");
        assert_eq!(first, second);
        assert_eq!(first.entity.as_deref(), Some("Acme Ads"));
    }

    #[test]
    fn test_tracker_entities_dedup() {
        let index = index();
        let classifier = DomainClassifier::new(&index);
        let entities = classifier.tracker_entities([
            "x.adnetwork.example",
            "stats.g.doubleclick.net",
            "adnetwork.example",
            "unrelated.example",
        ]);
        assert_eq!(entities, vec!["Acme Ads", "Google"]);
    }

    #[test]
    fn test_first_level_domain() {
        assert_eq!(first_level_domain("www.example.com"), "example.com");
        assert_eq!(first_level_domain("a.b.bbc.co.uk"), "bbc.co.uk");
        assert_eq!(first_level_domain("example.com"), "example.com");
        assert_eq!(first_level_domain("www.abc.de"), "abc.de");
        assert_eq!(first_level_domain("Static.CDN.example.org."), "example.org");
    }

    #[test]
    fn test_host_of() {
        assert_eq!(
            host_of("https://Track.Example.com/pixel?id=1").as_deref(),
            Some("track.example.com")
        );
        assert_eq!(host_of("cdn.example.net").as_deref(), Some("cdn.example.net"));
        assert_eq!(host_of("data:text/plain,hello"), None);
    }

    #[test]
    fn test_has_valid_tld() {
        assert!(has_valid_tld("example.com"));
        assert!(!has_valid_tld("localhost"));
        assert!(!has_valid_tld("example.c0m"));
        assert!(!has_valid_tld("example."));
        assert!(has_valid_tld("shop.xn--e1afmkfd.xn--p1ai"));
        assert!(has_valid_tld("example.xn--80asehdb"));
        assert!(!has_valid_tld("example.xn--"));
        assert!(!has_valid_tld("example.xn--P1AI"));
    }
}
