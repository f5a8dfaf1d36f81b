//! Cookie attributes and lifespan normalization.
//!
//! Cookies arrive either as attribute maps recorded by the crawler or as raw
//! `Set-Cookie` header values. Their lifespan comes from `Max-Age` when it is
//! numeric, otherwise from `Expires`, whose wire format varies between servers
//! (`Wed, 21 Oct 2099 07:28:00 GMT`, `Wednesday, 21-Oct-99 07:28:00 GMT`, ...).

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{Error, Result};

const SESSION_EXPIRES: &str = "Session";

/// Typed view of one cookie. Attribute names are matched case-insensitively;
/// anything unrecognized lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CookieAttributes {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub max_age: Option<String>,
    pub expires: Option<String>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl CookieAttributes {
    /// Build from ordered `(key, value)` pairs; the first pair is the cookie
    /// name and value. Returns `None` for an empty sequence.
    pub fn from_pairs<I, K, V>(pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut pairs = pairs.into_iter();
        let (name, value) = pairs.next()?;
        let mut cookie = CookieAttributes {
            name: name.as_ref().to_string(),
            value: value.into(),
            ..Default::default()
        };

        for (key, value) in pairs {
            let key = key.as_ref();
            let value: String = value.into();
            match key.to_ascii_lowercase().as_str() {
                "domain" => cookie.domain = Some(value),
                "path" => cookie.path = Some(value),
                "max-age" => cookie.max_age = Some(value),
                "expires" => cookie.expires = Some(value),
                "httponly" => cookie.http_only = !value.eq_ignore_ascii_case("false"),
                "secure" => cookie.secure = !value.eq_ignore_ascii_case("false"),
                "samesite" => cookie.same_site = Some(value),
                _ => {
                    cookie.extra.insert(key.to_string(), value);
                }
            }
        }
        Some(cookie)
    }

    /// Parse a single `Set-Cookie` header value.
    pub fn parse_set_cookie(header: &str) -> Option<Self> {
        let pairs = header
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => (part, ""),
            });
        Self::from_pairs(pairs)
    }

    /// Convert a recorded attribute map. Scalar values are stringified.
    pub fn from_json_object(map: &Map<String, Value>) -> Option<Self> {
        Self::from_pairs(map.iter().map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, value)
        }))
    }
}

/// Attribute a lifespan was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifespanSource {
    MaxAge,
    Expires,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Lifespan {
    pub seconds: f64,
    pub source: LifespanSource,
}

/// Accepted `Expires` layouts, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiresFormat {
    FourDigitYear,
    TwoDigitYear,
}

impl ExpiresFormat {
    pub const ORDERED: [ExpiresFormat; 2] = [ExpiresFormat::FourDigitYear, ExpiresFormat::TwoDigitYear];

    fn year_digits(self) -> usize {
        match self {
            ExpiresFormat::FourDigitYear => 4,
            ExpiresFormat::TwoDigitYear => 2,
        }
    }

    fn pattern(self) -> &'static str {
        match self {
            ExpiresFormat::FourDigitYear => "%d%b%Y %H:%M:%S",
            ExpiresFormat::TwoDigitYear => "%d%b%y %H:%M:%S",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedExpires {
    Parsed {
        at: DateTime<Utc>,
        format: ExpiresFormat,
    },
    Unparseable,
}

/// Canonical compact form `Wkd,ddMonYYYYHH:MM:SS` of an `Expires` value.
pub fn normalize_expires(raw: &str) -> String {
    let mut compact: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '-' && *c != ' ')
        .collect();

    // Full weekday names are cut down to their abbreviation.
    if compact.chars().count() >= 24 {
        if let Some(comma) = compact.find(',') {
            if comma > 3 && compact.is_char_boundary(3) {
                compact = format!("{}{}", &compact[..3], &compact[comma..]);
            }
        }
    }

    // A timezone name trails the seconds when the last four characters hold no colon.
    if compact.is_ascii() && compact.len() >= 4 && !compact[compact.len() - 4..].contains(':') {
        if let Some(last_colon) = compact.rfind(':') {
            let seconds_end = last_colon + 3;
            if seconds_end < compact.len() {
                compact.truncate(seconds_end);
            }
        }
    }

    compact
}

pub fn parse_expires(raw: &str) -> ParsedExpires {
    let normalized = normalize_expires(raw);
    // The weekday is redundant with the date and is not cross-checked.
    let body = normalized
        .split_once(',')
        .map_or(normalized.as_str(), |(_, rest)| rest);

    if !body.is_ascii() {
        return ParsedExpires::Unparseable;
    }
    let Some(colon) = body.find(':') else {
        return ParsedExpires::Unparseable;
    };

    // With spaces stripped the year and hour share one digit run. The year is
    // two or four digits and the hour one or two, so the run length decides.
    let run = body[..colon]
        .bytes()
        .rev()
        .take_while(u8::is_ascii_digit)
        .count();
    let year_digits = if run >= 5 { 4 } else { 2 };
    let hour_digits = run.saturating_sub(year_digits);
    if !(1..=2).contains(&hour_digits) {
        return ParsedExpires::Unparseable;
    }
    let (date, time_of_day) = body.split_at(colon - hour_digits);
    let candidate = format!("{date} {time_of_day:0>8}");

    for format in ExpiresFormat::ORDERED {
        if format.year_digits() != year_digits {
            continue;
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(&candidate, format.pattern()) {
            return ParsedExpires::Parsed {
                at: naive.and_utc(),
                format,
            };
        }
    }
    ParsedExpires::Unparseable
}

/// Seconds until `cookie` expires, relative to `now`.
///
/// `Ok(None)` marks a session cookie. An `Expires` value that matches none of
/// the accepted formats is an error for this cookie only.
pub fn lifespan_seconds(cookie: &CookieAttributes, now: DateTime<Utc>) -> Result<Option<Lifespan>> {
    if let Some(max_age) = cookie.max_age.as_deref() {
        if let Ok(seconds) = max_age.trim().parse::<f64>() {
            if seconds.is_finite() {
                return Ok(Some(Lifespan {
                    seconds,
                    source: LifespanSource::MaxAge,
                }));
            }
        }
    }

    let Some(expires) = cookie.expires.as_deref() else {
        return Ok(None);
    };
    if expires.trim() == SESSION_EXPIRES {
        return Ok(None);
    }

    match parse_expires(expires) {
        ParsedExpires::Parsed { at, .. } => {
            let now = now.trunc_subsecs(0);
            Ok(Some(Lifespan {
                seconds: (at - now).num_seconds() as f64,
                source: LifespanSource::Expires,
            }))
        }
        ParsedExpires::Unparseable => Err(Error::Expires {
            raw: expires.to_string(),
        }),
    }
}

/// One ranked cookie lifespan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifespanResult {
    pub age_seconds: f64,
    pub source: LifespanSource,
    pub owner_index: usize,
    pub cookie_index: usize,
}

/// The `k` longest-lived cookies across `owners`, longest first. Equal
/// lifespans keep encounter order. Cookies with unparseable dates are skipped.
pub fn longest_lived<'c, I>(owners: I, k: usize, now: DateTime<Utc>) -> Vec<LifespanResult>
where
    I: IntoIterator<Item = (usize, &'c [CookieAttributes])>,
{
    let mut results = Vec::new();
    for (owner_index, cookies) in owners {
        for (cookie_index, cookie) in cookies.iter().enumerate() {
            match lifespan_seconds(cookie, now) {
                Ok(Some(lifespan)) => results.push(LifespanResult {
                    age_seconds: lifespan.seconds,
                    source: lifespan.source,
                    owner_index,
                    cookie_index,
                }),
                Ok(None) => {}
                Err(e) => {
                    warn!(action = "parse", component = "cookie_lifespan", owner_index, cookie_index, error = %e, "Excluding cookie from lifespan ranking");
                }
            }
        }
    }

    results.sort_by(|a, b| b.age_seconds.total_cmp(&a.age_seconds));
    results.truncate(k);
    results
}
