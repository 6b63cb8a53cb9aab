use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

use crate::models::{AtsType, Candidate, Classification, SearchHit};

/// ATS patterns in priority order. The first pattern to match wins, so
/// specific hosts must stay ahead of the wildcard-subdomain ones.
const ATS_PATTERNS: &[(AtsType, &[&str])] = &[
    (
        AtsType::Greenhouse,
        &[r"boards\.greenhouse\.io/(\w+)", r"job-boards\.greenhouse\.io/(\w+)"],
    ),
    (AtsType::Lever, &[r"jobs\.lever\.co/(\w+)"]),
    (AtsType::Workable, &[r"apply\.workable\.com/(\w+)", r"(\w+)\.workable\.com"]),
    (AtsType::Ashby, &[r"jobs\.ashbyhq\.com/(\w+)"]),
    (AtsType::BambooHr, &[r"(\w+)\.bamboohr\.com/jobs"]),
    (AtsType::Jobvite, &[r"jobs\.jobvite\.com/(\w+)"]),
    (AtsType::SmartRecruiters, &[r"jobs\.smartrecruiters\.com/(\w+)"]),
    (AtsType::Wellfound, &[r"wellfound\.com/company/(\w+)"]),
];

const CAREERS_PATTERN: &str = r"/careers?(/|$|\?)|/jobs?(/|$|\?)";

/// Aggregators and social sites; excluded even when a careers path matches.
const SKIP_DOMAINS: &[&str] = &[
    "linkedin.com",
    "facebook.com",
    "twitter.com",
    "instagram.com",
    "youtube.com",
    "reddit.com",
    "news.ycombinator.com",
    "glassdoor.com",
    "indeed.com",
];

const SKIP_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".png", ".jpg"];

fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

static COMPILED: LazyLock<Vec<(AtsType, Vec<Regex>)>> = LazyLock::new(|| {
    ATS_PATTERNS
        .iter()
        .map(|(ats, patterns)| (*ats, patterns.iter().map(|p| case_insensitive(p)).collect()))
        .collect()
});

static CAREERS: LazyLock<Regex> = LazyLock::new(|| case_insensitive(CAREERS_PATTERN));

pub fn classify(url: &str) -> Classification {
    for (ats, patterns) in COMPILED.iter() {
        for pattern in patterns {
            if let Some(caps) = pattern.captures(url) {
                return Classification {
                    ats_type: *ats,
                    company_slug: caps.get(1).map(|m| m.as_str().to_string()),
                    is_job_board: true,
                };
            }
        }
    }

    if CAREERS.is_match(url) {
        return Classification {
            ats_type: AtsType::CareersPage,
            company_slug: host_slug(url),
            is_job_board: false,
        };
    }

    Classification::unknown()
}

/// `https://www.acme.io/careers` -> `acme`
fn host_slug(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    host.split('.')
        .next()
        .filter(|label| !label.is_empty())
        .map(str::to_string)
}

pub fn is_skipped(url: &str) -> bool {
    let lower = url.to_lowercase();
    SKIP_DOMAINS.iter().any(|domain| lower.contains(domain))
        || SKIP_EXTENSIONS.iter().any(|ext| lower.contains(ext))
}

/// Drops deny-listed URLs, classifies the rest, and keeps the recognized ones.
/// Input order is preserved.
pub fn filter_urls(items: Vec<SearchHit>) -> Vec<Candidate> {
    items
        .into_iter()
        .filter(|hit| !is_skipped(&hit.url))
        .filter_map(|hit| {
            let classification = classify(&hit.url);
            if classification.ats_type == AtsType::Unknown {
                None
            } else {
                Some(Candidate { hit, classification })
            }
        })
        .collect()
}
