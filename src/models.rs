use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// One raw result from a search backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    pub source: String, // "google_cse", "serpapi", "google_direct"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtsType {
    Greenhouse,
    Lever,
    Workable,
    Ashby,
    #[serde(rename = "bamboohr")]
    BambooHr,
    Jobvite,
    #[serde(rename = "smartrecruiters")]
    SmartRecruiters,
    Wellfound,
    CareersPage,
    Unknown,
}

impl AtsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AtsType::Greenhouse => "greenhouse",
            AtsType::Lever => "lever",
            AtsType::Workable => "workable",
            AtsType::Ashby => "ashby",
            AtsType::BambooHr => "bamboohr",
            AtsType::Jobvite => "jobvite",
            AtsType::SmartRecruiters => "smartrecruiters",
            AtsType::Wellfound => "wellfound",
            AtsType::CareersPage => "careers_page",
            AtsType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AtsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AtsType {
    type Err = std::convert::Infallible;

    /// Unrecognized names map to `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "greenhouse" => AtsType::Greenhouse,
            "lever" => AtsType::Lever,
            "workable" => AtsType::Workable,
            "ashby" => AtsType::Ashby,
            "bamboohr" => AtsType::BambooHr,
            "jobvite" => AtsType::Jobvite,
            "smartrecruiters" => AtsType::SmartRecruiters,
            "wellfound" => AtsType::Wellfound,
            "careers_page" => AtsType::CareersPage,
            _ => AtsType::Unknown,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "type")]
    pub ats_type: AtsType,
    pub company_slug: Option<String>,
    pub is_job_board: bool,
}

impl Classification {
    pub fn unknown() -> Self {
        Self {
            ats_type: AtsType::Unknown,
            company_slug: None,
            is_job_board: false,
        }
    }
}

/// A search hit that survived filtering, with its classification attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(flatten)]
    pub hit: SearchHit,
    pub classification: Classification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredUrl {
    pub url: String,
    pub discovered_at: String,
    pub classification: Classification,
    pub processed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    New,
    Tailored,
    Applied,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Tailored => "tailored",
            JobStatus::Applied => "applied",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "new" => Ok(JobStatus::New),
            "tailored" => Ok(JobStatus::Tailored),
            "applied" => Ok(JobStatus::Applied),
            other => Err(anyhow::anyhow!("Unknown job status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub title: String,
    pub company: String,
    pub url: String,
    pub location: String,
    pub description: String,
    pub requirements: Vec<String>,
    pub keywords: Vec<String>,
    pub discovered_at: String,
    pub match_score: f64,
    pub source: String,
    pub status: JobStatus,
}

/// Stable job id: the first 12 hex chars of the URL's SHA-256.
pub fn job_id_for_url(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactPaths {
    pub resume: Option<PathBuf>,
    pub cover_letter: Option<PathBuf>,
}

impl ArtifactPaths {
    pub fn is_empty(&self) -> bool {
        self.resume.is_none() && self.cover_letter.is_none()
    }
}

/// What a scraper pulls out of a posting page.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDetails {
    pub title: String,
    pub location: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteType {
    FullyRemote,
    Hybrid,
    Onsite,
    #[serde(other)]
    Unclear,
}

/// Structured read of a job description. A reply naming no skills is still a
/// valid analysis; failures are represented by its absence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobAnalysis {
    pub required_skills: Vec<String>,
    pub preferred_skills: Vec<String>,
    pub keywords: Vec<String>,
    pub remote_type: Option<RemoteType>,
    #[serde(deserialize_with = "lenient_string")]
    pub experience_years: Option<String>,
    pub red_flags: Vec<String>,
}

// Models answer "3-5" as often as 3.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Experience {
    pub title: String,
    pub company: String,
    pub dates: String,
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Education {
    pub degree: String,
    pub school: String,
    pub year: String,
}

/// The candidate's master resume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateProfile {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub location: String,
    pub summary: String,
    pub experience: Vec<Experience>,
    pub education: Vec<Education>,
    pub skills: Vec<String>,
    pub certifications: Vec<String>,
}

/// Resume content rewritten for one posting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TailoredResume {
    pub summary: String,
    pub experience: Vec<Experience>,
    pub skills: Vec<String>,
}

impl TailoredResume {
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty() && self.experience.is_empty() && self.skills.is_empty()
    }
}
