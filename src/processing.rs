use anyhow::{Context, Result};
use serde_json::json;
use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;

use crate::ai::{ApplicationWriter, DescriptionAnalyzer};
use crate::classifier::classify;
use crate::config::ProcessingConfig;
use crate::db::{now_timestamp, Database};
use crate::documents::DocumentWriter;
use crate::models::{
    job_id_for_url, ArtifactPaths, CandidateProfile, Classification, Job, JobAnalysis, JobStatus,
    TailoredResume,
};
use crate::scoring::score;
use crate::scrape::JobScraper;

/// Marks its URL processed when dropped, so every exit path (early return,
/// `?`, panic) leaves the URL attempted.
struct ProcessedGuard<'a> {
    db: &'a Database,
    url: &'a str,
}

impl Drop for ProcessedGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.db.mark_processed(self.url) {
            tracing::error!("Failed to mark {} processed: {:#}", self.url, e);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    NoDetails,
    TitleMismatch(String),
    LowScore(f64),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoDetails => write!(f, "no job details"),
            Rejection::TitleMismatch(title) => write!(f, "title mismatch: {}", title),
            Rejection::LowScore(s) => write!(f, "low match {:.0}%", s * 100.0),
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Accepted(Job),
    Rejected(Rejection),
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub discovered: usize,
    pub processed: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub errored: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "discovered {}, processed {}, accepted {}, rejected {}, errored {}",
            self.discovered, self.processed, self.accepted, self.rejected, self.errored
        )
    }
}

/// Deny-list first, then at least one target role. Case-insensitive substrings.
pub fn title_matches(title: &str, settings: &ProcessingConfig) -> bool {
    let title = title.to_lowercase();
    let contains = |needle: &String| {
        let needle = needle.trim().to_lowercase();
        !needle.is_empty() && title.contains(&needle)
    };
    if settings.exclude_keywords.iter().any(contains) {
        return false;
    }
    settings.target_roles.iter().any(contains)
}

/// The external services a run talks to.
pub struct Collaborators<'a> {
    pub scraper: &'a dyn JobScraper,
    pub analyzer: &'a dyn DescriptionAnalyzer,
    pub writer: &'a dyn ApplicationWriter,
    pub documents: &'a dyn DocumentWriter,
}

pub struct Processor<'a> {
    db: &'a Database,
    services: Collaborators<'a>,
    profile: &'a CandidateProfile,
    settings: &'a ProcessingConfig,
    output_dir: PathBuf,
}

impl<'a> Processor<'a> {
    pub fn new(
        db: &'a Database,
        services: Collaborators<'a>,
        profile: &'a CandidateProfile,
        settings: &'a ProcessingConfig,
        output_dir: &Path,
    ) -> Self {
        Self {
            db,
            services,
            profile,
            settings,
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Works through up to `limit` pending URLs, newest first. Per-item
    /// failures are counted, never propagated.
    pub fn run(&self, limit: usize) -> Result<RunSummary> {
        let pending = self.db.list_unprocessed(limit)?;
        tracing::info!("Processing {} pending URLs...", pending.len());

        let mut summary = RunSummary::default();
        for (i, item) in pending.iter().enumerate() {
            if i > 0 && !self.settings.item_delay().is_zero() {
                thread::sleep(self.settings.item_delay());
            }

            let _guard = ProcessedGuard {
                db: self.db,
                url: &item.url,
            };
            summary.processed += 1;
            match self.process_url(&item.url, &item.classification) {
                Ok(Outcome::Accepted(_)) => summary.accepted += 1,
                Ok(Outcome::Rejected(_)) => summary.rejected += 1,
                Err(e) => {
                    tracing::error!("Error processing {}: {:#}", item.url, e);
                    summary.errored += 1;
                }
            }
        }

        tracing::info!("Processed {} URLs, {} accepted", summary.processed, summary.accepted);
        Ok(summary)
    }

    /// Classifies, records and processes one URL outside the pending queue.
    pub fn process_single(&self, url: &str) -> Result<Outcome> {
        let classification = classify(url);
        self.db.record_discovery(url, &classification)?;
        let _guard = ProcessedGuard { db: self.db, url };
        self.process_url(url, &classification)
    }

    fn process_url(&self, url: &str, classification: &Classification) -> Result<Outcome> {
        tracing::info!("Processing: {}", url);

        let Some(details) = self.services.scraper.get_job(url, classification.ats_type) else {
            return Ok(self.reject(Rejection::NoDetails));
        };
        if details.description.trim().is_empty() {
            return Ok(self.reject(Rejection::NoDetails));
        }

        if !title_matches(&details.title, self.settings) {
            return Ok(self.reject(Rejection::TitleMismatch(details.title)));
        }

        let analysis = self.services.analyzer.analyze(&details.description);
        let match_score = score(analysis.as_ref(), self.profile);
        if match_score < self.settings.min_match_score {
            return Ok(self.reject(Rejection::LowScore(match_score)));
        }
        let analysis = analysis.unwrap_or_default();

        let company = classification
            .company_slug
            .clone()
            .unwrap_or_else(|| "Unknown".to_string());
        tracing::info!("Match {:.0}%: {} at {}", match_score * 100.0, details.title, company);

        let mut job = Job {
            id: job_id_for_url(url),
            title: details.title,
            company,
            url: url.to_string(),
            location: details.location,
            description: details.description,
            requirements: analysis.required_skills.clone(),
            keywords: analysis.keywords.clone(),
            discovered_at: now_timestamp(),
            match_score,
            source: classification.ats_type.as_str().to_string(),
            status: JobStatus::New,
        };

        let job_dir = self.output_dir.join(&job.id);
        std::fs::create_dir_all(&job_dir)
            .with_context(|| format!("Failed to create {}", job_dir.display()))?;

        let (tailored, artifacts) = self.prepare_application(&job, &analysis, &job_dir);
        if !artifacts.is_empty() {
            job.status = JobStatus::Tailored;
        }
        self.save_analysis(&job, &analysis, tailored.as_ref(), &job_dir);

        self.db.upsert_job(&job, &artifacts)?;
        tracing::info!("Processed: {} at {}", job.title, job.company);
        Ok(Outcome::Accepted(job))
    }

    fn reject(&self, reason: Rejection) -> Outcome {
        match &reason {
            Rejection::NoDetails => tracing::warn!("Skipping ({})", reason),
            _ => tracing::info!("Skipping ({})", reason),
        }
        Outcome::Rejected(reason)
    }

    /// Tailored resume and cover letter. A document that fails to render is
    /// logged and left out of the artifact paths.
    fn prepare_application(
        &self,
        job: &Job,
        analysis: &JobAnalysis,
        job_dir: &Path,
    ) -> (Option<TailoredResume>, ArtifactPaths) {
        let mut artifacts = ArtifactPaths::default();
        let ext = self.services.documents.extension();

        let tailored = self
            .services
            .writer
            .tailor_resume(self.profile, analysis, &job.title, &job.company);
        if let Some(content) = &tailored {
            let path = job_dir.join(format!("resume_{}_{}.{}", job.company, job.id, ext));
            match self.services.documents.write_resume(content, self.profile, &path) {
                Ok(()) => {
                    tracing::info!("  Created resume: {}", path.display());
                    artifacts.resume = Some(path);
                }
                Err(e) => tracing::error!("Resume not written: {:#}", e),
            }
        }

        let letter = self
            .services
            .writer
            .cover_letter(self.profile, analysis, &job.title, &job.company);
        if let Some(letter) = letter {
            let path = job_dir.join(format!("cover_letter_{}_{}.{}", job.company, job.id, ext));
            match self.services.documents.write_cover_letter(
                &letter,
                self.profile,
                &job.title,
                &job.company,
                &path,
            ) {
                Ok(()) => {
                    tracing::info!("  Created cover letter: {}", path.display());
                    artifacts.cover_letter = Some(path);
                }
                Err(e) => tracing::error!("Cover letter not written: {:#}", e),
            }
        }

        (tailored, artifacts)
    }

    fn save_analysis(&self, job: &Job, analysis: &JobAnalysis, tailored: Option<&TailoredResume>, job_dir: &Path) {
        let record = json!({
            "job": job,
            "analysis": analysis,
            "tailored": tailored,
        });
        let path = job_dir.join("analysis.json");
        let written = serde_json::to_string_pretty(&record)
            .map_err(anyhow::Error::from)
            .and_then(|body| std::fs::write(&path, body).map_err(anyhow::Error::from));
        if let Err(e) = written {
            tracing::warn!("Failed to save {}: {:#}", path.display(), e);
        }
    }
}
