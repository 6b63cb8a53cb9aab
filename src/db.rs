use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use crate::models::{ArtifactPaths, Candidate, Classification, DiscoveredUrl, Job, JobStatus};

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

#[derive(Debug, Default, PartialEq)]
pub struct StoreStats {
    pub total_jobs: i64,
    pub pending_urls: i64,
    pub processed_urls: i64,
}

/// A stored job plus where its documents were written.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job: Job,
    pub resume_path: Option<String>,
    pub cover_letter_path: Option<String>,
    pub applied_at: Option<String>,
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        let db = Self {
            conn,
            path: path.to_path_buf(),
        };
        db.init()?;
        Ok(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS discovered_urls (
                url TEXT PRIMARY KEY,
                discovered_at TEXT NOT NULL,
                classification TEXT NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                location TEXT,
                description TEXT,
                requirements TEXT NOT NULL DEFAULT '[]',
                keywords TEXT NOT NULL DEFAULT '[]',
                discovered_at TEXT NOT NULL,
                match_score REAL NOT NULL,
                source TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'new' CHECK (status IN ('new', 'tailored', 'applied')),
                resume_path TEXT,
                cover_letter_path TEXT,
                applied_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_discovered_pending ON discovered_urls(processed, discovered_at);
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            "#,
        )?;
        Ok(())
    }

    // --- Discovered URL operations ---

    pub fn has_seen(&self, url: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM discovered_urls WHERE url = ?1", [url], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Inserts the URL unless it is already known. Returns whether a row was added;
    /// an existing row keeps its original timestamp and processed flag.
    pub fn record_discovery(&self, url: &str, classification: &Classification) -> Result<bool> {
        let classification_json = serde_json::to_string(classification)?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO discovered_urls (url, discovered_at, classification)
             VALUES (?1, ?2, ?3)",
            params![url, now_timestamp(), classification_json],
        )?;
        Ok(inserted > 0)
    }

    /// Records every candidate not seen before. Returns how many were new.
    pub fn record_candidates(&self, candidates: &[Candidate]) -> Result<usize> {
        let mut new_count = 0;
        for candidate in candidates {
            if self.record_discovery(&candidate.hit.url, &candidate.classification)? {
                new_count += 1;
            }
        }
        Ok(new_count)
    }

    pub fn get_discovered(&self, url: &str) -> Result<Option<DiscoveredUrl>> {
        self.conn
            .query_row(
                "SELECT url, discovered_at, classification, processed FROM discovered_urls WHERE url = ?1",
                [url],
                Self::row_to_discovered,
            )
            .optional()
            .context("Failed to load discovered URL")
    }

    pub fn is_processed(&self, url: &str) -> Result<bool> {
        Ok(self.get_discovered(url)?.is_some_and(|d| d.processed))
    }

    /// Newest discoveries first; rows sharing a timestamp come back newest-inserted first.
    pub fn list_unprocessed(&self, limit: usize) -> Result<Vec<DiscoveredUrl>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, discovered_at, classification, processed FROM discovered_urls
             WHERE processed = 0
             ORDER BY discovered_at DESC, rowid DESC
             LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map([limit], Self::row_to_discovered)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list unprocessed URLs")
    }

    /// One-way: there is no operation that clears the flag.
    pub fn mark_processed(&self, url: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE discovered_urls SET processed = 1 WHERE url = ?1",
            [url],
        )?;
        Ok(())
    }

    fn row_to_discovered(row: &rusqlite::Row) -> rusqlite::Result<DiscoveredUrl> {
        let classification_json: String = row.get(2)?;
        let classification = serde_json::from_str(&classification_json)
            .unwrap_or_else(|_| Classification::unknown());
        Ok(DiscoveredUrl {
            url: row.get(0)?,
            discovered_at: row.get(1)?,
            classification,
            processed: row.get::<_, i64>(3)? != 0,
        })
    }

    // --- Job operations ---

    /// Insert or replace keyed by job id. An applied job stays applied, with
    /// its `applied_at`, when it is processed again.
    pub fn upsert_job(&self, job: &Job, artifacts: &ArtifactPaths) -> Result<()> {
        let path_str = |p: &Option<PathBuf>| p.as_ref().map(|p| p.display().to_string());
        self.conn.execute(
            "INSERT INTO jobs
                (id, title, company, url, location, description, requirements, keywords,
                 discovered_at, match_score, source, status, resume_path, cover_letter_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                company = excluded.company,
                url = excluded.url,
                location = excluded.location,
                description = excluded.description,
                requirements = excluded.requirements,
                keywords = excluded.keywords,
                discovered_at = excluded.discovered_at,
                match_score = excluded.match_score,
                source = excluded.source,
                status = CASE WHEN jobs.status = 'applied' THEN jobs.status ELSE excluded.status END,
                resume_path = excluded.resume_path,
                cover_letter_path = excluded.cover_letter_path",
            params![
                job.id,
                job.title,
                job.company,
                job.url,
                job.location,
                job.description,
                serde_json::to_string(&job.requirements)?,
                serde_json::to_string(&job.keywords)?,
                job.discovered_at,
                job.match_score,
                job.source,
                job.status.as_str(),
                path_str(&artifacts.resume),
                path_str(&artifacts.cover_letter),
            ],
        )?;
        Ok(())
    }

    pub fn get_job(&self, id: &str) -> Result<Option<JobRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                [id],
                Self::row_to_job,
            )
            .optional()
            .context("Failed to load job")
    }

    pub fn count_jobs(&self) -> Result<i64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?)
    }

    pub fn top_matches(&self, status: JobStatus, limit: usize) -> Result<Vec<JobRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM jobs WHERE status = ?1 ORDER BY match_score DESC, title LIMIT ?2",
            JOB_COLUMNS
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![status.as_str(), limit], Self::row_to_job)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list top matches")
    }

    pub fn set_job_status(&self, id: &str, status: JobStatus) -> Result<()> {
        let applied_at = (status == JobStatus::Applied).then(now_timestamp);
        let updated = self.conn.execute(
            "UPDATE jobs SET status = ?1, applied_at = COALESCE(?2, applied_at) WHERE id = ?3",
            params![status.as_str(), applied_at, id],
        )?;
        if updated == 0 {
            return Err(anyhow!("Job {} not found", id));
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let (pending, processed): (i64, i64) = self.conn.query_row(
            "SELECT COALESCE(SUM(processed = 0), 0), COALESCE(SUM(processed = 1), 0) FROM discovered_urls",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(StoreStats {
            total_jobs: self.count_jobs()?,
            pending_urls: pending,
            processed_urls: processed,
        })
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<JobRecord> {
        let list = |idx: usize| -> rusqlite::Result<Vec<String>> {
            let raw: String = row.get(idx)?;
            Ok(serde_json::from_str(&raw).unwrap_or_default())
        };
        let status: String = row.get(11)?;
        Ok(JobRecord {
            job: Job {
                id: row.get(0)?,
                title: row.get(1)?,
                company: row.get(2)?,
                url: row.get(3)?,
                location: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                description: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                requirements: list(6)?,
                keywords: list(7)?,
                discovered_at: row.get(8)?,
                match_score: row.get(9)?,
                source: row.get(10)?,
                status: status.parse().unwrap_or(JobStatus::New),
            },
            resume_path: row.get(12)?,
            cover_letter_path: row.get(13)?,
            applied_at: row.get(14)?,
        })
    }
}

const JOB_COLUMNS: &str = "id, title, company, url, location, description, requirements, keywords, \
    discovered_at, match_score, source, status, resume_path, cover_letter_path, applied_at";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{job_id_for_url, AtsType, SearchHit};

    fn greenhouse(slug: &str) -> Classification {
        Classification {
            ats_type: AtsType::Greenhouse,
            company_slug: Some(slug.to_string()),
            is_job_board: true,
        }
    }

    fn job(url: &str, score: f64) -> Job {
        Job {
            id: job_id_for_url(url),
            title: "Product Manager".to_string(),
            company: "acme".to_string(),
            url: url.to_string(),
            location: "Remote".to_string(),
            description: "Build things".to_string(),
            requirements: vec!["sql".to_string()],
            keywords: vec!["roadmap".to_string()],
            discovered_at: now_timestamp(),
            match_score: score,
            source: "greenhouse".to_string(),
            status: JobStatus::New,
        }
    }

    #[test]
    fn test_record_discovery_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let url = "https://boards.greenhouse.io/acme/jobs/1";

        assert!(!db.has_seen(url).unwrap());
        assert!(db.record_discovery(url, &greenhouse("acme")).unwrap());
        let first = db.get_discovered(url).unwrap().unwrap();

        assert!(!db.record_discovery(url, &Classification::unknown()).unwrap());
        let second = db.get_discovered(url).unwrap().unwrap();

        assert!(db.has_seen(url).unwrap());
        assert_eq!(first.discovered_at, second.discovered_at);
        assert_eq!(second.classification, greenhouse("acme"));
        assert_eq!(db.stats().unwrap().pending_urls, 1);
    }

    #[test]
    fn test_mark_processed_is_monotonic() {
        let db = Database::open_in_memory().unwrap();
        let url = "https://jobs.lever.co/acme/1";
        db.record_discovery(url, &greenhouse("acme")).unwrap();

        db.mark_processed(url).unwrap();
        db.mark_processed(url).unwrap();
        assert!(db.is_processed(url).unwrap());

        // Rediscovery must not reset the flag.
        db.record_discovery(url, &greenhouse("acme")).unwrap();
        assert!(db.is_processed(url).unwrap());
        assert!(db.has_seen(url).unwrap());
        assert!(db.list_unprocessed(10).unwrap().is_empty());
    }

    #[test]
    fn test_mark_processed_unknown_url_is_noop() {
        let db = Database::open_in_memory().unwrap();
        db.mark_processed("https://nowhere.example/jobs").unwrap();
        assert!(!db.has_seen("https://nowhere.example/jobs").unwrap());
    }

    #[test]
    fn test_list_unprocessed_newest_first() {
        let db = Database::open_in_memory().unwrap();
        for i in 1..=4 {
            db.record_discovery(&format!("https://jobs.lever.co/acme/{i}"), &greenhouse("acme"))
                .unwrap();
        }
        db.mark_processed("https://jobs.lever.co/acme/3").unwrap();

        let pending = db.list_unprocessed(10).unwrap();
        let urls: Vec<&str> = pending.iter().map(|d| d.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://jobs.lever.co/acme/4",
                "https://jobs.lever.co/acme/2",
                "https://jobs.lever.co/acme/1",
            ]
        );
        assert!(pending.iter().all(|d| !d.processed));
        assert_eq!(db.list_unprocessed(1).unwrap().len(), 1);
    }

    #[test]
    fn test_record_candidates_counts_new_only() {
        let db = Database::open_in_memory().unwrap();
        let candidate = |url: &str| Candidate {
            hit: SearchHit {
                title: "PM".to_string(),
                url: url.to_string(),
                snippet: String::new(),
                source: "stub".to_string(),
            },
            classification: greenhouse("acme"),
        };
        db.record_discovery("https://boards.greenhouse.io/acme/jobs/1", &greenhouse("acme"))
            .unwrap();
        let new = db
            .record_candidates(&[
                candidate("https://boards.greenhouse.io/acme/jobs/1"),
                candidate("https://boards.greenhouse.io/acme/jobs/2"),
            ])
            .unwrap();
        assert_eq!(new, 1);
    }

    #[test]
    fn test_upsert_job_replaces_by_id() {
        let db = Database::open_in_memory().unwrap();
        let url = "https://boards.greenhouse.io/acme/jobs/1";

        db.upsert_job(&job(url, 0.6), &ArtifactPaths::default()).unwrap();
        let artifacts = ArtifactPaths {
            resume: Some(PathBuf::from("/tmp/out/resume.md")),
            cover_letter: None,
        };
        let mut updated = job(url, 0.9);
        updated.status = JobStatus::Tailored;
        db.upsert_job(&updated, &artifacts).unwrap();

        assert_eq!(db.count_jobs().unwrap(), 1);
        let record = db.get_job(&job_id_for_url(url)).unwrap().unwrap();
        assert_eq!(record.job.match_score, 0.9);
        assert_eq!(record.job.status, JobStatus::Tailored);
        assert_eq!(record.job.requirements, vec!["sql"]);
        assert_eq!(record.resume_path.as_deref(), Some("/tmp/out/resume.md"));
        assert_eq!(record.cover_letter_path, None);
    }

    #[test]
    fn test_set_job_status_applied_stamps_time() {
        let db = Database::open_in_memory().unwrap();
        let url = "https://jobs.lever.co/acme/1";
        let id = job_id_for_url(url);
        db.upsert_job(&job(url, 0.7), &ArtifactPaths::default()).unwrap();

        db.set_job_status(&id, JobStatus::Applied).unwrap();
        let record = db.get_job(&id).unwrap().unwrap();
        assert_eq!(record.job.status, JobStatus::Applied);
        assert!(record.applied_at.is_some());

        assert!(db.set_job_status("missing", JobStatus::Applied).is_err());
    }

    #[test]
    fn test_reprocessing_keeps_applied_status() {
        let db = Database::open_in_memory().unwrap();
        let url = "https://jobs.lever.co/acme/1";
        let id = job_id_for_url(url);
        db.upsert_job(&job(url, 0.7), &ArtifactPaths::default()).unwrap();
        db.set_job_status(&id, JobStatus::Applied).unwrap();
        let applied_at = db.get_job(&id).unwrap().unwrap().applied_at;

        db.upsert_job(&job(url, 0.8), &ArtifactPaths::default()).unwrap();
        let record = db.get_job(&id).unwrap().unwrap();
        assert_eq!(record.job.status, JobStatus::Applied);
        assert_eq!(record.job.match_score, 0.8);
        assert!(applied_at.is_some());
        assert_eq!(record.applied_at, applied_at);
    }

    #[test]
    fn test_top_matches_orders_by_score() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_job(&job("https://jobs.lever.co/a/1", 0.55), &ArtifactPaths::default()).unwrap();
        db.upsert_job(&job("https://jobs.lever.co/a/2", 0.95), &ArtifactPaths::default()).unwrap();
        db.upsert_job(&job("https://jobs.lever.co/a/3", 0.75), &ArtifactPaths::default()).unwrap();

        let top = db.top_matches(JobStatus::New, 2).unwrap();
        let scores: Vec<f64> = top.iter().map(|r| r.job.match_score).collect();
        assert_eq!(scores, vec![0.95, 0.75]);
    }

    #[test]
    fn test_stats_counts() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.stats().unwrap(), StoreStats::default());
        db.record_discovery("https://jobs.lever.co/a/1", &greenhouse("a")).unwrap();
        db.record_discovery("https://jobs.lever.co/a/2", &greenhouse("a")).unwrap();
        db.mark_processed("https://jobs.lever.co/a/1").unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.pending_urls, 1);
        assert_eq!(stats.processed_urls, 1);
        assert_eq!(stats.total_jobs, 0);
    }
}
