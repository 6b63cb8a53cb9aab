mod ai;
mod classifier;
mod config;
mod db;
mod discovery;
mod documents;
mod error;
mod models;
mod processing;
mod remote;
mod scoring;
mod scrape;
mod search;

use anyhow::{anyhow, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use ai::{AnthropicProvider, Assistant};
use classifier::{classify, is_skipped};
use config::{Credentials, HunterConfig};
use db::{Database, JobRecord};
use discovery::{build_search_queries, default_queries, JobDiscovery};
use documents::MarkdownWriter;
use error::HunterError;
use models::{Candidate, CandidateProfile, JobStatus};
use processing::{Collaborators, Outcome, Processor, RunSummary};
use remote::{load_candidates, push_candidates, SupabaseSink};
use scrape::HttpScraper;
use search::ProviderSelector;

#[derive(Parser)]
#[command(name = "hunter")]
#[command(about = "Job discovery pipeline - search, classify, score, and tailor applications")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file (every field optional)
    #[arg(long, global = true, env = "HUNTER_CONFIG")]
    config: Option<PathBuf>,

    /// Database path, overriding the config file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    credentials: CredentialArgs,
}

#[derive(Args)]
struct CredentialArgs {
    /// Google Custom Search API key
    #[arg(long, global = true, env = "GOOGLE_API_KEY", hide_env_values = true)]
    google_api_key: Option<String>,

    /// Google Custom Search engine id
    #[arg(long, global = true, env = "GOOGLE_CSE_ID", hide_env_values = true)]
    google_cse_id: Option<String>,

    /// SerpApi key
    #[arg(long, global = true, env = "SERPAPI_KEY", hide_env_values = true)]
    serpapi_key: Option<String>,

    /// Anthropic API key, needed for processing
    #[arg(long, global = true, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,

    /// Supabase project URL, needed for push
    #[arg(long, global = true, env = "SUPABASE_URL")]
    supabase_url: Option<String>,

    /// Supabase service role key, needed for push
    #[arg(long, global = true, env = "SUPABASE_SERVICE_KEY", hide_env_values = true)]
    supabase_service_key: Option<String>,
}

impl From<CredentialArgs> for Credentials {
    fn from(args: CredentialArgs) -> Self {
        Credentials {
            google_api_key: args.google_api_key,
            google_cse_id: args.google_cse_id,
            serpapi_key: args.serpapi_key,
            anthropic_api_key: args.anthropic_api_key,
            supabase_url: args.supabase_url,
            supabase_service_key: args.supabase_service_key,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Search for postings and record new URLs
    Discover {
        /// Custom search query (repeatable)
        #[arg(short, long, conflicts_with = "ats")]
        query: Vec<String>,

        /// Search one ATS platform (greenhouse, lever, workable, ashby, ...)
        #[arg(long)]
        ats: Option<String>,

        /// Max results per query
        #[arg(long)]
        max: Option<usize>,

        /// Also write the classified candidates to a JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Process pending URLs
    Process {
        /// Max URLs to process
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Discover, then process
    Run,

    /// Process a single posting URL
    Url {
        /// Posting URL
        url: String,
    },

    /// Run the full pipeline now and then on an interval
    Daemon {
        /// Minutes between runs
        #[arg(short, long, default_value = "60")]
        interval: u64,
    },

    /// Show database statistics
    Stats,

    /// Show how URLs would be classified
    Classify {
        /// URLs to classify
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Mark a job as applied
    Applied {
        /// Job ID
        id: String,
    },

    /// Push discovered postings to Supabase for a user
    #[command(group(ArgGroup::new("source").required(true).args(["discover", "input"])))]
    Push {
        /// User UUID to associate jobs with
        #[arg(short, long)]
        user_id: String,

        /// Run discovery first
        #[arg(short, long)]
        discover: bool,

        /// JSON file written by `discover --output`
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Custom search query (repeatable), instead of the user's preferences
        #[arg(short, long)]
        query: Vec<String>,

        /// Max results per query
        #[arg(long, default_value = "30")]
        max: usize,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "hunter=debug" } else { "hunter=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

/// Long-lived collaborators for a processing run.
struct Pipeline {
    assistant: Assistant<AnthropicProvider>,
    scraper: HttpScraper,
    documents: MarkdownWriter,
    profile: CandidateProfile,
}

impl Pipeline {
    /// Fails before touching the store when a key or the profile is missing.
    fn new(config: &HunterConfig, creds: &Credentials) -> Result<Self> {
        let api_key = creds.require_anthropic()?;
        let profile = config.load_profile()?;
        std::fs::create_dir_all(&config.output_dir)
            .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;
        Ok(Self {
            assistant: Assistant::new(AnthropicProvider::new(api_key, &config.model)?),
            scraper: HttpScraper::new()?,
            documents: MarkdownWriter::default(),
            profile,
        })
    }

    fn processor<'a>(&'a self, db: &'a Database, config: &'a HunterConfig) -> Processor<'a> {
        Processor::new(
            db,
            Collaborators {
                scraper: &self.scraper,
                analyzer: &self.assistant,
                writer: &self.assistant,
                documents: &self.documents,
            },
            &self.profile,
            &config.processing,
            &config.output_dir,
        )
    }
}

fn discovery_for(config: &HunterConfig, creds: &Credentials) -> Result<JobDiscovery> {
    let selector = ProviderSelector::from_credentials(creds, config.discovery.page_delay())?;
    Ok(JobDiscovery::new(selector))
}

fn configured_queries(config: &HunterConfig) -> Vec<String> {
    if config.discovery.queries.is_empty() {
        default_queries()
    } else {
        config.discovery.queries.clone()
    }
}

fn record_new(db: &Database, candidates: &[Candidate]) -> Result<usize> {
    let new_count = db.record_candidates(candidates)?;
    tracing::info!("Discovery complete: {} new URLs saved", new_count);
    Ok(new_count)
}

fn run_full(db: &Database, config: &HunterConfig, creds: &Credentials) -> Result<RunSummary> {
    let pipeline = Pipeline::new(config, creds)?;
    let discovery = discovery_for(config, creds)?;

    let candidates = discovery.discover(
        &configured_queries(config),
        config.discovery.max_results_per_query,
        config.discovery.query_delay(),
    );
    let discovered = record_new(db, &candidates)?;

    let mut summary = pipeline
        .processor(db, config)
        .run(config.processing.max_jobs_per_run)?;
    summary.discovered = discovered;
    Ok(summary)
}

fn is_configuration_error(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<HunterError>(), Some(HunterError::Configuration(_)))
}

fn print_summary(summary: &RunSummary) {
    println!("\nRun complete:");
    println!("  Discovered: {}", summary.discovered);
    println!("  Processed:  {}", summary.processed);
    println!("  Accepted:   {}", summary.accepted);
    println!("  Rejected:   {}", summary.rejected);
    println!("  Errored:    {}", summary.errored);
}

fn print_candidates(candidates: &[Candidate]) {
    println!("\n{}", "=".repeat(60));
    println!("Found {} relevant URLs", candidates.len());
    println!("{}", "=".repeat(60));

    let mut by_type: BTreeMap<&str, Vec<&Candidate>> = BTreeMap::new();
    for c in candidates {
        by_type.entry(c.classification.ats_type.as_str()).or_default().push(c);
    }
    for (ats, group) in by_type {
        println!("\n{} ({} found):", ats.to_uppercase(), group.len());
        for c in group.iter().take(5) {
            println!("  - {}", truncate(&c.hit.title, 60));
            println!("    {}", c.hit.url);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = HunterConfig::load(cli.config.as_deref())?;
    if let Some(db_path) = cli.db {
        config.db_path = db_path;
    }
    let creds = Credentials::from(cli.credentials);

    match cli.command {
        Commands::Init => {
            let db = Database::open(&config.db_path)?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Discover {
            query,
            ats,
            max,
            output,
        } => {
            let db = Database::open(&config.db_path)?;
            let discovery = discovery_for(&config, &creds)?;
            let max = max.unwrap_or(config.discovery.max_results_per_query);
            let delay = config.discovery.query_delay();

            let candidates = match ats {
                Some(ats) => discovery.discover_from_ats(&ats, max, delay),
                None if !query.is_empty() => discovery.discover(&query, max, delay),
                None => discovery.discover(&configured_queries(&config), max, delay),
            };
            let new_count = record_new(&db, &candidates)?;

            print_candidates(&candidates);
            println!("Searched with: {}", discovery.provider_name());
            println!("\n{} new URLs saved ({} already known)", new_count, candidates.len() - new_count);

            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&candidates)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Saved to {}", path.display());
            }
        }

        Commands::Process { limit } => {
            let db = Database::open(&config.db_path)?;
            let pipeline = Pipeline::new(&config, &creds)?;
            let limit = limit.unwrap_or(config.processing.max_jobs_per_run);
            let summary = pipeline.processor(&db, &config).run(limit)?;
            print_summary(&summary);
        }

        Commands::Run => {
            let db = Database::open(&config.db_path)?;
            let summary = run_full(&db, &config, &creds)?;
            tracing::info!("Run summary: {}", summary);
            print_summary(&summary);
        }

        Commands::Url { url } => {
            let db = Database::open(&config.db_path)?;
            let pipeline = Pipeline::new(&config, &creds)?;
            if db.is_processed(&url)? {
                println!("Already processed; processing again.");
            }
            match pipeline.processor(&db, &config).process_single(&url)? {
                Outcome::Accepted(job) => {
                    println!("Accepted [{:.0}%] {} at {}", job.match_score * 100.0, job.title, job.company);
                    println!("Job ID: {} ({})", job.id, job.status);
                }
                Outcome::Rejected(reason) => {
                    println!("Skipped: {}", reason);
                }
            }
        }

        Commands::Daemon { interval } => {
            let db = Database::open(&config.db_path)?;
            let pause = Duration::from_secs(interval.max(1) * 60);
            tracing::info!("Starting daemon mode (every {} min)", interval.max(1));

            loop {
                match run_full(&db, &config, &creds) {
                    Ok(summary) => tracing::info!("Run summary: {}", summary),
                    Err(e) if is_configuration_error(&e) => return Err(e),
                    Err(e) => tracing::error!("Run failed: {:#}", e),
                }
                thread::sleep(pause);
            }
        }

        Commands::Stats => {
            let db = Database::open(&config.db_path)?;
            let stats = db.stats()?;

            println!("\n=== Job Hunter Stats ===\n");
            println!("Total jobs processed: {}", stats.total_jobs);
            println!("Pending URLs:         {}", stats.pending_urls);
            println!("Processed URLs:       {}", stats.processed_urls);

            let top = db.top_matches(JobStatus::New, 10)?;
            if top.is_empty() {
                println!("\nNo new matches.");
            } else {
                println!("\nTop matches:");
                println!("{:<14} {:>6} {:<32} {:<20}", "ID", "SCORE", "TITLE", "COMPANY");
                println!("{}", "-".repeat(75));
                for record in top {
                    println!(
                        "{:<14} {:>5.0}% {:<32} {:<20}",
                        record.job.id,
                        record.job.match_score * 100.0,
                        truncate(&record.job.title, 30),
                        truncate(&record.job.company, 18)
                    );
                }
            }
        }

        Commands::Classify { urls } => {
            let db = Database::open(&config.db_path)?;
            println!("{:<16} {:<20} {:<6} {:<6} URL", "TYPE", "COMPANY", "SKIP", "SEEN");
            println!("{}", "-".repeat(77));
            for url in urls {
                let c = classify(&url);
                println!(
                    "{:<16} {:<20} {:<6} {:<6} {}",
                    c.ats_type,
                    truncate(c.company_slug.as_deref().unwrap_or("-"), 18),
                    if is_skipped(&url) { "yes" } else { "" },
                    if db.has_seen(&url)? { "yes" } else { "" },
                    url
                );
            }
        }

        Commands::Applied { id } => {
            let db = Database::open(&config.db_path)?;
            let record = db
                .get_job(&id)?
                .ok_or_else(|| anyhow!("Job {} not found", id))?;
            db.set_job_status(&id, JobStatus::Applied)?;
            println!("Marked '{}' at {} as applied.", record.job.title, record.job.company);

            if let Some(record) = db.get_job(&id)? {
                for line in application_details(&record) {
                    println!("  {}", line);
                }
            }
        }

        Commands::Push {
            user_id,
            discover,
            input,
            query,
            max,
        } => {
            let (url, key) = creds.require_supabase()?;
            let sink = SupabaseSink::new(url, key)?;

            if discover {
                let queries = if query.is_empty() {
                    let preferences = sink.fetch_preferences(&user_id);
                    build_search_queries(preferences.as_ref())
                } else {
                    query
                };
                tracing::info!("Running discovery with {} queries for user {}", queries.len(), user_id);

                let discovery = discovery_for(&config, &creds)?;
                let candidates = discovery.discover(&queries, max, config.discovery.query_delay());
                let stats = push_candidates(&sink, &candidates, &user_id);

                println!("\n{}", "=".repeat(50));
                println!("Discovery Pipeline Complete");
                println!("{}", "=".repeat(50));
                println!("Queries run: {}", queries.len());
                println!("Jobs discovered: {}", candidates.len());
                println!("Jobs inserted: {}", stats.inserted);
                println!("Jobs skipped (duplicates): {}", stats.skipped);
                println!("Errors: {}", stats.errors);
            } else if let Some(path) = input {
                let candidates = load_candidates(&path)?;
                let stats = push_candidates(&sink, &candidates, &user_id);
                println!(
                    "Pushed {} jobs, {} skipped, {} errors",
                    stats.inserted, stats.skipped, stats.errors
                );
            }
        }
    }

    Ok(())
}

fn application_details(record: &JobRecord) -> Vec<String> {
    let fields = [
        ("Applied at", &record.applied_at),
        ("Resume", &record.resume_path),
        ("Cover letter", &record.cover_letter_path),
    ];
    fields
        .into_iter()
        .map(|(label, value)| format!("{:<13} {}", format!("{}:", label), value.as_deref().unwrap_or("-")))
        .collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
