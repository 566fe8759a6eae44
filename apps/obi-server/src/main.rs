//! Obi-Tuke API Server
//!
//! Replaces the contact band (帯) of real-estate flyer PDFs. Provides REST
//! API endpoints for:
//!
//! - Band replacement with an image or a color/text banner
//! - Recently processed jobs
//! - Health checks
//!
//! ## Architecture
//!
//! Requests are stateless. Each upload is composited on the blocking pool
//! under a timeout, with at most `--max-jobs` composites running at once; the
//! server keeps only a short in-memory job list.
//! Rate limiting is per client IP via tower-governor.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use obi_core::{CompositeOptions, JobHistory, OverflowPolicy};
use tokio::sync::Semaphore;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;

use api::{handle_health, handle_list_jobs, handle_process, handle_root};

const MB: usize = 1024 * 1024;

/// Composites allowed to run at the same time
pub const DEFAULT_MAX_JOBS: usize = 4;

/// Command-line arguments for the Obi-Tuke server
#[derive(Parser, Debug)]
#[command(name = "obi-server")]
#[command(about = "Obi-Tuke API server for flyer band replacement")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "OBI_PORT", default_value = "8000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "OBI_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Processing timeout in milliseconds
    #[arg(long, env = "OBI_TIMEOUT_MS", default_value = "30000")]
    timeout_ms: u64,

    /// Rate limit: requests per second per IP
    #[arg(long, env = "OBI_RATE_LIMIT", default_value = "10")]
    rate_limit: u32,

    /// Largest accepted PDF upload in megabytes
    #[arg(long, env = "OBI_MAX_PDF_MB", default_value = "10")]
    max_pdf_mb: usize,

    /// Largest accepted replacement image in megabytes
    #[arg(long, env = "OBI_MAX_IMAGE_MB", default_value = "5")]
    max_image_mb: usize,

    /// Largest accepted page count
    #[arg(long, env = "OBI_MAX_PAGES", default_value = "50")]
    max_pages: u32,

    /// Composites allowed to run at the same time
    #[arg(long, env = "OBI_MAX_JOBS", default_value = "4")]
    max_jobs: usize,

    /// Band overflow handling: allow, warn or clip
    #[arg(long, env = "OBI_OVERFLOW", default_value = "allow")]
    overflow: OverflowPolicy,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Upload size limits in bytes
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_pdf_bytes: usize,
    pub max_image_bytes: usize,
}

impl Limits {
    pub fn from_megabytes(pdf_mb: usize, image_mb: usize) -> Self {
        Self {
            max_pdf_bytes: pdf_mb * MB,
            max_image_bytes: image_mb * MB,
        }
    }

    /// Whole multipart body: both files plus room for the settings field
    pub fn max_request_bytes(&self) -> usize {
        self.max_pdf_bytes + self.max_image_bytes + MB
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::from_megabytes(10, 5)
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Processing timeout in milliseconds
    pub timeout_ms: u64,
    pub limits: Limits,
    pub options: CompositeOptions,
    pub history: Arc<Mutex<JobHistory>>,
    /// Permits for running composites. A composite that outlives its
    /// request timeout keeps its permit until it finishes.
    pub workers: Arc<Semaphore>,
}

impl AppState {
    pub fn new(timeout_ms: u64, limits: Limits, options: CompositeOptions) -> Self {
        Self {
            timeout_ms,
            limits,
            options,
            history: Arc::new(Mutex::new(JobHistory::new())),
            workers: Arc::new(Semaphore::new(DEFAULT_MAX_JOBS)),
        }
    }

    /// Allow `max_jobs` concurrent composites (at least one)
    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.workers = Arc::new(Semaphore::new(max_jobs.max(1)));
        self
    }

    /// Run `f` with the job history locked
    pub fn with_history<R>(&self, f: impl FnOnce(&mut JobHistory) -> R) -> R {
        let mut history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut history)
    }
}

/// Build the router without rate limiting
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.limits.max_request_bytes();

    Router::new()
        // Health checks
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        // API endpoints
        .route("/process", post(handle_process))
        .route("/jobs", get(handle_list_jobs))
        // Apply middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Obi-Tuke server on {}:{}", args.host, args.port);

    // Create rate limiter configuration
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(args.rate_limit.into())
            .burst_size(args.rate_limit * 2)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit: {}", args.rate_limit))?,
    );

    let options = CompositeOptions {
        max_pages: args.max_pages,
        overflow: args.overflow,
        ..CompositeOptions::default()
    };
    let limits = Limits::from_megabytes(args.max_pdf_mb, args.max_image_mb);
    let state = AppState::new(args.timeout_ms, limits, options).with_max_jobs(args.max_jobs);

    let app = app(state).layer(GovernorLayer {
        config: governor_conf,
    });

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Rate limit: {} requests/second per IP", args.rate_limit);
    info!(
        "Processing timeout: {}ms, {} concurrent job(s)",
        args.timeout_ms,
        args.max_jobs.max(1)
    );
    info!(
        "Limits: PDF {}MB, image {}MB, {} pages, overflow {}",
        args.max_pdf_mb, args.max_image_mb, args.max_pages, args.overflow
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
