use anyhow::{Context, Result};
use snaptick_core::{load_manifest, DirectorySource, Roster};
use snaptick_vision::OnnxFaceEncoder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod engine;
mod error;
mod routes;
mod server;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "snaptickd starting");

    let config = Config::from_env();
    tracing::info!(
        bind = %config.bind_addr,
        model_dir = %config.model_dir.display(),
        manifest = %config.manifest_path.display(),
        threshold = config.match_threshold,
        "configuration loaded"
    );

    let students = load_manifest(&config.manifest_path).context("loading roster manifest")?;

    let mut encoder = OnnxFaceEncoder::load(&config.model_dir)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;

    let roster = match &config.roster_snapshot {
        Some(path) => Roster::load_snapshot(path).context("loading roster snapshot")?,
        None => Roster::build(&students, &DirectorySource::new(&config.images_dir), &mut encoder),
    };
    if roster.is_empty() {
        tracing::warn!(
            images = %config.images_dir.display(),
            "no faces encoded; make sure roster images are present"
        );
    }
    tracing::info!(known_faces = roster.len(), "roster ready");

    let engine = engine::spawn_engine(encoder)?;

    let state = AppState {
        roster: Arc::new(roster),
        students: Arc::new(students),
        engine,
        users: Arc::new(auth::UserStore::default()),
        tokens: Arc::new(auth::TokenIssuer::from_config(
            config.jwt_secret.as_deref(),
            config.token_ttl_hours,
        )),
        match_threshold: config.match_threshold,
    };

    let router = server::build_router(state, config.max_upload_bytes);
    server::serve(router, &config.bind_addr).await
}
