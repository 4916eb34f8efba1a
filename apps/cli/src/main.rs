use anyhow::{Context, bail};
use clap::Parser;
use std::io::BufRead;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use workshop::config::{default_config_path, default_session_path};
use workshop::format::{format_count, format_file_size, format_time_ago, is_valid_url};
use workshop::logging::init_logging;
use workshop::steam::{Credentials, GuardKind, LoginOutcome, SessionStore, SteamAuthenticator};
use workshop::{
    AppConfig, CacheTtls, ConsoleProgressReporter, DownloadManager, IntoProgressCallback, PreviewCache,
    SteamApi, TtlCache, WorkshopError, WorkshopService,
};

mod cli;

use cli::{CacheCommands, Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_file.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<WorkshopError>() {
                Some(workshop_err) => eprintln!("{}", workshop_err.detailed_report()),
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::from(1)
        }
    }
}

struct App {
    config: AppConfig,
    api: Arc<SteamApi>,
    cache: Arc<TtlCache>,
    cleanup: CancellationToken,
}

impl App {
    fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let path = config_path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        let config = AppConfig::load_with_env(&path)?;
        let api = SteamApi::new(config.api.clone())?.with_fallback_base(config.downloads.fallback_download_base.clone());

        let ttl = Duration::from_secs(config.cache.ttl_games);
        let cache = Arc::new(TtlCache::open(config.cache.data_dir(), ttl)?.with_max_size(config.cache.max_size_bytes()));
        let cleanup = CancellationToken::new();
        cache.spawn_cleanup(config.cache.cleanup_interval(), cleanup.clone());

        Ok(Self {
            config,
            api: Arc::new(api),
            cache,
            cleanup,
        })
    }

    fn cache(&self) -> Arc<TtlCache> {
        Arc::clone(&self.cache)
    }

    fn service(&self) -> WorkshopService {
        WorkshopService::new(self.api.clone(), self.cache(), CacheTtls::from_settings(&self.config.cache))
    }

    fn previews(&self) -> anyhow::Result<PreviewCache> {
        let previews = PreviewCache::open(self.config.cache.image_dir(), self.api.http_client().clone())?;
        Ok(previews.with_fresh_for(self.config.cache.image_ttl()))
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.cleanup.cancel();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let app = App::load(cli.config.as_deref())?;
    let cancel = CancellationToken::new();

    match cli.command {
        Commands::Games { limit } => {
            let games = app.service().load_popular_games(&cancel).await?;
            for game in games.iter().take(limit) {
                println!("{:>8}  {}", game.appid, game.name);
            }
        }
        Commands::Search { query } => {
            let games = app.service().search_games(&query, &cancel).await?;
            if games.is_empty() {
                println!("No games match '{}'", query.trim());
            }
            for game in games {
                println!("{:>8}  {}", game.appid, game.name);
            }
        }
        Commands::Items { appid, page, per_page } => {
            let service = app.service();
            let items = service
                .load_workshop_items(appid, page, per_page, &cancel, |summary| {
                    println!(
                        "{:>12}  {:<40}  {:>10}  {:>7} subs  {}",
                        summary.item.publishedfileid,
                        summary.item.title,
                        summary.file_size_formatted,
                        summary.subscriptions_formatted,
                        summary.created_date,
                    );
                })
                .await?;
            info!("{} items on page {}", items.len(), page);
        }
        Commands::Details { ids } => details(&app, &ids).await?,
        Commands::Download {
            ids,
            dir,
            concurrency,
            extract,
            verbose,
        } => download(&app, &ids, dir.as_deref(), concurrency, extract, verbose).await?,
        Commands::Preview { url } => {
            if !is_valid_url(&url) {
                bail!("'{}' is not a valid URL", url);
            }
            let path = app.previews()?.load(&url).await?;
            println!("{}", path.display());
        }
        Commands::Cache { command } => cache_command(&app, command).await?,
        Commands::Login {
            username,
            guard_code,
            two_factor,
            captcha_gid,
            captcha_text,
            no_remember,
        } => {
            let mut credentials = Credentials::new(username, read_password()?);
            if let Some(code) = guard_code {
                let kind = if two_factor { GuardKind::TwoFactor } else { GuardKind::Email };
                credentials = credentials.with_guard_code(code, kind);
            }
            if let (Some(gid), Some(text)) = (captcha_gid, captcha_text) {
                credentials = credentials.with_captcha(gid, text);
            }
            login(&app, credentials, !no_remember).await?;
        }
        Commands::Logout => {
            let mut store = SessionStore::new(default_session_path());
            store.logout()?;
            println!("Logged out");
        }
        Commands::ValidateKey => {
            if !app.api.has_api_key() {
                bail!("No API key configured (set STEAM_API_KEY or api.api_key in the config)");
            }
            if app.api.validate_api_key().await {
                println!("API key is valid");
            } else {
                bail!("API key was rejected by Steam");
            }
        }
    }

    Ok(())
}

async fn details(app: &App, ids: &[String]) -> anyhow::Result<()> {
    let response = app.api.get_published_file_details(ids).await?;
    let now = unix_now();

    for item in &response.files {
        if !item.is_ok() {
            warn!("Item {} is unavailable (result {})", item.publishedfileid, item.result);
            continue;
        }
        println!("{} [{}]", item.title, item.publishedfileid);
        println!("  game:        {}", app.api.app_info(item.consumer_app_id as u32).name);
        println!("  size:        {}", format_file_size(item.file_size));
        println!("  subscribers: {}", format_count(item.subscriptions));
        if item.time_updated > 0 {
            println!("  updated:     {}", format_time_ago(item.time_updated as i64, now));
        }
        let tags = item.tag_names();
        if !tags.is_empty() {
            println!("  tags:        {}", tags.join(", "));
        }
    }
    Ok(())
}

async fn download(
    app: &App,
    ids: &[String],
    dir: Option<&Path>,
    concurrency: Option<usize>,
    extract: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    let mut settings = app.config.downloads.clone();
    settings.extract_archives |= extract;

    let manager = DownloadManager::new(settings, Some(app.api.clone()))?
        .with_progress(ConsoleProgressReporter::new(verbose).into_callback());
    if let Some(max) = concurrency {
        manager.set_max_concurrent(max);
    }

    let response = app.api.get_published_file_details(ids).await?;
    if response.files.is_empty() {
        bail!("Steam returned no items for {}", ids.join(", "));
    }

    for item in response.files.iter().filter(|item| item.is_ok()) {
        if let Err(e) = manager.start_download(item, dir).await {
            warn!("Skipping {}: {}", item.publishedfileid, e);
        }
    }

    tokio::select! {
        _ = manager.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling downloads");
            manager.cancel_all();
            manager.wait_idle().await;
        }
    }

    let snapshot = manager.metrics().snapshot();
    info!(
        "{} completed, {} failed, {} cancelled, {}",
        snapshot.completed,
        snapshot.failed,
        snapshot.cancelled,
        format_file_size(snapshot.bytes)
    );
    if snapshot.failed > 0 {
        bail!("{} download(s) failed", snapshot.failed);
    }
    Ok(())
}

async fn cache_command(app: &App, command: CacheCommands) -> anyhow::Result<()> {
    let cache = app.cache();
    let previews = app.previews()?;

    match command {
        CacheCommands::Stats => {
            let stats = cache.stats();
            let size = cache.size();
            let images = previews.stats().await?;
            println!("Data cache:  {}", stats.cache_dir.display());
            println!(
                "  {} entries ({} active, {} expired), {:.2} MB",
                stats.total_items, stats.active_items, stats.expired_items, size.disk_size_mb
            );
            println!("Image cache: {}", previews.dir().display());
            println!("  {} files, {:.2} MB", images.total_files, images.total_size_mb);
        }
        CacheCommands::Clear => {
            cache.clear();
            let removed = previews.clear().await?;
            println!("Cleared data cache and {} preview images", removed);
        }
        CacheCommands::Cleanup => {
            let expired = cache.cleanup_expired();
            let max_age = Duration::from_secs(app.config.cache.image_max_age_days * 24 * 60 * 60);
            let old = previews.cleanup(max_age).await?;
            println!("Removed {} expired entries and {} old preview images", expired, old);
        }
    }
    Ok(())
}

async fn login(app: &App, credentials: Credentials, remember: bool) -> anyhow::Result<()> {
    let mut store = SessionStore::new(default_session_path());
    if let Some(session) = store.authenticate_saved() {
        println!("Already logged in as {}", session.username);
        return Ok(());
    }

    let authenticator = SteamAuthenticator::new(&app.config.api.community_url, &app.config.api.user_agent)?
        .with_progress(Arc::new(|stage: &str| eprintln!("{}...", stage)));

    match authenticator.login(&credentials).await? {
        LoginOutcome::Success(session) => {
            let name = session.username.clone();
            store.store(session, remember)?;
            println!("Logged in as {}", name);
            Ok(())
        }
        LoginOutcome::CaptchaRequired { gid, image_url } => {
            bail!("Captcha required. Open {} and retry with --captcha-gid {} --captcha-text <text>", image_url, gid)
        }
        LoginOutcome::GuardCodeRequired { kind } => {
            let hint = match kind {
                GuardKind::Email => "--guard-code <code from e-mail>",
                GuardKind::TwoFactor => "--guard-code <authenticator code> --two-factor",
            };
            bail!("Steam Guard code required. Retry with {}", hint)
        }
        LoginOutcome::Failed { message } => bail!("Login failed: {}", message),
    }
}

/// `STEAM_PASSWORD` when set, otherwise the first line of stdin
fn read_password() -> anyhow::Result<String> {
    if let Ok(password) = std::env::var("STEAM_PASSWORD") {
        return Ok(password);
    }
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
