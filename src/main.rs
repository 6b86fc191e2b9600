mod fixture;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tcloud::action::{Acknowledgement, ActionDispatcher, ActionState, DispatchOutcome, PendingAction};
use tcloud::config::Config;
use tcloud::dao::{delete_resource, get_resource, list_all_pages, RequestContext};
use tcloud::registry::{Registry, Renderer, ResourceKey};
use tcloud::resource::{wrap_all_with_region, wrap_with_region, Resource};
use tcloud::DaoError;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Terminal cloud resource browser
#[derive(Parser, Debug)]
#[command(name = "tcloud", version = tcloud::VERSION, about, long_about = None)]
struct Args {
    /// Fixture file describing the resources to serve (JSON or YAML)
    #[arg(short, long, global = true)]
    fixture: Option<PathBuf>,

    /// Region to query (repeatable; defaults to the configured regions)
    #[arg(short, long, global = true)]
    region: Vec<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Run in read-only mode (block all write operations)
    #[arg(long, global = true)]
    readonly: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered resource kinds
    Kinds,
    /// List resources of a kind across regions
    List {
        /// Resource key (service/kind)
        key: String,
        /// Filter as KEY=VALUE (repeatable)
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
        /// Items per page
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// Show one resource
    Get { key: String, id: String },
    /// Delete one resource
    Delete { key: String, id: String },
    /// List the actions of a kind
    Actions { key: String },
    /// Run an action against one resource
    Run {
        key: String,
        /// Action name or single-character shortcut
        action: String,
        id: String,
        /// Answer yes to a simple confirmation
        #[arg(long)]
        yes: bool,
        /// Text typed back for a dangerous confirmation
        #[arg(long)]
        confirm: Option<String>,
    },
    /// List the sub-resources of one resource
    Children {
        key: String,
        id: String,
        /// Sub-resource key (service/kind)
        sub_key: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() && !v.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE with a non-empty value, got '{}'", s)),
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("tcloud {} started with log level: {:?}", tcloud::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("tcloud").join("tcloud.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".tcloud").join("tcloud.log");
    }
    PathBuf::from("tcloud.log")
}

/// Everything a command needs
struct Host {
    registry: Arc<Registry>,
    config: Config,
    regions: Vec<String>,
    readonly: bool,
    ctx: RequestContext,
}

impl Host {
    fn key(&self, key: &str) -> Result<ResourceKey> {
        let parsed = ResourceKey::parse(key)
            .with_context(|| format!("Invalid resource key '{}', expected service/kind", key))?;
        if self.registry.get_by_key(&parsed).is_none() {
            bail!("No adapter registered for {}", parsed);
        }
        Ok(parsed)
    }

    fn renderer(&self, key: &ResourceKey) -> Result<Box<dyn Renderer>> {
        self.registry
            .get_by_key(key)
            .map(|entry| entry.create_renderer())
            .with_context(|| format!("No adapter registered for {}", key))
    }

    /// Region for single-resource commands
    fn primary_region(&self) -> &str {
        self.regions
            .first()
            .map(String::as_str)
            .unwrap_or(tcloud::config::DEFAULT_REGION)
    }

    fn region_ctx(&self) -> RequestContext {
        self.ctx.with_region(self.primary_region())
    }

    /// List `key` in every region concurrently, wrapping items with their region
    async fn list_regions(
        &self,
        key: &ResourceKey,
        ctx: &RequestContext,
        page_size: usize,
    ) -> Result<Vec<Box<dyn Resource>>> {
        let calls = self.regions.iter().map(|region| {
            let ctx = ctx.with_region(region);
            async move {
                let dao = self.registry.create_dao(key, &ctx)?;
                let items = list_all_pages(dao.as_ref(), &ctx, page_size).await?;
                Ok::<_, DaoError>((region, items))
            }
        });

        let mut all = Vec::new();
        let mut errors = Vec::new();
        for result in join_all(calls).await {
            match result {
                Ok((region, items)) => {
                    tracing::debug!("list {} in {}: {} items", key, region, items.len());
                    all.extend(wrap_all_with_region(items, region));
                }
                Err(e) if e.is_cancelled() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!("list {} failed: {}", key, e);
                    errors.push(e);
                }
            }
        }

        if all.is_empty() {
            if let Some(first) = errors.into_iter().next() {
                return Err(first.into());
            }
        } else {
            for e in &errors {
                eprintln!("warning: {}", e.user_message());
            }
        }
        Ok(all)
    }

    async fn fetch_one(&self, key: &ResourceKey, id: &str) -> Result<Box<dyn Resource>> {
        let ctx = self.region_ctx();
        let dao = self.registry.create_dao(key, &ctx)?;
        let item = get_resource(dao.as_ref(), &ctx, id).await?;
        Ok(wrap_with_region(item, self.primary_region()) as Box<dyn Resource>)
    }
}

fn print_table(renderer: &dyn Renderer, items: &[Box<dyn Resource>]) {
    let columns = renderer.columns();
    let mut header = format!("{:<14}", "REGION");
    for column in &columns {
        header.push_str(&format!("{:<width$}", column.header, width = column.width as usize + 1));
    }
    println!("{}", header.trim_end());

    for item in items {
        let mut line = format!("{:<14}", tcloud::resource::resource_region(item.as_ref()));
        for (cell, column) in renderer.row(item.as_ref()).iter().zip(&columns) {
            let width = column.width as usize;
            let cell: String = cell.chars().take(width).collect();
            line.push_str(&format!("{:<width$}", cell, width = width + 1));
        }
        println!("{}", line.trim_end());
    }
}

async fn run_command(host: &mut Host, command: Command) -> Result<()> {
    match command {
        Command::Kinds => {
            for key in host.registry.keys() {
                let name = host
                    .registry
                    .get_by_key(key)
                    .map(|e| e.display_name.as_str())
                    .unwrap_or_default();
                let actions = host.registry.actions_for(&key.service, &key.kind).len();
                println!("{:<30} {:<30} {} actions", key.to_string(), name, actions);
            }
        }
        Command::List {
            key,
            filters,
            page_size,
        } => {
            let key = host.key(&key)?;
            let mut ctx = host.ctx.clone();
            for (k, v) in &filters {
                ctx = ctx.with_filter(k.as_str(), v);
            }
            let page_size = page_size.unwrap_or_else(|| host.config.effective_page_size());

            let items = host.list_regions(&key, &ctx, page_size).await?;
            print_table(host.renderer(&key)?.as_ref(), &items);

            if let Err(e) = host.config.set_last_resource(&key.to_string()) {
                tracing::warn!("Failed to save config: {}", e);
            }
        }
        Command::Get { key, id } => {
            let key = host.key(&key)?;
            let item = host.fetch_one(&key, &id).await?;
            println!("{}", host.renderer(&key)?.detail(item.as_ref()));
        }
        Command::Delete { key, id } => {
            let key = host.key(&key)?;
            if host.readonly {
                return Err(DaoError::ReadOnly.into());
            }
            let ctx = host.region_ctx();
            let dao = host.registry.create_dao(&key, &ctx)?;
            delete_resource(dao.as_ref(), &ctx, &id).await?;
            println!("Deleted {} {} in {}", key, id, ctx.region());
        }
        Command::Actions { key } => {
            let key = host.key(&key)?;
            for action in host.registry.actions_for(&key.service, &key.kind) {
                println!(
                    "[{}] {:<20} {:<24} confirm={:?}",
                    action.shortcut, action.name, action.operation, action.confirm
                );
            }
        }
        Command::Run {
            key,
            action,
            id,
            yes,
            confirm,
        } => {
            let key = host.key(&key)?;
            let declared = {
                let set = host
                    .registry
                    .action_set(&key)
                    .with_context(|| format!("No actions registered for {}", key))?;
                let mut chars = action.chars();
                let found = match (chars.next(), chars.next()) {
                    (Some(c), None) => set.find_by_shortcut(c),
                    _ => set.find_by_name(&action),
                };
                found
                    .cloned()
                    .with_context(|| format!("No action '{}' for {}", action, key))?
            };

            let item = host.fetch_one(&key, &id).await?;
            let mut pending = PendingAction::new(key, declared, item);
            if let Some(prompt) = pending.prompt() {
                let ack = match (confirm, yes) {
                    (Some(text), _) => Acknowledgement::Typed(text),
                    (None, true) => Acknowledgement::Yes,
                    (None, false) => Acknowledgement::No,
                };
                if pending.acknowledge(ack) != ActionState::Confirmed {
                    match prompt.expected_input {
                        Some(expected) => bail!("{} (rerun with --confirm '{}')", prompt.message, expected),
                        None => bail!("{} (rerun with --yes)", prompt.message),
                    }
                }
            }

            let dispatcher = ActionDispatcher::new(Arc::clone(&host.registry)).readonly(host.readonly);
            match dispatcher.dispatch(&host.ctx, pending).await {
                DispatchOutcome::Completed(report) => {
                    println!("{} ({} ms)", report.summary(), report.duration_ms());
                    if let Some(cause) = report.result.cause() {
                        bail!(cause.user_message());
                    }
                }
                DispatchOutcome::Cancelled => println!("Cancelled"),
                DispatchOutcome::AwaitingConfirmation(p) => {
                    bail!("{} is awaiting confirmation", p.action().name)
                }
            }
        }
        Command::Children { key, id, sub_key } => {
            let key = host.key(&key)?;
            let sub_key = host.key(&sub_key)?;
            let parent = host.fetch_one(&key, &id).await?;
            let ctx = host
                .registry
                .sub_resource_context(&key, &sub_key, parent.as_ref(), &host.ctx)?;
            let items = host
                .list_regions(&sub_key, &ctx, host.config.effective_page_size())
                .await?;
            print_table(host.renderer(&sub_key)?.as_ref(), &items);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let config = Config::load();
    let regions = config.effective_regions(&args.region);
    let readonly = args.readonly || config.readonly;
    tracing::info!("Using regions: {:?}, readonly: {}", regions, readonly);

    let Some(fixture) = args.fixture.as_deref() else {
        bail!("No data source configured. Use --fixture <file>");
    };
    let registry = Arc::new(fixture::load_registry(fixture).await?);

    let token = CancellationToken::new();
    let mut ctx = RequestContext::with_cancellation(token.clone());
    if let Some(secs) = args.timeout {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling in-flight requests");
            token.cancel();
        }
    });

    let mut host = Host {
        registry,
        config,
        regions,
        readonly,
        ctx,
    };

    if let Err(err) = run_command(&mut host, args.command).await {
        tracing::error!("command failed: {:#}", err);
        match err.downcast_ref::<DaoError>() {
            Some(cause) => eprintln!("Error: {}", cause.user_message()),
            None => eprintln!("Error: {:#}", err),
        }
        std::process::exit(1);
    }

    Ok(())
}
