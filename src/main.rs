//! PingOne reconciler CLI entrypoint.
//!
//! This is the main entrypoint for the pingone-reconcile command-line tool.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use pingone_reconcile::cli::{Cli, Commands, LogFormat, OutputFormatter};
use pingone_reconcile::diag::Diagnostics;
use pingone_reconcile::config::{load_dotenv, ProfileFile, ProviderSettings, ENV_DEBUG};
use pingone_reconcile::error::{ConfigError, ProviderError, Result};
use pingone_reconcile::planner::ChangeSet;
use pingone_reconcile::reconciler::{ConfigDocument, Reconciler};
use pingone_reconcile::resources::default_registry;
use pingone_reconcile::schema::Registry;
use pingone_reconcile::state::{LocalStateStore, StateDocument, StateStore};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool, format: LogFormat) {
    let debug_env = std::env::var(ENV_DEBUG)
        .is_ok_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"));
    let filter = if verbose || debug_env {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point. Returns whether every operation succeeded.
async fn run(cli: Cli) -> Result<bool> {
    load_dotenv(None)?;

    let formatter = OutputFormatter::new(cli.output);
    let registry = default_registry()?;
    let store = match &cli.state {
        Some(path) => LocalStateStore::with_state_path(path),
        None => LocalStateStore::new()?,
    };
    debug!(location = %store.location(), "Using state store");

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling in-flight operations");
            signal.cancel();
        }
    });

    match &cli.command {
        Commands::Schema { resource_type } => {
            let reconciler = Reconciler::new(registry);
            let mut schemas = reconciler.get_schema();
            if let Some(name) = resource_type {
                reconciler.registry().get(name)?;
                schemas.retain(|k, _| k == name);
            }
            println!("{}", formatter.format_schema(&schemas));
            Ok(true)
        }
        Commands::Validate { file } => {
            let reconciler = Reconciler::new(registry);
            let document = read_document(file)?;
            let mut diagnostics = Diagnostics::new();
            for (address, rc) in &document.resources {
                for mut diagnostic in reconciler.validate_config(rc.type_name(address), &rc.config)? {
                    diagnostic.summary = format!("{address}: {}", diagnostic.summary);
                    diagnostics.push(diagnostic);
                }
            }
            println!("{}", formatter.format_diagnostics(&diagnostics));
            Ok(!diagnostics.has_errors())
        }
        Commands::Plan { file, detailed } => {
            let reconciler = Reconciler::new(registry);
            let document = read_document(file)?;
            let state = load_state(&store, reconciler.registry()).await?;
            let planned = reconciler.plan_document(&document, &state)?;
            let change_set = ChangeSet::from_plans(&planned);
            println!("{}", formatter.format_plan(&change_set, &planned, *detailed));
            Ok(true)
        }
        Commands::Apply {
            file,
            yes,
            continue_on_error,
        } => {
            let reconciler = connect(registry, &cli)?;
            let document = read_document(file)?;
            let mut state = load_state(&store, reconciler.registry()).await?;

            let planned = reconciler.plan_document(&document, &state)?;
            let change_set = ChangeSet::from_plans(&planned);
            if change_set.is_empty() {
                eprintln!("No changes to apply.");
                return Ok(true);
            }
            eprintln!("{}", formatter.format_plan(&change_set, &planned, false));

            if !*yes && !confirm("Do you want to apply this plan? [y/N]: ")? {
                eprintln!("Apply cancelled.");
                return Ok(true);
            }

            let (_, result) = reconciler
                .apply_document(&document, &mut state, *continue_on_error, &cancel)
                .await?;
            store.save(&state).await?;
            println!("{}", formatter.format_execution(&result));
            Ok(result.all_successful())
        }
        Commands::Import {
            resource_type,
            id,
            address,
        } => {
            let reconciler = connect(registry, &cli)?;
            let address = address.clone().unwrap_or_else(|| {
                let last = id.rsplit('/').next().unwrap_or(id);
                format!("{resource_type}.{last}")
            });
            let mut state = load_state(&store, reconciler.registry()).await?;
            let diagnostics = reconciler
                .import_document(&mut state, &address, resource_type, id, &cancel)
                .await?;
            store.save(&state).await?;
            if !diagnostics.is_empty() {
                eprintln!("{}", formatter.format_diagnostics(&diagnostics));
            }
            info!(address = %address, "Imported");
            println!("{}", formatter.format_state(&state));
            Ok(true)
        }
        Commands::Refresh => {
            let reconciler = connect(registry, &cli)?;
            let mut state = load_state(&store, reconciler.registry()).await?;
            let report = reconciler.refresh_document(&mut state, &cancel).await?;
            store.save(&state).await?;
            println!("{}", formatter.format_refresh(&report));
            Ok(report.errors.is_empty())
        }
        Commands::UpgradeState => {
            let loaded = store.load(&registry).await?.unwrap_or_default();
            if !loaded.upgraded.is_empty() {
                store.save(&loaded.document).await?;
            }
            eprintln!("Upgraded {} instance(s).", loaded.upgraded.len());
            println!("{}", formatter.format_state(&loaded.document));
            Ok(true)
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Builds a reconciler backed by a PingOne client.
fn connect(registry: Registry, cli: &Cli) -> Result<Reconciler> {
    let settings = if cli.profile.is_some() || cli.profile_file.is_some() {
        let path = cli
            .profile_file
            .clone()
            .or_else(ProfileFile::default_path)
            .ok_or_else(|| ProviderError::internal("Cannot determine the home directory"))?;
        let profile = ProfileFile::load(&path)?.profile(cli.profile.as_deref())?;
        ProviderSettings::from_profile(&profile)?
    } else {
        ProviderSettings::from_env()?
    };
    debug!(?settings, "Loaded provider settings");

    let client = settings.build_client(None)?;
    Ok(Reconciler::new(registry).with_client(client, settings.timeouts))
}

/// Reads a JSON configuration document.
fn read_document(path: &Path) -> Result<ConfigDocument> {
    debug!("Loading configuration from: {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProviderError::Config(ConfigError::FileNotFound { path: path.to_path_buf() })
        } else {
            e.into()
        }
    })?;
    serde_json::from_str(&content).map_err(|e| {
        ConfigError::ParseError {
            message: e.to_string(),
            location: Some(format!("{}:{}:{}", path.display(), e.line(), e.column())),
        }
        .into()
    })
}

/// Loads and upgrades the state document, or starts an empty one.
async fn load_state(store: &LocalStateStore, registry: &Registry) -> Result<StateDocument> {
    Ok(store.load(registry).await?.unwrap_or_default().document)
}

/// Asks the user for confirmation on stderr.
fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
