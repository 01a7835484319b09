//! Thin CLI layer: parse args, styled output, and call into liman-core.
//! Crash-proof: panic caught and reported; all errors return Result.

use clap::{Arg, ArgAction, Command};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use liman_core::{
    cache_dir, Cache, CancellationToken, Catalog, Failure, FileLogger, HostEnvironment,
    LibraryInstallationState, Logger, Manifest, NamingScheme, OperationResult, Provider,
    ProviderRegistry, Restorer, CDNJS_PROVIDER_ID, MANIFEST_NAME,
};
use liman_core::validator::{expand_entry, Validator};

mod output;
use output::{dim, error, info, print_results, print_search_hits, success, use_color};

const SEARCH_LIMIT: usize = 25;

struct App {
    cache: Arc<Cache>,
    registry: Arc<ProviderRegistry>,
    restorer: Restorer,
    manifest_path: PathBuf,
    token: CancellationToken,
}

fn wire_up() -> Result<App, String> {
    let cwd = env::current_dir().map_err(|e| e.to_string())?;
    let cache_root = cache_dir();
    let host = Arc::new(HostEnvironment::new(&cwd, &cache_root));
    let cache = Arc::new(Cache::new(&cache_root));
    let registry = Arc::new(ProviderRegistry::with_default_providers(cache.clone(), host.clone()));
    let logger: Arc<dyn Logger> = Arc::new(FileLogger::new(&cache_root));
    let restorer = Restorer::new(registry.clone(), host, logger);
    Ok(App {
        cache,
        registry,
        restorer,
        manifest_path: cwd.join(MANIFEST_NAME),
        token: CancellationToken::new(),
    })
}

/// Run a task behind a spinner when quiet mode hides the per-library lines.
fn with_spinner<T>(message: &str, show: bool, f: impl FnOnce() -> T) -> T {
    if !show || !use_color() {
        return f();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⠈⠐⠠⠰⠸⠹")
            .template("{spinner:.dim} {msg}")
            .unwrap(),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    let result = f();
    spinner.finish_and_clear();
    result
}

fn failure_message(failure: &Failure) -> String {
    match failure {
        Failure::Cancelled => "Operation cancelled.".to_string(),
        Failure::Errors(errors) => errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn load_manifest(app: &App) -> Result<Manifest, String> {
    Manifest::load(&app.manifest_path)
        .ok_or_else(|| format!("{} is malformed and could not be parsed", MANIFEST_NAME))
}

/// Validate a candidate manifest; on failure print the results and bail
/// without saving anything.
fn validate_or_bail(app: &App, manifest: &Manifest) -> Result<Vec<OperationResult>, String> {
    let validator = Validator::new(&app.registry);
    let results = validator.validate_manifest(Some(manifest), &app.token);
    if results.iter().all(|r| r.success) {
        Ok(results)
    } else {
        print_results(&results);
        Err("The manifest did not validate; nothing was changed.".to_string())
    }
}

/// Fill in the latest catalog version when the id carries none (only for
/// schemes that have a version segment at all).
fn resolve_latest(app: &App, provider_id: &str, library_id: &str) -> Result<String, String> {
    let provider = app
        .registry
        .get(provider_id)
        .ok_or_else(|| format!("Provider \"{}\" is not registered", provider_id))?;
    let scheme = provider.naming_scheme();
    let (name, version) = scheme.parse(library_id).map_err(|e| e.to_string())?;
    if !version.is_empty() || scheme.separator().is_none() {
        return Ok(library_id.to_string());
    }
    let latest = provider
        .catalog()
        .get_latest_version(&name, false, &app.token)
        .map_err(|f| failure_message(&f))?
        .ok_or_else(|| format!("No stable version of \"{}\" was found", name))?;
    Ok(scheme.build(&name, &latest))
}

fn install_entry(app: &App, manifest: &Manifest, library_id: &str) -> Result<(), String> {
    let entry = manifest
        .find(library_id)
        .ok_or_else(|| format!("\"{}\" is not in the manifest", library_id))?
        .with_defaults(
            manifest.default_provider.as_deref(),
            manifest.default_destination.as_deref(),
        );
    let state = expand_entry(&entry, &app.registry, &app.token).map_err(|f| failure_message(&f))?;
    let provider_id = state.provider_id.as_deref().unwrap_or("");
    let provider = app
        .registry
        .get(provider_id)
        .ok_or_else(|| format!("Provider \"{}\" is not registered", provider_id))?;
    provider
        .install(&state, &app.token)
        .map_err(|f| failure_message(&f))
}

fn cmd_init(app: &App, provider: Option<&str>, destination: Option<&str>) -> Result<(), String> {
    if app.manifest_path.exists() {
        info(&format!("{} already exists.", MANIFEST_NAME));
        return Ok(());
    }
    let mut manifest = Manifest::default();
    manifest.default_provider = provider.map(str::to_string);
    manifest.default_destination = destination.map(str::to_string);
    manifest.save(&app.manifest_path)?;
    success(&format!("Created {}.", MANIFEST_NAME));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_install(
    app: &App,
    library_id: &str,
    provider: Option<&str>,
    destination: Option<&str>,
    files: Vec<String>,
    quiet: bool,
) -> Result<(), String> {
    let mut manifest = load_manifest(app)?;
    let provider_id = provider
        .map(str::to_string)
        .or_else(|| manifest.default_provider.clone())
        .unwrap_or_else(|| CDNJS_PROVIDER_ID.to_string());
    let library_id = with_spinner("Resolving version…", quiet, || {
        resolve_latest(app, &provider_id, library_id)
    })?;

    let mut entry = LibraryInstallationState::new(library_id.clone());
    if provider.is_some() || manifest.default_provider.as_deref() != Some(provider_id.as_str()) {
        entry.provider_id = Some(provider_id);
    }
    entry.destination_path = destination.map(str::to_string);
    if !files.is_empty() {
        entry.files = Some(files);
    }

    manifest.upsert(entry);
    with_spinner("Validating…", quiet, || validate_or_bail(app, &manifest))?;
    manifest.save(&app.manifest_path)?;
    with_spinner("Installing…", quiet, || install_entry(app, &manifest, &library_id))?;
    success(&format!("Installed \"{}\".", library_id));
    Ok(())
}

fn cmd_uninstall(app: &App, library_id: &str) -> Result<(), String> {
    let mut manifest = load_manifest(app)?;
    let result = app.restorer.uninstall(&manifest, library_id, &app.token);
    if !result.success {
        print_results(&[result]);
        return Err(format!("Failed to uninstall \"{}\".", library_id));
    }
    manifest.remove(library_id);
    manifest.save(&app.manifest_path)?;
    success(&format!("Removed \"{}\".", library_id));
    Ok(())
}

fn cmd_restore(app: &App, quiet: bool, json: bool) -> Result<(), String> {
    let manifest = Manifest::load(&app.manifest_path);
    let results = with_spinner("Restoring libraries…", quiet, || {
        app.restorer.restore(manifest.as_ref(), &app.token)
    });
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).map_err(|e| e.to_string())?
        );
        if results.iter().all(|r| r.success) {
            return Ok(());
        }
        return Err("Restore finished with failures.".to_string());
    }
    if results.is_empty() {
        dim("Nothing to restore.");
        return Ok(());
    }
    if print_results(&results) {
        Ok(())
    } else {
        Err("Restore finished with failures.".to_string())
    }
}

fn cmd_update(app: &App, library_id: &str, include_prerelease: bool) -> Result<(), String> {
    let mut manifest = load_manifest(app)?;
    let entry = manifest
        .find(library_id)
        .ok_or_else(|| format!("\"{}\" is not in the manifest", library_id))?
        .clone();
    let provider_id = entry
        .provider_id
        .clone()
        .or_else(|| manifest.default_provider.clone())
        .unwrap_or_else(|| CDNJS_PROVIDER_ID.to_string());
    let provider = app
        .registry
        .get(&provider_id)
        .ok_or_else(|| format!("Provider \"{}\" is not registered", provider_id))?;
    let scheme = provider.naming_scheme();
    let (name, current) = scheme.parse(library_id).map_err(|e| e.to_string())?;
    let latest = provider
        .catalog()
        .get_latest_version(&name, include_prerelease, &app.token)
        .map_err(|f| failure_message(&f))?;
    let Some(latest) = latest else {
        dim(&format!("No update available for \"{}\".", library_id));
        return Ok(());
    };
    if latest == current {
        success(&format!("\"{}\" is already up to date.", library_id));
        return Ok(());
    }

    let new_id = scheme.build(&name, &latest);
    let mut updated = entry;
    updated.library_id = new_id.clone();
    manifest.remove(library_id);
    manifest.upsert(updated);
    validate_or_bail(app, &manifest)?;
    manifest.save(&app.manifest_path)?;
    install_entry(app, &manifest, &new_id)?;
    success(&format!("Updated \"{}\" to \"{}\".", library_id, new_id));
    Ok(())
}

fn cmd_search(app: &App, term: &str, provider_id: &str) -> Result<(), String> {
    let provider = app
        .registry
        .get(provider_id)
        .ok_or_else(|| format!("Provider \"{}\" is not registered", provider_id))?;
    let hits = provider
        .catalog()
        .search(term, SEARCH_LIMIT, &app.token)
        .map_err(|f| failure_message(&f))?;
    print_search_hits(&hits);
    Ok(())
}

fn cmd_cache_list(app: &App) -> Result<(), String> {
    let mut any = false;
    for provider_id in app.registry.ids() {
        let cached = app.cache.list_cached_libraries(provider_id);
        if cached.is_empty() {
            continue;
        }
        any = true;
        info(&format!("{} ({})", provider_id, cached.len()));
        for library in cached {
            println!("  {}@{} ({} files)", library.name, library.version, library.files.len());
        }
    }
    if !any {
        dim("Cache is empty.");
    }
    Ok(())
}

fn run() -> Result<(), String> {
    let provider_arg = Arg::new("provider")
        .short('p')
        .long("provider")
        .value_parser(["cdnjs", "unpkg", "filesystem"])
        .help("Provider to resolve the library against");

    let matches = Command::new("liman")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Client-side library manager — manifest-driven, cache-first restore")
        .after_help(
            "Examples:\n  liman init --default-destination wwwroot/lib\n  liman install jquery@3.6.0\n  liman install lodash -p unpkg\n  liman restore\n  liman cache list",
        )
        .subcommand(
            Command::new("init")
                .about("Create a liman.json manifest in the current directory")
                .arg(
                    Arg::new("default-provider")
                        .long("default-provider")
                        .value_parser(["cdnjs", "unpkg", "filesystem"])
                        .help("Provider used by entries that name none"),
                )
                .arg(
                    Arg::new("default-destination")
                        .long("default-destination")
                        .help("Destination used by entries that name none"),
                ),
        )
        .subcommand(
            Command::new("install")
                .about("Add a library to the manifest and install it")
                .arg(
                    Arg::new("library")
                        .required(true)
                        .help("Library id (e.g. jquery@3.6.0, or jquery for the latest)"),
                )
                .arg(provider_arg.clone())
                .arg(
                    Arg::new("destination")
                        .short('d')
                        .long("destination")
                        .help("Directory (relative to the project) to install into"),
                )
                .arg(
                    Arg::new("files")
                        .long("files")
                        .num_args(1..)
                        .help("Only install these files instead of everything the library offers"),
                )
                .arg(
                    Arg::new("quiet")
                        .short('q')
                        .long("quiet")
                        .action(ArgAction::SetTrue)
                        .help("Minimal output; show spinner when busy"),
                ),
        )
        .subcommand(
            Command::new("uninstall")
                .about("Remove a library's files and its manifest entry")
                .arg(Arg::new("library").required(true).help("Library id to remove")),
        )
        .subcommand(
            Command::new("restore")
                .about("Install everything the manifest declares")
                .arg(
                    Arg::new("quiet")
                        .short('q')
                        .long("quiet")
                        .action(ArgAction::SetTrue)
                        .help("Minimal output; show spinner when busy"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output machine-readable JSON results"),
                ),
        )
        .subcommand(
            Command::new("update")
                .about("Update a library to the latest catalog version")
                .arg(Arg::new("library").required(true).help("Library id to update"))
                .arg(
                    Arg::new("pre")
                        .long("pre")
                        .action(ArgAction::SetTrue)
                        .help("Consider prerelease versions"),
                ),
        )
        .subcommand(
            Command::new("search")
                .about("Search a provider's catalog")
                .arg(Arg::new("term").required(true).help("Search term"))
                .arg(provider_arg),
        )
        .subcommand(
            Command::new("cache")
                .about("Manage the local library cache")
                .subcommand(Command::new("list").about("List cached libraries per provider"))
                .subcommand(Command::new("clean").about("Remove the whole cache")),
        )
        .get_matches();

    let app = wire_up()?;

    match matches.subcommand() {
        Some(("init", sub)) => cmd_init(
            &app,
            sub.get_one::<String>("default-provider").map(String::as_str),
            sub.get_one::<String>("default-destination").map(String::as_str),
        ),
        Some(("install", sub)) => {
            let quiet = sub.get_flag("quiet");
            if quiet {
                env::set_var("LIMAN_QUIET", "1");
            }
            let files: Vec<String> = sub
                .get_many::<String>("files")
                .map(|it| it.cloned().collect())
                .unwrap_or_default();
            cmd_install(
                &app,
                sub.get_one::<String>("library").map(String::as_str).unwrap_or_default(),
                sub.get_one::<String>("provider").map(String::as_str),
                sub.get_one::<String>("destination").map(String::as_str),
                files,
                quiet,
            )
        }
        Some(("uninstall", sub)) => cmd_uninstall(
            &app,
            sub.get_one::<String>("library").map(String::as_str).unwrap_or_default(),
        ),
        Some(("restore", sub)) => {
            let quiet = sub.get_flag("quiet");
            let json = sub.get_flag("json");
            if quiet || json {
                env::set_var("LIMAN_QUIET", "1");
            }
            cmd_restore(&app, quiet, json)
        }
        Some(("update", sub)) => cmd_update(
            &app,
            sub.get_one::<String>("library").map(String::as_str).unwrap_or_default(),
            sub.get_flag("pre"),
        ),
        Some(("search", sub)) => cmd_search(
            &app,
            sub.get_one::<String>("term").map(String::as_str).unwrap_or_default(),
            sub.get_one::<String>("provider").map(String::as_str).unwrap_or(CDNJS_PROVIDER_ID),
        ),
        Some(("cache", sub)) => match sub.subcommand() {
            Some(("list", _)) => cmd_cache_list(&app),
            Some(("clean", _)) => {
                app.cache.clean()?;
                success("Cache cleaned.");
                Ok(())
            }
            _ => {
                dim("Use `liman cache list` or `liman cache clean`.");
                Ok(())
            }
        },
        _ => {
            if use_color() {
                println!("{}", "liman".bright_cyan().bold());
                dim("Client-side library manager — manifest-driven, cache-first restore.");
            } else {
                println!("liman — client-side library manager");
            }
            dim("\nRun `liman --help` for details.");
            Ok(())
        }
    }
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&e);
            1
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}
