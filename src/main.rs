//! maestro-upload CLI - Upload builds and flows to Maestro and wait for the results.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{Level, debug, info};
use tracing_subscriber::FmtSubscriber;

use maestro_upload::archive::{self, AppFile};
use maestro_upload::ci::CiContext;
use maestro_upload::client::ApiClient;
use maestro_upload::config::{self, Config};
use maestro_upload::params::{self, RequestInputs, ValidationError};
use maestro_upload::poller::{PollError, PollOutcome, StatusPoller};
use maestro_upload::report::{
    Console, JobOutputs, TerminalConsole, publish_outputs, workflow_error_command,
};

/// Workspace directories tried in order when none is given.
const DEFAULT_WORKSPACES: &[&str] = &[".maestro", ".mobiledev"];

#[derive(Parser)]
#[command(name = "maestro-upload")]
#[command(about = "Upload builds and flows to Maestro and wait for the results", long_about = None)]
#[command(version)]
struct Cli {
    /// API key used to authenticate uploads
    #[arg(long, env = "MAESTRO_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Base URL of the upload API
    #[arg(long, env = "MAESTRO_API_URL")]
    api_url: Option<String>,

    /// Project id; uploads go to the project backend when set
    #[arg(long, env = "MAESTRO_PROJECT_ID")]
    project_id: Option<String>,

    /// App binary (.apk, zipped .app, or an .app directory)
    #[arg(long)]
    app_file: Option<String>,

    /// Mapping file (e.g. proguard mapping or dSYM directory)
    #[arg(long)]
    mapping_file: Option<String>,

    /// Workspace directory with the flows [default: .maestro, then .mobiledev]
    #[arg(long)]
    workspace: Option<String>,

    /// Name of the upload
    #[arg(long)]
    name: Option<String>,

    /// Branch the upload is associated with
    #[arg(long)]
    branch: Option<String>,

    /// Environment variable passed to the flows, as KEY=VALUE
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Comma-separated tags; only flows with one of them run
    #[arg(long)]
    include_tags: Option<String>,

    /// Comma-separated tags; flows with one of them are skipped
    #[arg(long)]
    exclude_tags: Option<String>,

    /// Android API level of the device
    #[arg(long)]
    android_api_level: Option<u32>,

    /// iOS major version of the device
    #[arg(long)]
    ios_version: Option<u32>,

    /// Device locale, e.g. de_DE
    #[arg(long)]
    device_locale: Option<String>,

    /// Reuse an app binary uploaded before instead of sending one
    #[arg(long)]
    app_binary_id: Option<String>,

    /// Return right after the upload instead of waiting for results
    #[arg(long = "async")]
    no_wait: bool,

    /// Minutes to wait for the upload to complete
    #[arg(long, value_name = "MINUTES")]
    timeout: Option<u64>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let console = TerminalConsole;
    match run(cli, &console).await {
        Ok(None) => Ok(()),
        Ok(Some(outcome)) => {
            // The summary is already on the console; only the workflow annotation is left.
            if let Some(message) = outcome.failure_message() {
                annotate_failure(&message);
            }
            std::process::exit(outcome.exit_code());
        }
        Err(e) => {
            let message = match e.downcast_ref::<PollError>() {
                Some(poll_error) => poll_error.to_string(),
                None => format!("Error running Maestro Cloud Upload Action: {:#}", e),
            };
            fail(&console, &message);
            std::process::exit(1);
        }
    }
}

/// Uploads and, unless asked not to, waits for the outcome.
///
/// Returns `None` when the run does not wait for completion.
async fn run(cli: Cli, console: &TerminalConsole) -> Result<Option<PollOutcome>> {
    let config = match &cli.config {
        Some(path) => {
            let config = config::load_config(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            info!("Loaded configuration from {}", path.display());
            config
        }
        None => Config::default(),
    };

    let ctx = CiContext::from_env();
    let root = std::env::var_os("GITHUB_WORKSPACE").map(PathBuf::from);
    let root = root.as_deref();

    let inputs = RequestInputs {
        name: cli.name.clone(),
        branch: cli.branch.clone(),
        env: cli.env.clone(),
        include_tags: cli.include_tags.clone(),
        exclude_tags: cli.exclude_tags.clone(),
        android_api_level: cli.android_api_level,
        ios_version: cli.ios_version,
        app_binary_id: cli.app_binary_id.clone(),
        device_locale: cli.device_locale.clone(),
    };
    let request = params::build_request(&inputs, &ctx)?;

    let scratch = tempfile::tempdir().context("Failed to create a scratch directory")?;

    let app_file = match cli.app_file.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(path) => Some(prepare_app_file(path, root, scratch.path())?),
        None if request.app_binary_id.is_some() => None,
        None => return Err(ValidationError::MissingApp.into()),
    };

    let workspace = resolve_workspace(cli.workspace.as_deref(), &config, root, console)?;
    let workspace_zip = scratch.path().join("workspace.zip");
    let excludes: Vec<&str> = config.upload.excludes.iter().map(String::as_str).collect();
    archive::zip_folder(&workspace, &workspace_zip, None, &excludes)
        .with_context(|| format!("Failed to package workspace {}", workspace.display()))?;

    let mapping_file = match cli.mapping_file.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(path) => {
            let path = params::existing_path(path, root)?;
            Some(archive::zip_if_folder(&path, scratch.path())?)
        }
        None => None,
    };

    let mut api = config.api.clone();
    if cli.project_id.is_some() {
        api.project_id = cli.project_id.clone();
    }
    let api_url = cli.api_url.clone().unwrap_or_else(|| api.url.clone());
    let target = api.backend_target();
    debug!(backend = target.name(), api_url = %api_url, "Backend selected");

    let client = ApiClient::new(cli.api_key.clone(), api_url, target.clone())?;

    console.info("Uploading to Maestro Cloud");
    let job = client
        .upload(
            &request,
            app_file.as_ref().map(|f| f.path.as_path()),
            Some(workspace_zip.as_path()),
            mapping_file.as_deref(),
        )
        .await
        .context("Upload failed")?;

    console.info(&format!(
        "Visit the web console for more details about the upload: {}\n",
        job.console_url
    ));
    publish_outputs(&JobOutputs::for_upload(&target, &job))
        .context("Failed to write workflow outputs")?;

    if cli.no_wait {
        info!(upload_id = %job.upload_id, "Not waiting for the upload to complete");
        return Ok(None);
    }

    let mut settings = config.polling.poll_settings();
    if let Some(minutes) = cli.timeout {
        settings.timeout = std::time::Duration::from_secs(minutes.saturating_mul(60));
    }

    let poller = StatusPoller::new(client, Arc::new(TerminalConsole), settings);
    let outcome = poller.poll(&job).await?;

    if let PollOutcome::Completed(summary) = &outcome {
        publish_outputs(&summary.outputs).context("Failed to write workflow outputs")?;
    }

    Ok(Some(outcome))
}

/// Resolves the app file, packaging `.app` directories first.
fn prepare_app_file(path: &str, root: Option<&Path>, scratch: &Path) -> Result<AppFile> {
    let path = params::existing_path(path, root)?;
    let packaged = archive::zip_if_folder(&path, scratch)
        .with_context(|| format!("Failed to package {}", path.display()))?;
    let app = archive::validate_app_file(&packaged)?;
    debug!(file_type = app.file_type.as_str(), path = %app.path.display(), "App file");
    Ok(app)
}

/// Picks the workspace directory: the flag, then the config file, then the
/// first default directory that exists.
fn resolve_workspace(
    explicit: Option<&str>,
    config: &Config,
    root: Option<&Path>,
    console: &dyn Console,
) -> Result<PathBuf, ValidationError> {
    let explicit = explicit
        .filter(|w| !w.trim().is_empty())
        .map(|w| params::resolve_path(w, root))
        .or_else(|| config.upload.workspace.clone());

    if let Some(workspace) = explicit {
        return if workspace.is_dir() {
            Ok(workspace)
        } else {
            Err(ValidationError::MissingWorkspace(workspace))
        };
    }

    for candidate in DEFAULT_WORKSPACES {
        let path = params::resolve_path(candidate, root);
        if path.is_dir() {
            console.info(&format!("Packaging {} folder", candidate));
            return Ok(path);
        }
    }

    list_directory(root.unwrap_or(Path::new(".")));
    Err(ValidationError::NoDefaultWorkspace)
}

fn list_directory(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    println!("Directory contents:");
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.path().is_dir() {
            println!("{}/", name);
        } else {
            println!("{}", name);
        }
    }
}

fn fail(console: &dyn Console, message: &str) {
    console.err(message);
    annotate_failure(message);
}

/// Emits an `::error::` workflow command when running on GitHub Actions.
fn annotate_failure(message: &str) {
    if std::env::var("GITHUB_ACTIONS").as_deref() == Ok("true") {
        println!("{}", workflow_error_command(message));
    }
}
