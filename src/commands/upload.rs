use crate::config::{self, LoginConfig};
use crate::error::UploadError;
use crate::group::{self, GroupBy};
use crate::manifest;
use crate::metadata;
use crate::plan::{self, PlanOptions};
use crate::platform::{Credentials, HttpPlatform, Platform, ProjectInfo};
use crate::rt::block_on;
use crate::upload::{self, UploadOptions, UploadReport};
use crate::scan;
use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::Table;
use comfy_table::presets::UTF8_FULL;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
pub struct UploadArgs {
    /// Project ID to upload to
    #[arg(value_name = "PROJECT-ID")]
    pub project_id: String,

    /// Path of the local folder to upload
    #[arg(value_name = "LOCAL-FOLDER-PATH")]
    pub local_folder_path: PathBuf,

    /// Folder to upload to inside the project
    #[arg(short = 'r', long, value_name = "PATH")]
    pub remote_folder_path: Option<String>,

    /// Platform username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Platform password
    #[arg(short, long)]
    pub password: Option<String>,

    /// URL of the platform server (optional if a login entry exists)
    #[arg(long)]
    pub url: Option<String>,

    /// Maximum number of child folders or files under one remote folder
    #[arg(short = 'd', long, value_name = "N", default_value_t = config::MAX_CHILDREN_PER_CONTAINER)]
    pub limit: usize,

    /// Maximum traversal and folder nesting depth
    #[arg(long, value_name = "N", default_value_t = 20)]
    pub max_depth: usize,

    /// Number of concurrent upload workers (default: CPU count)
    #[arg(short, long, value_name = "N")]
    pub threads: Option<usize>,

    /// How files are bucketed into remote folders
    #[arg(long, value_enum, default_value = "study")]
    pub group_by: GroupBy,

    /// Create a manifest file instead of uploading
    #[arg(long)]
    pub manifest_only: bool,

    /// Dry run only, do not create any folders or files remotely
    #[arg(long)]
    pub dry_run: bool,

    /// Print out additional processing information
    #[arg(short, long)]
    pub verbose: bool,

    /// Set the logging level
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,
}

pub fn upload(args: UploadArgs) -> Result<()> {
    let threads = args
        .threads
        .unwrap_or_else(config::default_thread_count)
        .max(1);
    block_on(async move { run(args, threads).await })?
}

async fn run(args: UploadArgs, threads: usize) -> Result<()> {
    if args.dry_run {
        info!("~~ Dry Run ~~");
    }

    // Authentication happens before any local work so a bad login aborts
    // the run immediately. Manifest generation is fully offline.
    let session = if args.manifest_only {
        None
    } else {
        let (url, credentials) = resolve_credentials(&args)?;
        let platform: Arc<dyn Platform> = Arc::new(HttpPlatform::new(url.as_str())?);
        let project = start_session(platform.clone(), &credentials, &args.project_id).await?;
        info!("Upload to project: {} ({})", project.name, project.id);
        Some((platform, project))
    };

    info!("Upload directory: {}", args.local_folder_path.display());
    info!("Loading files...");
    let mut files = scan::scan_directory(&args.local_folder_path, args.max_depth)?;
    files = tokio::task::spawn_blocking(move || {
        for file in &mut files {
            metadata::enrich(file);
        }
        files
    })
    .await
    .context("metadata pass failed")?;
    let total_bytes: u64 = files.iter().map(|f| f.size).sum();
    info!("Total size: {total_bytes} bytes");

    let groups = group::group_files(files, args.group_by);
    let upload_plan = plan::build_plan(
        groups,
        &PlanOptions {
            remote_path: args.remote_folder_path.clone(),
            limit: args.limit,
            max_depth: args.max_depth,
        },
    )?;
    info!("Total folders: {}", upload_plan.container_count());
    info!("Total files: {}", upload_plan.total_files);

    match session {
        None => {
            info!("Generating manifest file...");
            let rows = manifest::write_manifest(&upload_plan, Path::new(manifest::MANIFEST_FILE))?;
            info!("{rows} rows written");
            Ok(())
        }
        Some((platform, project)) => {
            info!("Max threads: {threads}");
            info!("Uploading files...");
            let opts = UploadOptions {
                threads,
                dry_run: args.dry_run,
                verbose: args.verbose,
            };
            let total = upload_plan.total_files;
            let report = upload::run_plan(platform, &project, upload_plan, &opts).await?;
            print_summary(&report);

            if !report.failed.is_empty() {
                anyhow::bail!("{} of {total} uploads failed", report.failed.len());
            }
            if args.dry_run {
                info!("Dry run completed.");
            } else {
                info!("Upload completed.");
            }
            Ok(())
        }
    }
}

/// Log in and fetch the target project. Nothing else may touch the platform
/// until this has succeeded.
async fn start_session(
    platform: Arc<dyn Platform>,
    credentials: &Credentials,
    project_id: &str,
) -> Result<ProjectInfo, UploadError> {
    info!("Logging in...");
    platform.authenticate(credentials).await?;
    platform.get_project(project_id).await
}

/// Flags win over environment variables, which win over the stored login
/// entry.
fn resolve_credentials(args: &UploadArgs) -> Result<(String, Credentials)> {
    let stored = LoginConfig::load().unwrap_or_default();
    let entry = match &args.url {
        Some(url) => stored.find_entry_by_url(url).ok().cloned(),
        None => stored.single_entry().ok().cloned(),
    };

    let url = args
        .url
        .clone()
        .or_else(|| entry.as_ref().map(|e| e.url.clone()))
        .context("no platform URL configured; pass --url or run `studyup login`")?;

    let username = args
        .username
        .clone()
        .or_else(|| std::env::var(config::USERNAME_ENV).ok())
        .or_else(|| entry.as_ref().map(|e| e.username.clone()));
    let password = args
        .password
        .clone()
        .or_else(|| std::env::var(config::PASSWORD_ENV).ok())
        .or_else(|| entry.as_ref().map(|e| e.password.clone()));

    match (username, password) {
        (Some(username), Some(password)) if !username.is_empty() => {
            Ok((url, Credentials { username, password }))
        }
        _ => Err(UploadError::Authentication(format!(
            "no credentials supplied; pass --username/--password, set {}/{}, or run `studyup login`",
            config::USERNAME_ENV,
            config::PASSWORD_ENV,
        ))
        .into()),
    }
}

fn print_summary(report: &UploadReport) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["result", "count"]);
    table.add_row(vec![
        "folders created".to_string(),
        report.folders_created.to_string(),
    ]);
    table.add_row(vec![
        "files uploaded".to_string(),
        report.uploaded.to_string(),
    ]);
    table.add_row(vec![
        "files failed".to_string(),
        report.failed.len().to_string(),
    ]);
    println!("{table}");

    for (path, reason) in &report.failed {
        warn!("Failed: {} - {reason}", path.display());
    }
}
