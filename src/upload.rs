use crate::error::UploadError;
use crate::plan::{ContainerNode, UploadPlan};
use crate::platform::{Platform, ProjectInfo, RemoteId};
use crate::scan::LocalFile;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{error, info};

const MAX_UPLOAD_ATTEMPTS: usize = 5;
const RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub threads: usize,
    pub dry_run: bool,
    pub verbose: bool,
}

#[derive(Debug, Default)]
pub struct UploadReport {
    pub uploaded: usize,
    pub folders_created: usize,
    pub failed: Vec<(PathBuf, String)>,
}

struct Ctx {
    platform: Arc<dyn Platform>,
    /// Folder ids by remote path. Each path gets exactly one creation call;
    /// everyone else awaits the cell and shares the id.
    folders: Mutex<HashMap<String, Arc<OnceCell<RemoteId>>>>,
    semaphore: Semaphore,
    bar: ProgressBar,
    uploaded: AtomicUsize,
    folders_created: AtomicUsize,
    failed: Mutex<Vec<(PathBuf, String)>>,
    dry_run: bool,
    verbose: bool,
}

/// Execute the plan: folders top-down, files within a folder in parallel,
/// sibling subtrees concurrently, all bounded by one worker pool.
///
/// A failed task is recorded and logged without cancelling its siblings; in
/// dry-run mode no mutation call reaches the platform.
pub async fn run_plan(
    platform: Arc<dyn Platform>,
    project: &ProjectInfo,
    plan: UploadPlan,
    opts: &UploadOptions,
) -> anyhow::Result<UploadReport> {
    let bar = ProgressBar::new(plan.total_files as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("#>-"),
    );

    let ctx = Arc::new(Ctx {
        platform,
        folders: Mutex::new(HashMap::new()),
        semaphore: Semaphore::new(opts.threads.max(1)),
        bar,
        uploaded: AtomicUsize::new(0),
        folders_created: AtomicUsize::new(0),
        failed: Mutex::new(Vec::new()),
        dry_run: opts.dry_run,
        verbose: opts.verbose,
    });

    process_node(ctx.clone(), project.id.clone(), plan.root).await?;
    ctx.bar.finish_and_clear();

    Ok(UploadReport {
        uploaded: ctx.uploaded.load(Ordering::SeqCst),
        folders_created: ctx.folders_created.load(Ordering::SeqCst),
        failed: std::mem::take(&mut *ctx.failed.lock().expect("failure list poisoned")),
    })
}

fn process_node(
    ctx: Arc<Ctx>,
    parent: RemoteId,
    node: ContainerNode,
) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send>> {
    Box::pin(async move {
        let folder_id = if node.path.is_empty() {
            // The root stands for the project itself.
            parent
        } else {
            match ensure_folder(&ctx, &parent, &node).await {
                Ok(id) => id,
                Err(err) => {
                    error!("Failed to create folder {}: {err}", node.path);
                    mark_subtree_failed(&ctx, &node, &err.to_string());
                    return Ok(());
                }
            }
        };

        let ContainerNode {
            path,
            children,
            files,
            ..
        } = node;

        let mut tasks = Vec::new();
        for child in children {
            tasks.push(tokio::spawn(process_node(
                ctx.clone(),
                folder_id.clone(),
                child,
            )));
        }
        for file in files {
            let ctx = ctx.clone();
            let folder_id = folder_id.clone();
            let remote_dir = path.clone();
            tasks.push(tokio::spawn(async move {
                upload_one(ctx, folder_id, remote_dir, file).await;
                Ok(())
            }));
        }
        for task in tasks {
            task.await
                .map_err(|err| UploadError::remote("upload worker", err))??;
        }
        Ok(())
    })
}

async fn ensure_folder(
    ctx: &Arc<Ctx>,
    parent: &RemoteId,
    node: &ContainerNode,
) -> Result<RemoteId, UploadError> {
    let cell = {
        let mut folders = ctx.folders.lock().expect("folder map poisoned");
        folders.entry(node.path.clone()).or_default().clone()
    };
    let id = cell
        .get_or_try_init(|| async {
            info!("Processing folder: {}", node.path);
            if ctx.dry_run {
                let count = ctx.folders_created.fetch_add(1, Ordering::SeqCst);
                return Ok::<_, UploadError>(RemoteId(format!("dry{count}")));
            }
            let id = ctx.platform.create_folder(parent, &node.name).await?;
            ctx.folders_created.fetch_add(1, Ordering::SeqCst);
            Ok(id)
        })
        .await?;
    Ok(id.clone())
}

fn mark_subtree_failed(ctx: &Ctx, node: &ContainerNode, reason: &str) {
    fn visit(
        node: &ContainerNode,
        reason: &str,
        failed: &mut Vec<(PathBuf, String)>,
        bar: &ProgressBar,
    ) {
        for file in &node.files {
            failed.push((file.path.clone(), reason.to_string()));
            bar.inc(1);
        }
        for child in &node.children {
            visit(child, reason, failed, bar);
        }
    }
    let mut failed = ctx.failed.lock().expect("failure list poisoned");
    visit(node, reason, &mut failed, &ctx.bar);
}

async fn upload_one(ctx: Arc<Ctx>, parent: RemoteId, remote_dir: String, file: LocalFile) {
    let Ok(_permit) = ctx.semaphore.acquire().await else {
        return;
    };

    let remote_path = if remote_dir.is_empty() {
        file.calculated_name.clone()
    } else {
        format!("{remote_dir}/{}", file.calculated_name)
    };
    let mut log_line = format!("Processing file: {} -> {remote_path}", file.path.display());
    if ctx.verbose {
        for (key, value) in &file.annotations {
            log_line.push_str(&format!("\n    -> {key}: {value}"));
        }
    }
    info!("{log_line}");

    if ctx.dry_run {
        ctx.uploaded.fetch_add(1, Ordering::SeqCst);
        ctx.bar.inc(1);
        return;
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        match ctx
            .platform
            .upload_file(
                &parent,
                &file.path,
                &file.calculated_name,
                &file.annotations,
            )
            .await
        {
            Ok(_) => {
                ctx.uploaded.fetch_add(1, Ordering::SeqCst);
                break;
            }
            Err(err) if attempt < MAX_UPLOAD_ATTEMPTS => {
                error!("Error uploading {}: {err}", file.path.display());
                info!("Retrying: {}", file.path.display());
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(err) => {
                error!("Failed to upload file: {}", file.path.display());
                ctx.failed
                    .lock()
                    .expect("failure list poisoned")
                    .push((file.path.clone(), err.to_string()));
                break;
            }
        }
    }
    ctx.bar.inc(1);
}
