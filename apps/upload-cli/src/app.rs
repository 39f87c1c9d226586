//! Command-line surface and command handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cinevision_protocol::{ProgressSnapshot, UploadTarget};
use cinevision_transfer::{format_bytes, format_duration};
use cinevision_uploader::{
    BatchManifest, HttpControlPlane, HttpPartStore, ResumeState, UploadError, UploadOptions,
    Uploader, run_batch,
};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};

use crate::config::Config;

/// Progress is logged at info level every this many parts.
const PROGRESS_EVERY_PARTS: u32 = 10;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Control-plane API base URL
    #[arg(long, global = true)]
    pub api_url: Option<String>,
    /// Bearer token for the control plane
    #[arg(long, global = true)]
    pub token: Option<String>,
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload one file to a content-language slot
    Upload {
        /// File to upload
        file: PathBuf,
        /// Content-language record the file belongs to
        #[arg(long)]
        content_language_id: String,
        /// MIME type (inferred from the extension when omitted)
        #[arg(long)]
        content_type: Option<String>,
        /// Resume state file; read when present, written when interrupted
        #[arg(long)]
        resume_file: Option<PathBuf>,
        #[command(flatten)]
        tuning: Tuning,
    },
    /// Upload every job in a TOML manifest, one after another
    Batch {
        /// Path to the batch manifest
        manifest: PathBuf,
        /// Seconds to wait between jobs
        #[arg(long)]
        pause_secs: Option<u64>,
        #[command(flatten)]
        tuning: Tuning,
    },
}

/// Per-run overrides of the configured transfer settings.
#[derive(Debug, Default, Args)]
pub struct Tuning {
    /// Part size in MiB
    #[arg(long)]
    pub chunk_size_mib: Option<u64>,
    /// Parts uploaded concurrently
    #[arg(long)]
    pub parallelism: Option<usize>,
    /// Total attempts per part
    #[arg(long)]
    pub max_retries: Option<u32>,
    /// Give up on a file after this many seconds
    #[arg(long)]
    pub deadline_secs: Option<u64>,
    /// Leave the remote session open when a part fails
    #[arg(long)]
    pub keep_on_failure: bool,
}

impl Cli {
    /// Applies global flag overrides on top of the loaded configuration.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(url) = &self.api_url {
            config.api_url = url.clone();
        }
        if let Some(token) = &self.token {
            config.api_token = Some(token.clone());
        }
        config
    }
}

impl Tuning {
    /// Overlays the per-run flags on the configured transfer settings.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(mib) = self.chunk_size_mib {
            config.chunk_size_mib = mib;
        }
        if let Some(parallelism) = self.parallelism {
            config.parallelism = parallelism;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        config
    }
}

/// Builds upload options from configuration and per-run flags.
fn upload_options(config: &Config, tuning: &Tuning) -> UploadOptions {
    let config = tuning.apply(config.clone());
    UploadOptions {
        chunk_size: config.chunk_size_bytes(),
        max_retries_per_part: config.max_retries,
        parallelism: config.parallelism,
        session_deadline: tuning.deadline_secs.map(Duration::from_secs),
        progress: Some(Arc::new(log_progress)),
        abort_on_failure: !tuning.keep_on_failure,
        ..Default::default()
    }
}

fn log_progress(p: ProgressSnapshot) {
    let eta = format_duration(p.eta_secs.map(Duration::from_secs));
    let speed = format!("{}/s", format_bytes(p.bytes_per_second as u64));
    if p.parts_completed > 0
        && (p.parts_completed % PROGRESS_EVERY_PARTS == 0 || p.is_finished())
    {
        info!(
            upload_id = %p.upload_id,
            parts = %format!("{}/{}", p.parts_completed, p.total_parts),
            percent = %format!("{:.1}", p.percentage()),
            transferred = %format_bytes(p.bytes_transferred),
            speed = %speed,
            eta = %eta,
            "upload progress"
        );
    } else {
        debug!(
            upload_id = %p.upload_id,
            parts_completed = p.parts_completed,
            total_parts = p.total_parts,
            transferred = p.bytes_transferred,
            "upload progress"
        );
    }
}

pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let control = HttpControlPlane::new(
        &config.api_url,
        config.api_token.as_deref(),
        config.request_timeout(),
    )?;
    let store = HttpPartStore::new(config.part_timeout())?;
    let uploader = Uploader::new(Arc::new(control), Arc::new(store));

    let cancel = uploader.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling uploads");
            cancel.cancel();
        }
    });

    match cli.cmd {
        Command::Upload {
            file,
            content_language_id,
            content_type,
            resume_file,
            tuning,
        } => {
            let mut options = upload_options(&config, &tuning);
            options.content_type = content_type;
            let target = UploadTarget::new(content_language_id);
            cmd_upload(&uploader, &file, &target, options, resume_file.as_deref()).await
        }
        Command::Batch {
            manifest,
            pause_secs,
            tuning,
        } => {
            let options = upload_options(&config, &tuning);
            cmd_batch(&uploader, &manifest, pause_secs, &config, options).await
        }
    }
}

async fn cmd_upload(
    uploader: &Uploader,
    file: &Path,
    target: &UploadTarget,
    mut options: UploadOptions,
    resume_file: Option<&Path>,
) -> anyhow::Result<()> {
    if let Some(path) = resume_file {
        // Keep failed sessions open so the file can pick them up again.
        options.abort_on_failure = false;
        if path.exists() {
            let state = ResumeState::load(path)
                .with_context(|| format!("reading resume state {}", path.display()))?;
            info!(
                upload_id = %state.upload_id,
                confirmed = state.confirmed_parts.len(),
                "resuming interrupted upload"
            );
            options.resume = Some(state);
        }
    }

    match uploader.upload(file, target, options).await {
        Ok(done) => {
            if let Some(path) = resume_file
                && path.exists()
            {
                std::fs::remove_file(path)?;
            }
            info!(
                upload_id = %done.upload_id,
                size = %format_bytes(done.total_bytes),
                parts = done.total_parts,
                "upload complete"
            );
            println!("{}", done.object_url);
            Ok(())
        }
        Err(UploadError::Interrupted { resume, source }) => {
            match resume_file {
                Some(path) => {
                    resume.save(path)?;
                    warn!(
                        upload_id = %resume.upload_id,
                        path = %path.display(),
                        "resume state saved, rerun with the same --resume-file to continue"
                    );
                }
                None => warn!(upload_id = %resume.upload_id, "remote session left open"),
            }
            Err(anyhow::Error::new(*source).context("upload interrupted"))
        }
        Err(e) => Err(e.into()),
    }
}

async fn cmd_batch(
    uploader: &Uploader,
    manifest_path: &Path,
    pause_secs: Option<u64>,
    config: &Config,
    options: UploadOptions,
) -> anyhow::Result<()> {
    let manifest = BatchManifest::load(manifest_path)
        .with_context(|| format!("loading manifest {}", manifest_path.display()))?;
    let pause = pause_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| manifest.pause(config.batch_pause()));
    info!(
        jobs = manifest.jobs.len(),
        pause_secs = pause.as_secs(),
        "starting batch"
    );

    let outcomes = run_batch(uploader, &manifest.jobs, &options, pause).await;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(done) => println!(
                "ok     {}  {}  {}",
                outcome.label,
                format_duration(Some(outcome.duration)),
                done.object_url
            ),
            Err(e) => println!(
                "failed {}  {}  {e}",
                outcome.label,
                format_duration(Some(outcome.duration))
            ),
        }
    }

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    let skipped = manifest.jobs.len() - outcomes.len();
    if failed > 0 || skipped > 0 {
        anyhow::bail!(
            "{failed} of {} uploads failed, {skipped} not attempted",
            manifest.jobs.len()
        );
    }
    Ok(())
}
