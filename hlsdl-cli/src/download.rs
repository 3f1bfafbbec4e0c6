use std::io::Write;

use hlsdl_engine::create_client;
use hlsdl_engine::hls::fetcher::SegmentFetcher;
use hlsdl_engine::hls::{
    DownloadCoordinator, TransferSnapshot, base_url, parse_manifest, segment_url,
};
use tokio::io::AsyncReadExt;
use hlsdl_engine::output::{OutputTarget, open_output, resolve_output_path};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::build_hls_config;
use crate::error::AppError;
use crate::utils::progress::ProgressManager;
use crate::utils::prompt;

/// What to download and where to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub output: String,
}

/// Takes the URL and output from the command line, or prompts for both.
pub async fn resolve_request(args: &CliArgs) -> Result<DownloadRequest, AppError> {
    match (&args.url, &args.output) {
        (Some(url), Some(output)) => Ok(DownloadRequest {
            url: url.clone(),
            output: output.clone(),
        }),
        (None, None) => {
            let request = tokio::task::spawn_blocking(|| -> std::io::Result<DownloadRequest> {
                let stdin = std::io::stdin();
                let mut input = stdin.lock();
                let mut prompt_out = std::io::stderr();
                let output = prompt::read_output_filename(&mut input, &mut prompt_out)?;
                let url = prompt::read_url(&mut input, &mut prompt_out)?;
                Ok(DownloadRequest { url, output })
            })
            .await??;
            Ok(request)
        }
        _ => Err(AppError::InvalidInput(
            "expected both <URL> and <OUTPUT>, or neither to be prompted".to_string(),
        )),
    }
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    warn!("Interrupted, stopping download");
                    cancel.cancel();
                }
            }
            _ = cancel.cancelled() => {}
        }
    });
}

/// Downloads `request` and reports progress until the transfer ends.
pub async fn run_download(args: &CliArgs, request: DownloadRequest) -> Result<(), AppError> {
    let coordinator = DownloadCoordinator::new(build_hls_config(args)?)?;

    let target = resolve_output_path(&request.output, args.overwrite_policy())?;
    // Remuxing needs a file to write to
    let remux_program = match &target {
        OutputTarget::File { .. } if !args.no_remux => Some(args.ffmpeg.as_str()),
        _ => None,
    };
    if let OutputTarget::File { path, .. } = &target {
        info!(url = %request.url, output = %path.display(), "Starting download");
    } else {
        info!(url = %request.url, "Starting download to stdout");
    }
    let sink = open_output(&target, remux_program).await?;

    let cancel = coordinator.cancellation_token();
    cancel_on_ctrl_c(cancel.clone());

    let (mut progress_rx, handle) = coordinator.start(&request.url, sink).await?;

    let progress = if args.show_progress {
        ProgressManager::new()
    } else {
        ProgressManager::new_disabled()
    };
    let mut last: Option<TransferSnapshot> = None;
    while let Some(snapshot) = progress_rx.recv().await {
        progress.handle_snapshot(&snapshot);
        last = Some(snapshot);
    }
    if let Some(snapshot) = &last {
        progress.finish(snapshot);
    }

    let result = handle.await?;
    // Stops the Ctrl-C watcher
    cancel.cancel();
    result?;
    Ok(())
}

/// Prints `<duration>\t<url>` for every segment of the manifest at `url`.
pub async fn list_segments(
    args: &CliArgs,
    url: &str,
    out: &mut impl Write,
) -> Result<(), AppError> {
    let config = build_hls_config(args)?;
    let base = base_url(url)
        .map_err(|e| AppError::InvalidInput(format!("invalid manifest URL '{url}': {e}")))?;
    let fetcher = SegmentFetcher::new(
        create_client(&config.base)?,
        config.request_headers.to_header_map(),
    );

    let mut body = Vec::new();
    fetcher.fetch_manifest(url).await?.read_to_end(&mut body).await?;
    let manifest = parse_manifest(&body)?;

    for segment in &manifest.segments {
        writeln!(out, "{:.3}\t{}", segment.duration, segment_url(&base, &segment.uri)?)?;
    }
    info!(
        segments = manifest.segments.len(),
        duration = manifest.total_duration(),
        end_list = manifest.end_list,
        "Manifest listed"
    );
    Ok(())
}
