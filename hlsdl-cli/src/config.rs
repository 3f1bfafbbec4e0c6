use std::time::Duration;

use hlsdl_engine::hls::{HlsConfig, HlsTransferConfig, RequestHeaders};
use hlsdl_engine::{DownloaderConfig, ProxyAuth, ProxyConfig, ProxyType};
use tracing::info;

use crate::cli::CliArgs;
use crate::error::AppError;
use crate::utils::{parse_headers, parse_timeout};

fn proxy_config(args: &CliArgs) -> Result<Option<ProxyConfig>, AppError> {
    if args.no_proxy {
        info!("All proxy settings disabled (--no-proxy flag)");
        return Ok(None);
    }
    let Some(proxy_url) = args.proxy.as_ref() else {
        return Ok(None);
    };

    let proxy_type: ProxyType = args.proxy_type.parse()?;

    // Authentication needs both username and password
    let auth = match (&args.proxy_user, &args.proxy_pass) {
        (Some(username), Some(password)) => Some(ProxyAuth {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    };

    info!(
        proxy_url = %proxy_url,
        proxy_type = ?proxy_type,
        has_auth = auth.is_some(),
        "Using explicit proxy configuration"
    );

    Ok(Some(ProxyConfig {
        url: proxy_url.clone(),
        proxy_type,
        auth,
    }))
}

/// Builds the engine configuration from the command line
pub fn build_hls_config(args: &CliArgs) -> Result<HlsConfig, AppError> {
    info!(
        "HTTP timeout configuration: overall={}s, connect={}s",
        args.timeout, args.connect_timeout
    );

    let mut builder = DownloaderConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout));

    let custom_headers = parse_headers(&args.headers);
    if !custom_headers.is_empty() {
        let mut headers = DownloaderConfig::get_default_headers();
        headers.extend(custom_headers);
        builder = builder.with_headers(headers);
    }

    builder = match proxy_config(args)? {
        Some(proxy) => builder.with_proxy(proxy),
        None => builder.with_system_proxy(!args.no_proxy),
    };

    let transfer_config = HlsTransferConfig {
        segment_stall_timeout: parse_timeout(&args.stall_timeout)?,
        ..Default::default()
    };

    Ok(HlsConfig {
        base: builder.build(),
        transfer_config,
        request_headers: RequestHeaders::new(args.referer.clone(), args.user_agent.clone()),
    })
}
