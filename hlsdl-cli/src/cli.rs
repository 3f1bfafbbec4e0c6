use clap::Parser;
use hlsdl_engine::output::OverwritePolicy;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Download HTTP Live Streaming (HLS) content",
    long_about = "Download HTTP Live Streaming (HLS) content into a single file.\n\
                  \n\
                  The manifest is parsed while it downloads and every segment is\n\
                  appended to the output in playlist order. By default the stream is\n\
                  remuxed through ffmpeg; use --no-remux to keep the raw MPEG-TS.\n\
                  \n\
                  Run without arguments to be prompted for the output file and URL."
)]
pub struct CliArgs {
    /// Manifest URL
    #[arg(value_name = "URL", help = "URL of the .m3u8 manifest")]
    pub url: Option<String>,

    /// Output file
    #[arg(
        value_name = "OUTPUT",
        help = "Output file name, or '-' to write the raw stream to stdout"
    )]
    pub output: Option<String>,

    /// What to do when the output file exists
    #[arg(
        short = 'o',
        long,
        default_value = "fail",
        help = "Policy when the output file exists (fail, uniq, overwrite)",
        value_parser = ["fail", "uniq", "overwrite"]
    )]
    pub overwrite: String,

    /// Write the raw stream instead of remuxing it
    #[arg(long, help = "Do not pipe the stream through ffmpeg")]
    pub no_remux: bool,

    /// Remux program
    #[arg(
        long,
        default_value = "ffmpeg",
        help = "Program used to remux the stream"
    )]
    pub ffmpeg: String,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Custom HTTP headers for download requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// Referer forwarded with every request
    #[arg(long, help = "Referer header sent with manifest and segment requests")]
    pub referer: Option<String>,

    /// User agent forwarded with every request
    #[arg(long, help = "User-Agent header sent with manifest and segment requests")]
    pub user_agent: Option<String>,

    /// Overall timeout in seconds
    #[arg(
        long,
        default_value = "0",
        help = "Overall timeout in seconds for a single HTTP request (0 disables it)"
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    /// Segment stall timeout with optional unit (s, m, h)
    #[arg(
        long,
        default_value = "60s",
        help = "Fail when a segment delivers no data for this long, with optional unit (s, m, h). Use 0 to wait forever."
    )]
    pub stall_timeout: String,

    /// Proxy URL (e.g., "http://proxy.example.com:8080")
    #[arg(
        long,
        help = "Proxy server URL for downloads (e.g., \"http://proxy.example.com:8080\")"
    )]
    pub proxy: Option<String>,

    /// Proxy type (http, https, socks5, all)
    #[arg(
        long,
        default_value = "all",
        help = "Proxy type (http, https, socks5, all)",
        value_parser = ["http", "https", "socks5", "all"]
    )]
    pub proxy_type: String,

    /// Proxy username
    #[arg(long, help = "Username for proxy authentication")]
    pub proxy_user: Option<String>,

    /// Proxy password
    #[arg(long, help = "Password for proxy authentication")]
    pub proxy_pass: Option<String>,

    /// Disable all proxy settings for downloads
    #[arg(
        long,
        help = "Disable all proxy settings (including system proxy) for downloads"
    )]
    pub no_proxy: bool,

    /// Show a progress bar
    #[arg(
        short = 'P',
        long = "progress",
        help = "Show a progress bar while downloading"
    )]
    pub show_progress: bool,

    /// List the segments instead of downloading them
    #[arg(
        long,
        help = "Fetch and parse the manifest, print each segment's duration and URL, then exit"
    )]
    pub dry_run: bool,
}

impl CliArgs {
    pub fn overwrite_policy(&self) -> OverwritePolicy {
        self.overwrite.parse().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_and_flags() {
        let args = CliArgs::try_parse_from([
            "hlsdl",
            "-o",
            "uniq",
            "--no-remux",
            "-H",
            "X-Token: abc",
            "http://h/index.m3u8",
            "out.mp4",
        ])
        .unwrap();
        assert_eq!(args.url.as_deref(), Some("http://h/index.m3u8"));
        assert_eq!(args.output.as_deref(), Some("out.mp4"));
        assert_eq!(args.overwrite_policy(), OverwritePolicy::Unique);
        assert!(args.no_remux);
        assert_eq!(args.headers, ["X-Token: abc"]);
    }

    #[test]
    fn test_dry_run_needs_only_url() {
        let args = CliArgs::try_parse_from(["hlsdl", "--dry-run", "http://h/index.m3u8"]).unwrap();
        assert!(args.dry_run);
        assert_eq!(args.output, None);
    }

    #[test]
    fn test_rejects_unknown_policy() {
        assert!(CliArgs::try_parse_from(["hlsdl", "-o", "append"]).is_err());
    }
}
