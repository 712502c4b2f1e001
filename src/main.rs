use anyhow::Context;
use clap::Parser;
use htmlshot::{start_server, RendererConfig, ServerConfig};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

/// Render HTML fragments to images over HTTP
#[derive(Parser, Debug)]
#[command(name = "htmlshot", version, about)]
struct Args {
    /// Interface to listen on
    #[arg(long, env = "HTMLSHOT_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Preferred port; the next ports are tried when it is taken
    #[arg(short, long, env = "HTMLSHOT_PORT", default_value_t = 3000)]
    port: u16,

    /// Further ports to try when the preferred one is in use
    #[arg(long, env = "HTMLSHOT_MAX_ATTEMPTS", default_value_t = 10)]
    max_attempts: u32,

    /// Static asset directory (serves `/`)
    #[arg(long, env = "HTMLSHOT_PUBLIC_DIR", default_value = "public")]
    public_dir: PathBuf,

    /// Directory for generated images [default: <public-dir>/generated]
    #[arg(long, env = "HTMLSHOT_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Largest accepted width or height in pixels
    #[arg(long, env = "HTMLSHOT_MAX_DIMENSION", default_value_t = 16384)]
    max_dimension: u32,

    /// Script tag source injected into every page
    #[arg(long, env = "HTMLSHOT_STYLESHEET_SCRIPT", default_value = "https://cdn.tailwindcss.com")]
    stylesheet_script: String,

    /// Navigation and network-quiet timeout in milliseconds
    #[arg(long, env = "HTMLSHOT_NAVIGATION_TIMEOUT_MS", default_value_t = 30000)]
    navigation_timeout_ms: u64,

    /// Readiness check timeout in milliseconds
    #[arg(long, env = "HTMLSHOT_READINESS_TIMEOUT_MS", default_value_t = 10000)]
    readiness_timeout_ms: u64,

    /// Run Chrome without its sandbox (needed as root in most containers)
    #[arg(long, env = "HTMLSHOT_NO_SANDBOX")]
    no_sandbox: bool,

    /// Chrome/Chromium executable to launch
    #[arg(long, env = "HTMLSHOT_CHROME_PATH")]
    chrome_path: Option<PathBuf>,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            max_attempts: self.max_attempts,
            public_dir: self.public_dir.clone(),
            output_dir: self.output_dir.clone(),
            max_dimension: self.max_dimension,
        }
    }

    fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            stylesheet_script: self.stylesheet_script.clone(),
            navigation_timeout_ms: self.navigation_timeout_ms,
            readiness_timeout_ms: self.readiness_timeout_ms,
            sandbox: !self.no_sandbox,
            chrome_path: self.chrome_path.clone(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();

    let renderer = htmlshot::new_renderer(args.renderer_config()).context("Invalid renderer configuration")?;
    let server = start_server(args.server_config(), Arc::new(renderer)).context("Failed to start the server")?;

    server
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_library_defaults() {
        let args = Args::parse_from(["htmlshot"]);
        let server = args.server_config();
        let defaults = ServerConfig::default();
        assert_eq!(server.port, defaults.port);
        assert_eq!(server.max_attempts, defaults.max_attempts);
        assert_eq!(server.public_dir, defaults.public_dir);
        assert!(args.renderer_config().sandbox);
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "htmlshot",
            "--port",
            "8080",
            "--max-attempts",
            "2",
            "--no-sandbox",
            "--readiness-timeout-ms",
            "500",
        ]);
        assert_eq!(args.server_config().port, 8080);
        assert_eq!(args.server_config().max_attempts, 2);
        let renderer = args.renderer_config();
        assert!(!renderer.sandbox);
        assert_eq!(renderer.readiness_timeout_ms, 500);
    }
}
