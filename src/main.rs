mod cli;

use std::path::Path;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;
use vf_core::config::Config;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing. Respect RUST_LOG env var; otherwise use defaults
    // based on the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "videoflix=trace,vf_server=trace,vf_av=debug,vf_db=debug,vf_core=debug,tower_http=debug"
                .to_string()
        } else {
            "videoflix=debug,vf_server=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&env_filter))
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, cli.config.as_deref(), json))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::CleanupTranscodes { inactive_seconds } => {
            cleanup_transcodes(cli.config.as_deref(), inactive_seconds)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("videoflix {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn start_server(
    host: String,
    port: u16,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load_or_default(config_path);

    // Override host/port from CLI flags.
    config.server.host = host;
    config.server.port = port;

    tracing::info!("Starting videoflix server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    vf_server::start(config).await?;
    Ok(())
}

async fn probe_file(
    file: &Path,
    config_path: Option<&Path>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !file.exists() {
        return Err(format!("File does not exist: {}", file.display()).into());
    }

    let config = Config::load_or_default(config_path);
    let tools = vf_av::ToolRegistry::discover(&config.tools);

    let info = vf_av::probe::probe(&tools, file).await?;
    let keyframes = vf_av::probe::keyframes(&tools, file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    if let (Some(w), Some(h)) = (info.width, info.height) {
        println!(
            "Video: {} {}x{}",
            info.video_codec.as_deref().unwrap_or("unknown"),
            w,
            h
        );
    }
    if let Some(ref codec) = info.audio_codec {
        print!("Audio: {codec}");
        if let Some(kbps) = info.audio_bitrate_kbps {
            print!(" ({kbps} kbps)");
        }
        println!();
    }
    if let Some(kbps) = info.bitrate_kbps {
        println!("Bitrate: {kbps} kbps");
    }
    if let Some(duration) = info.duration_seconds {
        let secs = duration as u64;
        println!(
            "Duration: {:02}:{:02}:{:02}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        );
    }
    println!("Keyframes: {}", keyframes.len());

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default(config_path);
    let registry = vf_av::ToolRegistry::discover(&config.tools);
    let tools = registry.check_all();

    println!("Checking external tools...\n");

    let mut all_ok = true;
    for tool in &tools {
        let status = if tool.available {
            "OK"
        } else {
            all_ok = false;
            "MISSING"
        };

        print!("[{:>7}] {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable transcoding.");
    }

    Ok(())
}

fn cleanup_transcodes(
    config_path: Option<&Path>,
    inactive_seconds: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default(config_path);
    let transcode_root = config.media.root.join("transcode");

    let removed = vf_av::cleanup::cleanup_inactive_outputs(
        &transcode_root,
        std::time::Duration::from_secs(inactive_seconds),
    )?;

    println!("Removed {} directories", removed.len());
    for path in &removed {
        println!("{}", path.display());
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)?;
            let config = Config::from_json(&contents)?;

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid");
            } else {
                for w in &warnings {
                    println!("  Warning: {}", w);
                }
            }

            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Media root: {}", config.media.root.display());
            println!("  Site URL: {}", config.media.site_url);
            println!(
                "  Metadata provider: {}",
                config.metadata.endpoint.as_deref().unwrap_or("disabled")
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Media root: {}", config.media.root.display());
        }
    }

    Ok(())
}
