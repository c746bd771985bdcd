//! FITS Streamer - a slice server for N-dimensional FITS arrays.
//!
//! This binary starts the HTTP server and hosts the small companion tools
//! (`sign`, `inspect`, `fetch`).

use clap::Parser;
use std::io::Write;
use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fits_streamer::{
    client::SliceClient,
    config::{Cli, Command, FetchConfig, InspectConfig, ServeConfig, SignConfig, SignOutputFormat},
    create_s3_client,
    fits::FitsFile,
    io::LocalFileReader,
    server::{create_router, CorsOrigins, RouterConfig, UrlSigner, METADATA_PATH, SLICE_PATH},
    slice::{SliceRequest, SliceService},
    source::{FileSource, LocalFileSource, S3FileSource},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Sign(config) => run_sign(config),
        Command::Inspect(config) => run_inspect(config).await,
        Command::Fetch(config) => run_fetch(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("FITS Streamer v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");

    if config.auth_enabled {
        info!("  Auth: enabled");
    } else {
        warn!("  Auth: DISABLED - all endpoints are publicly accessible");
        warn!("        Enable for production: --auth-enabled --auth-secret=<secret>");
    }
    info!("  Concurrent reads per slice: {}", config.max_concurrent_reads);

    let router_config = build_router_config(&config);

    let router = match config.s3_bucket.clone() {
        Some(bucket) => {
            info!("  S3 bucket: {}", bucket);
            if let Some(ref prefix) = config.s3_prefix {
                info!("  S3 prefix: {}", prefix);
            }
            if let Some(ref endpoint) = config.s3_endpoint {
                info!("  S3 endpoint: {}", endpoint);
            }
            info!("  S3 region: {}", config.s3_region);

            let client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;

            if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
                error!(
                    "Bucket '{}' is not reachable ({}); check credentials, bucket name and endpoint",
                    bucket, e
                );
                return ExitCode::FAILURE;
            }

            let mut source = S3FileSource::new(client, bucket);
            if let Some(prefix) = config.s3_prefix.clone() {
                source = source.with_prefix(prefix);
            }
            create_router(build_service(source, &config), router_config)
        }
        None => {
            if !config.root.is_dir() {
                error!("Root '{}' is not a directory", config.root.display());
                return ExitCode::FAILURE;
            }
            info!("  Root: {}", config.root.display());

            let source = LocalFileSource::new(config.root.clone());
            create_router(build_service(source, &config), router_config)
        }
    };

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Listening on http://{}", addr);
    if !config.auth_enabled {
        info!("  curl 'http://{}{}?path=<file>'", addr, METADATA_PATH);
        info!(
            "  curl -D - -o slice.bin 'http://{}{}?path=<file>&hdu=0&slices=0:1,0:10,0:10'",
            addr, SLICE_PATH
        );
    }

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
        }
    };
    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn build_service<S: FileSource>(source: S, config: &ServeConfig) -> SliceService<S> {
    SliceService::new(source).with_max_concurrent_reads(config.max_concurrent_reads)
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "fits_streamer=debug,tower_http=debug"
    } else {
        "fits_streamer=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = if config.auth_enabled {
        RouterConfig::new(config.auth_secret_or_empty())
    } else {
        RouterConfig::without_auth()
    };

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors(CorsOrigins::List(origins.clone()));
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Sign Command
// =============================================================================

fn run_sign(config: SignConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let params = match config.parse_params() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let params_ref: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let signer = UrlSigner::new(&config.secret);
    let expiry = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
        + config.ttl;
    let signature = signer.signature(&config.path, &params_ref, expiry);
    let query = signer.signed_query_with_expiry(&config.path, &params_ref, expiry);
    let url = config
        .base_url
        .as_deref()
        .map(|base| format!("{}{}?{}", base.trim_end_matches('/'), config.path, query));

    match config.format {
        SignOutputFormat::Signature => println!("{}", signature),
        SignOutputFormat::Json => {
            let json = serde_json::json!({
                "signature": signature,
                "expiry": expiry,
                "path": config.path,
                "ttl": config.ttl,
                "url": url,
            });
            match serde_json::to_string_pretty(&json) {
                Ok(text) => println!("{}", text),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
        SignOutputFormat::Url => match url {
            Some(url) => println!("{}", url),
            None => {
                println!("{}?{}", config.path, query);
                eprintln!();
                eprintln!("Tip: Use --base-url to generate a complete URL");
            }
        },
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    let reader = match LocalFileReader::open(&config.file).await {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let file = match FitsFile::open(reader).await {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("{}", config.file.display());
    println!("{:>4}  {:<12} {:<12} {:<6} shape", "hdu", "name", "type", "array");
    for unit in file.units() {
        let element_type = unit.element_type.map(|t| t.tag()).unwrap_or("-");
        let shape = unit
            .shape
            .as_ref()
            .map(|s| format!("{:?}", s))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>4}  {:<12} {:<12} {:<6} {}",
            unit.index,
            unit.name,
            unit.kind.name(),
            element_type,
            shape
        );
        if config.headers {
            for line in unit.header_text().lines() {
                println!("      {}", line);
            }
        }
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Fetch Command
// =============================================================================

async fn run_fetch(config: FetchConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let mut client = match SliceClient::new(&config.server) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(ref secret) = config.secret {
        client = client.with_secret(secret);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let request = SliceRequest::new(config.path.clone(), config.hdu, config.slices.clone());
    let transfer = match client.open_slice(&request, cancel).await {
        Ok(transfer) => transfer,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = transfer
        .finish_with_progress(|progress| {
            eprint!(
                "\r{:>12} / {} bytes ({:>5.1}%)",
                progress.bytes_read,
                progress.total_bytes,
                progress.fraction() * 100.0
            );
            let _ = std::io::stderr().flush();
        })
        .await;
    eprintln!();

    let slice = match result {
        Ok(slice) => slice,
        Err(e) if e.is_aborted() => {
            eprintln!("Cancelled");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("shape: {:?}", slice.shape);
    println!("type:  {}", slice.element_type);
    println!("bytes: {}", slice.bytes.len());

    if let Some(ref output) = config.output {
        if let Err(e) = tokio::fs::write(output, &slice.bytes).await {
            eprintln!("Error: failed to write {}: {}", output.display(), e);
            return ExitCode::FAILURE;
        }
        println!("wrote: {}", output.display());
    }

    ExitCode::SUCCESS
}
