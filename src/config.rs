//! Command-line configuration.
//!
//! Every `serve` option can also be set through an environment variable with
//! the `FITS_` prefix:
//!
//! - `FITS_HOST` - Server bind address (default: 0.0.0.0)
//! - `FITS_PORT` - Server port (default: 3000)
//! - `FITS_ROOT` - Directory served when no bucket is configured (default: .)
//! - `FITS_S3_BUCKET` - Serve from this S3 bucket instead of the local root
//! - `FITS_S3_PREFIX` - Key prefix inside the bucket
//! - `FITS_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `FITS_S3_REGION` - AWS region (default: us-east-1)
//! - `FITS_AUTH_ENABLED` - Require signed URLs (default: false)
//! - `FITS_AUTH_SECRET` - HMAC secret for signed URLs
//! - `FITS_CORS_ORIGINS` - Comma-separated allowed origins (default: any)
//! - `FITS_MAX_CONCURRENT_READS` - Storage reads in flight per slice (default: 8)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::slice::DEFAULT_MAX_CONCURRENT_READS;

// =============================================================================
// Default Values
// =============================================================================

pub const DEFAULT_HOST: &str = "0.0.0.0";

pub const DEFAULT_PORT: u16 = 3000;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Default lifetime of signed URLs, in seconds.
pub const DEFAULT_SIGN_TTL: u64 = 3600;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

// =============================================================================
// CLI
// =============================================================================

/// FITS Streamer - serves slices of FITS arrays over HTTP.
///
/// Reads only the byte ranges a slice needs, from a local directory or an
/// S3-compatible bucket.
#[derive(Parser, Debug, Clone)]
#[command(name = "fits-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeConfig),

    /// Produce a signed URL or signature
    Sign(SignConfig),

    /// Print the units of a local FITS file
    Inspect(InspectConfig),

    /// Download one slice from a running server
    Fetch(FetchConfig),
}

// =============================================================================
// Serve
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "FITS_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "FITS_PORT")]
    pub port: u16,

    /// Directory that request paths are resolved against.
    #[arg(long, default_value = ".", env = "FITS_ROOT")]
    pub root: PathBuf,

    /// Serve from this S3 bucket instead of the local root.
    #[arg(long, env = "FITS_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Key prefix prepended to request paths inside the bucket.
    #[arg(long, env = "FITS_S3_PREFIX")]
    pub s3_prefix: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "FITS_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    #[arg(long, default_value = DEFAULT_REGION, env = "FITS_S3_REGION")]
    pub s3_region: String,

    /// Require HMAC-SHA256 signed URLs on the data endpoints.
    #[arg(long, default_value_t = false, env = "FITS_AUTH_ENABLED")]
    pub auth_enabled: bool,

    /// Secret key for signed URLs. Required when auth is enabled.
    #[arg(long, env = "FITS_AUTH_SECRET")]
    pub auth_secret: Option<String>,

    /// Allowed CORS origins (comma-separated). Any origin when unset.
    #[arg(long, env = "FITS_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Storage reads in flight per slice request.
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_READS, env = "FITS_MAX_CONCURRENT_READS")]
    pub max_concurrent_reads: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.auth_enabled && self.auth_secret.as_deref().map_or(true, str::is_empty) {
            return Err(
                "Authentication is enabled but no secret provided. \
                 Set --auth-secret or FITS_AUTH_SECRET, or drop --auth-enabled"
                    .to_string(),
            );
        }

        if let Some(bucket) = &self.s3_bucket {
            if bucket.trim().is_empty() {
                return Err("S3 bucket name must not be empty".to_string());
            }
        } else if self.s3_prefix.is_some() {
            return Err("--s3-prefix requires --s3-bucket".to_string());
        }

        if self.max_concurrent_reads == 0 {
            return Err("max_concurrent_reads must be greater than 0".to_string());
        }

        Ok(())
    }

    /// "host:port"
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn auth_secret_or_empty(&self) -> &str {
        self.auth_secret.as_deref().unwrap_or("")
    }
}

// =============================================================================
// Sign
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SignOutputFormat {
    /// Hex signature only
    Signature,
    /// Full URL, or path and query without --base-url
    Url,
    /// JSON object with signature, expiry and URL
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct SignConfig {
    /// Shared secret, as configured on the server.
    #[arg(long, env = "FITS_AUTH_SECRET")]
    pub secret: String,

    /// Endpoint path, e.g. /fitsview/slice
    #[arg(long)]
    pub path: String,

    /// Query parameters to sign, as k=v pairs separated by '&'.
    ///
    /// Slice specs contain commas, so pairs are split on '&' rather than ','.
    #[arg(long)]
    pub params: Option<String>,

    /// Seconds until the signature expires.
    #[arg(long, default_value_t = DEFAULT_SIGN_TTL)]
    pub ttl: u64,

    /// Server base URL, e.g. http://localhost:3000
    #[arg(long)]
    pub base_url: Option<String>,

    #[arg(long, value_enum, default_value_t = SignOutputFormat::Url)]
    pub format: SignOutputFormat,
}

impl SignConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.is_empty() {
            return Err("Secret must not be empty".to_string());
        }
        if !self.path.starts_with('/') {
            return Err(format!("Path must start with '/': {}", self.path));
        }
        if self.ttl == 0 {
            return Err("TTL must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn parse_params(&self) -> Result<Vec<(String, String)>, String> {
        let Some(params) = self.params.as_deref() else {
            return Ok(Vec::new());
        };

        params
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, _)) if key.is_empty() => Err(format!("Empty key in '{}'", pair)),
                Some((key, value)) => Ok((key.to_string(), value.to_string())),
                None => Err(format!("Expected key=value, got '{}'", pair)),
            })
            .collect()
    }
}

// =============================================================================
// Inspect / Fetch
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// Local FITS file
    pub file: PathBuf,

    /// Also print every header card
    #[arg(long, default_value_t = false)]
    pub headers: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FetchConfig {
    #[arg(long, default_value = DEFAULT_SERVER_URL, env = "FITS_SERVER")]
    pub server: String,

    /// File path on the server
    #[arg(long)]
    pub path: String,

    #[arg(long, default_value_t = 0)]
    pub hdu: usize,

    /// `start:stop,...`, one segment per axis
    #[arg(long)]
    pub slices: String,

    /// Sign requests with this secret
    #[arg(long, env = "FITS_AUTH_SECRET")]
    pub secret: Option<String>,

    /// Write the raw little-endian bytes here
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================
