//! sealfile: password-based streaming file encryption
//!
//! Commands:
//!   encrypt <input>          - seal a file into `<input>.sealed` + `<input>.seal.json`
//!   decrypt <container>      - restore the plaintext (optionally from chunk N)
//!   verify <record>          - check a password against a record's verifier
//!   inspect <container>      - show container layout without a password
//!   gen-password             - print a random password
//!   config show              - display the active configuration

mod progress;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sealfile_core::SealConfig;
use sealfile_crypto::{
    generate_password, parse_preamble, ContainerLayout, FileMetadata, KdfParams, KdfProfile,
    AUTH_OVERHEAD,
};
use sealfile_stream::{
    decrypt_stream, encrypt_stream, ChunkSource, DecryptOptions, EncryptOptions,
    EncryptionRecord, FileSink, FileSource, Hooks, PipelineError,
};

use crate::progress::BarReporter;

/// Decrypt gives up after this many rejected prompts
const MAX_PASSWORD_ATTEMPTS: usize = 3;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sealfile",
    version,
    about = "Password-based streaming file encryption",
    long_about = "sealfile: encrypt files of any size into authenticated 64 KiB chunks \
                  under an Argon2id-derived key"
)]
struct Cli {
    /// Path to sealfile.toml configuration file
    #[arg(long, short = 'c', env = "SEALFILE_CONFIG", default_value = "sealfile.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "SEALFILE_LOG")]
    log: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "SEALFILE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file into a container and write its encryption record
    Encrypt {
        /// Plaintext file
        input: PathBuf,
        /// Container path (default: <input>.<container_extension>)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Record path (default: <input>.<record_suffix>)
        #[arg(long, short = 'r')]
        record: Option<PathBuf>,
        /// Name stored in the encrypted metadata (default: input file name)
        #[arg(long)]
        name: Option<String>,
        /// MIME type stored in the encrypted metadata
        #[arg(long = "type")]
        content_type: Option<String>,
        /// Argon2id profile (interactive, moderate, sensitive); overrides config
        #[arg(long)]
        profile: Option<KdfProfile>,
        /// Generate a random password and print it instead of prompting
        #[arg(long)]
        generate_password: bool,
        /// Password (prompted when absent)
        #[arg(long, env = "SEALFILE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Replace existing output files
        #[arg(long)]
        overwrite: bool,
    },

    /// Decrypt a container
    Decrypt {
        /// Container file
        container: PathBuf,
        /// Plaintext output path (default: container path without its extension)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Record path (default: derived from the container path; optional)
        #[arg(long, short = 'r')]
        record: Option<PathBuf>,
        /// Start at this chunk index and write only the remaining plaintext
        #[arg(long, default_value_t = 0)]
        start_chunk: u64,
        /// Argon2id profile when no record is available; overrides config
        #[arg(long)]
        profile: Option<KdfProfile>,
        /// Password (prompted when absent)
        #[arg(long, env = "SEALFILE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Replace an existing output file
        #[arg(long)]
        overwrite: bool,
    },

    /// Check a password against an encryption record
    Verify {
        /// Record file
        record: PathBuf,
        /// Password (prompted when absent)
        #[arg(long, env = "SEALFILE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Show a container's layout (no password needed)
    Inspect {
        /// Container file
        container: PathBuf,
        /// Record to cross-check against the container
        #[arg(long, short = 'r')]
        record: Option<PathBuf>,
    },

    /// Print a random password (16 bytes, URL-safe base64)
    #[command(name = "gen-password")]
    GenPassword,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // Logging is configured by the file, so a missing file is reported after init
    let (config, found) = load_config(&cli.config)?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = match &cli.log_format {
        Some(format) => format.clone(),
        None if config.logging.format == "json" => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(&level, &format);
    if !found {
        sealfile_core::config::warn_missing(&cli.config);
    }
    debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        found,
        "sealfile starting"
    );

    sealfile_crypto::initialize().context("crypto self-test failed")?;

    match cli.command {
        Commands::Encrypt {
            input,
            output,
            record,
            name,
            content_type,
            profile,
            generate_password,
            password,
            overwrite,
        } => {
            let password = if generate_password {
                let generated = self::generate_password();
                eprintln!("Generated password (store it safely): {}", generated.expose_secret());
                generated
            } else {
                read_password(password, true)?
            };
            let request = EncryptRequest {
                output,
                record,
                name,
                content_type,
                kdf: kdf_params(&config, profile)?,
                overwrite: overwrite || config.output.overwrite,
            };
            cmd_encrypt(&config, &input, request, &password).await
        }
        Commands::Decrypt {
            container,
            output,
            record,
            start_chunk,
            profile,
            password,
            overwrite,
        } => {
            let request = DecryptRequest {
                output,
                record,
                start_chunk,
                kdf: kdf_params(&config, profile)?,
                overwrite: overwrite || config.output.overwrite,
            };
            cmd_decrypt(&config, &container, request, password).await
        }
        Commands::Verify { record, password } => cmd_verify(&record, password).await,
        Commands::Inspect { container, record } => cmd_inspect(&container, record.as_deref()).await,
        Commands::GenPassword => {
            println!("{}", self::generate_password().expose_secret());
            Ok(())
        }
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

/// Load the config file without logging; `false` means defaults are in use.
fn load_config(path: &Path) -> Result<(SealConfig, bool)> {
    let loaded = SealConfig::load_if_present(path)
        .with_context(|| format!("loading config: {}", path.display()))?;
    let found = loaded.is_some();
    Ok((loaded.unwrap_or_default(), found))
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Argon2id parameters: CLI profile > config profile, then config overrides.
fn kdf_params(config: &SealConfig, profile: Option<KdfProfile>) -> Result<KdfParams> {
    let profile = match profile {
        Some(p) => p,
        None => config
            .crypto
            .profile
            .parse()
            .context("crypto.profile in config")?,
    };
    let mut params = KdfParams::from_profile(profile);
    if let Some(m) = config.crypto.argon2_mem_cost_kib {
        params.mem_cost_kib = m;
    }
    if let Some(t) = config.crypto.argon2_time_cost {
        params.time_cost = t;
    }
    if let Some(p) = config.crypto.argon2_parallelism {
        params.parallelism = p;
    }
    Ok(params)
}

/// `path` with `.suffix` appended to its full file name
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".");
    s.push(suffix);
    PathBuf::from(s)
}

/// `path` with a trailing `.suffix` removed, if present
fn without_suffix(path: &Path, suffix: &str) -> Option<PathBuf> {
    let s = path.to_str()?;
    let stripped = s.strip_suffix(suffix)?.strip_suffix('.')?;
    if stripped.is_empty() || stripped.ends_with(std::path::MAIN_SEPARATOR) {
        return None;
    }
    Some(PathBuf::from(stripped))
}

/// Password from the flag/environment, or an interactive prompt.
fn read_password(given: Option<String>, confirm: bool) -> Result<SecretString> {
    if let Some(pw) = given {
        return Ok(SecretString::from(pw));
    }
    let first = rpassword::prompt_password("Password: ").context("reading password")?;
    if first.is_empty() {
        bail!("password must not be empty");
    }
    if confirm {
        let second = rpassword::prompt_password("Confirm password: ").context("reading password")?;
        if first != second {
            bail!("passwords do not match");
        }
    }
    Ok(SecretString::from(first))
}

/// Password that the record's verifier accepts, prompting up to
/// [`MAX_PASSWORD_ATTEMPTS`] times when none was given.
fn read_verified_password(record: &EncryptionRecord, given: Option<String>) -> Result<SecretString> {
    if let Some(pw) = given {
        let pw = SecretString::from(pw);
        if record.verify_password(&pw)? {
            return Ok(pw);
        }
        bail!("wrong password");
    }

    for attempt in 1..=MAX_PASSWORD_ATTEMPTS {
        let pw = read_password(None, false)?;
        if record.verify_password(&pw)? {
            return Ok(pw);
        }
        eprintln!("Wrong password ({attempt}/{MAX_PASSWORD_ATTEMPTS})");
    }
    bail!("too many failed password attempts")
}

async fn load_record(path: &Path) -> Result<EncryptionRecord> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading record: {}", path.display()))?;
    EncryptionRecord::from_json(&content).with_context(|| format!("parsing record: {}", path.display()))
}

async fn write_record(path: &Path, record: &EncryptionRecord, overwrite: bool) -> Result<()> {
    if !overwrite && tokio::fs::try_exists(path).await? {
        bail!("record already exists: {} (use --overwrite)", path.display());
    }
    tokio::fs::write(path, record.to_json()?)
        .await
        .with_context(|| format!("writing record: {}", path.display()))
}

/// Cancellation token tripped by Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trip = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            trip.cancel();
        }
    });
    token
}

fn session_error(err: PipelineError, bar: &BarReporter, what: &str) -> anyhow::Error {
    bar.abandon();
    if err.is_cancelled() {
        return anyhow::anyhow!("{what} cancelled; no output was written");
    }
    if err.is_authentication() {
        return anyhow::Error::new(err).context(format!("{what} failed: wrong password or corrupted data"));
    }
    anyhow::Error::new(err).context(format!("{what} failed"))
}

// ── `sealfile encrypt` ────────────────────────────────────────────────────────

struct EncryptRequest {
    output: Option<PathBuf>,
    record: Option<PathBuf>,
    name: Option<String>,
    content_type: Option<String>,
    kdf: KdfParams,
    overwrite: bool,
}

async fn cmd_encrypt(
    config: &SealConfig,
    input: &Path,
    request: EncryptRequest,
    password: &SecretString,
) -> Result<()> {
    let output = request
        .output
        .unwrap_or_else(|| with_suffix(input, &config.output.container_extension));
    let record_path = request
        .record
        .unwrap_or_else(|| with_suffix(input, &config.output.record_suffix));
    if !request.overwrite && tokio::fs::try_exists(&record_path).await? {
        bail!("record already exists: {} (use --overwrite)", record_path.display());
    }

    let name = match request.name {
        Some(name) => name,
        None => input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("input path has no file name; pass --name")?,
    };
    let options =
        EncryptOptions::new(FileMetadata::new(name, request.content_type)).with_kdf(request.kdf);

    let mut source = FileSource::open(input)
        .await
        .with_context(|| format!("opening input: {}", input.display()))?;
    let mut sink = FileSink::create(&output, request.overwrite)
        .await
        .with_context(|| format!("creating output: {}", output.display()))?;

    info!(input = %input.display(), output = %output.display(), "encrypting");
    let bar = BarReporter::new("encrypt");
    let cancel = cancel_on_ctrl_c();
    let hooks = Hooks::none().with_progress(&bar).with_cancel(&cancel);

    let record = encrypt_stream(&mut source, &mut sink, password, &options, hooks)
        .await
        .map_err(|e| session_error(e, &bar, "encryption"))?;
    bar.finish(format!("{} bytes sealed", source.len()));

    write_record(&record_path, &record, request.overwrite).await?;
    println!("container: {}", output.display());
    println!("record:    {}", record_path.display());
    Ok(())
}

// ── `sealfile decrypt` ────────────────────────────────────────────────────────

struct DecryptRequest {
    output: Option<PathBuf>,
    record: Option<PathBuf>,
    start_chunk: u64,
    kdf: KdfParams,
    overwrite: bool,
}

async fn cmd_decrypt(
    config: &SealConfig,
    container: &Path,
    request: DecryptRequest,
    password: Option<String>,
) -> Result<()> {
    let stem = without_suffix(container, &config.output.container_extension);

    // An explicit record must exist; the derived one is optional
    let record = match (&request.record, &stem) {
        (Some(path), _) => Some(load_record(path).await?),
        (None, Some(stem)) => {
            let path = with_suffix(stem, &config.output.record_suffix);
            if tokio::fs::try_exists(&path).await? {
                debug!(record = %path.display(), "using record next to container");
                Some(load_record(&path).await?)
            } else {
                None
            }
        }
        (None, None) => None,
    };
    if record.is_none() {
        warn!("no encryption record found; metadata will not be recovered");
    }

    let output = match request.output.or(stem) {
        Some(output) => output,
        None => bail!(
            "cannot derive an output name from {}; pass --output",
            container.display()
        ),
    };

    let password = match &record {
        Some(record) => read_verified_password(record, password)?,
        None => read_password(password, false)?,
    };

    let mut source = FileSource::open(container)
        .await
        .with_context(|| format!("opening container: {}", container.display()))?;
    let mut sink = FileSink::create(&output, request.overwrite)
        .await
        .with_context(|| format!("creating output: {}", output.display()))?;

    info!(container = %container.display(), output = %output.display(), "decrypting");
    let bar = BarReporter::new("decrypt");
    let cancel = cancel_on_ctrl_c();
    let hooks = Hooks::none().with_progress(&bar).with_cancel(&cancel);
    let options = DecryptOptions {
        kdf: request.kdf,
        start_chunk: request.start_chunk,
    };

    let outcome = decrypt_stream(&mut source, &mut sink, &password, record.as_ref(), &options, hooks)
        .await
        .map_err(|e| session_error(e, &bar, "decryption"))?;
    bar.finish(format!("{} bytes restored", outcome.bytes_written));

    println!("output: {}", output.display());
    if let Some(meta) = outcome.metadata {
        println!("name:   {}", meta.name);
        if let Some(content_type) = meta.content_type {
            println!("type:   {content_type}");
        }
    }
    Ok(())
}

// ── `sealfile verify` ─────────────────────────────────────────────────────────

async fn cmd_verify(record_path: &Path, password: Option<String>) -> Result<()> {
    let record = load_record(record_path).await?;
    let password = read_password(password, false)?;

    if record.verify_password(&password)? {
        println!("password OK");
        Ok(())
    } else {
        bail!("wrong password")
    }
}

// ── `sealfile inspect` ────────────────────────────────────────────────────────

async fn cmd_inspect(container: &Path, record_path: Option<&Path>) -> Result<()> {
    let layout = ContainerLayout::standard();
    let mut source = FileSource::open(container)
        .await
        .with_context(|| format!("opening container: {}", container.display()))?;

    let total = source.len();
    let body_offset = layout.body_offset();
    if total < body_offset {
        bail!("{}: {total} bytes is too short to be a container", container.display());
    }
    let preamble = source.read_at(0, body_offset as usize).await?;
    let (salt, header) = parse_preamble(&preamble).context("reading container preamble")?;

    let body = total - body_offset;
    let full = layout.ciphertext_chunk_len() as u64;
    let chunks = body.div_ceil(full);
    let tail = body - chunks.saturating_sub(1) * full;

    println!("container:    {}", container.display());
    println!("size:         {total} bytes");
    println!("body offset:  {body_offset}");
    println!("chunk size:   {} ({} on disk)", layout.chunk_size, full);
    println!("chunks:       {chunks}");
    if chunks == 0 {
        println!("status:       no chunks (incomplete)");
    } else if tail < AUTH_OVERHEAD as u64 {
        println!("status:       malformed ({tail} dangling bytes after the last chunk)");
    } else {
        println!("plaintext:    {} bytes", body - chunks * AUTH_OVERHEAD as u64);
    }

    if let Some(path) = record_path {
        let record = load_record(path).await?;
        let matches = record.salt_bytes()? == salt && record.header_bytes()? == header;
        println!("record:       {}", path.display());
        println!(
            "kdf:          argon2id m={} KiB, t={}, p={}",
            record.kdf.mem_cost_kib, record.kdf.time_cost, record.kdf.parallelism
        );
        println!("matches:      {}", if matches { "yes" } else { "NO" });
    }
    Ok(())
}

// ── `sealfile config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &SealConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
