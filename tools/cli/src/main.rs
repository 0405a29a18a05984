//! Depot CLI - Command line interface for storage devices.
//!
//! Loads a JSON storage configuration, builds the device registry and runs a
//! single operation against the default device or a named one.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use depot_common::StoragePath;
use depot_storage::{LocalDriver, Metadata, SigningKey, StorageConfig, StorageDriver};

#[derive(Parser)]
#[command(name = "depot")]
#[command(about = "Depot - Uniform file storage across local and S3-compatible devices")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Storage configuration file (JSON).
    #[arg(short, long, env = "DEPOT_CONFIG", default_value = "depot.json")]
    config: PathBuf,

    /// Device to operate on (default: the configured default device).
    #[arg(short, long)]
    device: Option<String>,

    /// URL signing secret (falls back to APP_SECRET).
    #[arg(long)]
    secret: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file.
    Put {
        /// Local file to upload.
        source: PathBuf,
        /// Destination storage path.
        dest: String,
    },

    /// Write literal content to a storage path.
    Write {
        /// Destination storage path.
        path: String,
        /// Content to write.
        content: String,
        /// Content type.
        #[arg(long, default_value = "text/plain")]
        content_type: String,
    },

    /// Download a file (to stdout unless --output is given).
    Get {
        /// Storage path.
        path: String,
        /// Output file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check whether a path exists.
    Exists {
        /// Storage path.
        path: String,
    },

    /// Delete a file.
    Rm {
        /// Storage path.
        path: String,
    },

    /// Delete a directory recursively.
    Rmdir {
        /// Storage path.
        path: String,
    },

    /// Move a file.
    Mv {
        /// Source storage path.
        source: String,
        /// Target storage path.
        target: String,
    },

    /// Copy a file.
    Cp {
        /// Source storage path.
        source: String,
        /// Target storage path.
        target: String,
    },

    /// Show size, MIME type and hash of a file.
    Stat {
        /// Storage path.
        path: String,
    },

    /// Print the public URL of a file.
    Url {
        /// Storage path.
        path: String,
    },

    /// Print a presigned URL.
    Sign {
        /// Storage path.
        path: String,
        /// Lifetime in seconds.
        #[arg(long, default_value_t = 3600)]
        ttl: i64,
    },

    /// Check a signed URL issued by a local device.
    Verify {
        /// Storage path the URL must grant access to.
        path: String,
        /// Signed URL.
        url: String,
    },

    /// Total size of a local directory.
    Du {
        /// Storage path of the directory.
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let key = match &cli.secret {
        Some(secret) => SigningKey::new(secret.as_str()),
        None => SigningKey::from_env(),
    }
    .context("Failed to load the URL signing secret")?;

    let config = StorageConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let storage = config.build(&key).context("Failed to initialize storage")?;

    let device_key = cli
        .device
        .clone()
        .unwrap_or_else(|| storage.storage_key().to_string());
    let driver = storage.device(&device_key)?.clone();
    info!("Using {} device '{}'", driver.name(), device_key);

    match cli.command {
        Commands::Put { source, dest } => cmd_put(&driver, &source, &dest).await,

        Commands::Write {
            path,
            content,
            content_type,
        } => cmd_write(&driver, &path, &content, &content_type).await,

        Commands::Get { path, output } => cmd_get(&driver, &path, output.as_deref()).await,

        Commands::Exists { path } => {
            let exists = driver.exists(&parse_path(&path)?).await;
            println!("{}", exists);
            Ok(())
        }

        Commands::Rm { path } => {
            let deleted = driver.delete(&parse_path(&path)?).await?;
            println!("{}", if deleted { "Deleted" } else { "Nothing to delete" });
            Ok(())
        }

        Commands::Rmdir { path } => {
            let deleted = driver.delete_path(&parse_path(&path)?).await?;
            println!("{}", if deleted { "Deleted" } else { "Not a directory" });
            Ok(())
        }

        Commands::Mv { source, target } => {
            driver
                .move_to(&parse_path(&source)?, &parse_path(&target)?)
                .await
                .context("Failed to move file")?;
            println!("Moved {} -> {}", source, target);
            Ok(())
        }

        Commands::Cp { source, target } => {
            driver
                .copy(&parse_path(&source)?, &parse_path(&target)?)
                .await
                .context("Failed to copy file")?;
            println!("Copied {} -> {}", source, target);
            Ok(())
        }

        Commands::Stat { path } => cmd_stat(&driver, &path).await,

        Commands::Url { path } => {
            println!("{}", driver.url(&parse_path(&path)?));
            Ok(())
        }

        Commands::Sign { path, ttl } => {
            let expires_at = Utc::now() + Duration::seconds(ttl);
            let url = driver
                .presigned_url(&parse_path(&path)?, Some(expires_at))
                .await
                .context("Failed to presign URL")?;
            println!("{}", url);
            Ok(())
        }

        Commands::Verify { path, url } => {
            let valid = local_device(&driver, &device_key)?
                .validate_signed_url(&url, &parse_path(&path)?);
            println!("{}", if valid { "valid" } else { "invalid" });
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Du { path } => {
            let size = local_device(&driver, &device_key)?
                .directory_size(&parse_path(&path)?)
                .await
                .context("Failed to measure directory")?;
            println!("{} bytes", size);
            Ok(())
        }
    }
}

fn parse_path(path: &str) -> Result<StoragePath> {
    StoragePath::parse(path).with_context(|| format!("Invalid storage path: {}", path))
}

/// The device's local driver, for local-only operations.
fn local_device<'a>(driver: &'a Arc<dyn StorageDriver>, device: &str) -> Result<&'a LocalDriver> {
    driver.as_local().with_context(|| {
        format!(
            "Device '{}' uses the {} driver; this command needs a local device",
            device,
            driver.name()
        )
    })
}

/// Upload a local file.
async fn cmd_put(driver: &Arc<dyn StorageDriver>, source: &Path, dest: &str) -> Result<()> {
    info!("Uploading {} to {}", source.display(), dest);

    driver
        .upload(source, &parse_path(dest)?, &Metadata::new())
        .await
        .context("Failed to upload file")?;

    println!("Uploaded {} -> {}", source.display(), dest);
    Ok(())
}

/// Write literal content.
async fn cmd_write(
    driver: &Arc<dyn StorageDriver>,
    path: &str,
    content: &str,
    content_type: &str,
) -> Result<()> {
    driver
        .write(
            content.as_bytes(),
            &parse_path(path)?,
            content_type,
            &Metadata::new(),
        )
        .await
        .context("Failed to write file")?;

    println!("Wrote {} bytes to {}", content.len(), path);
    Ok(())
}

/// Stream a file to stdout or to a local file.
async fn cmd_get(driver: &Arc<dyn StorageDriver>, path: &str, output: Option<&Path>) -> Result<()> {
    let mut stream = driver
        .download_chunk(&parse_path(path)?)
        .await
        .context("Failed to read file")?;

    let mut sink: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = match output {
        Some(file) => Box::new(
            tokio::fs::File::create(file)
                .await
                .with_context(|| format!("Failed to create {}", file.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let mut total = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        total += chunk.len();
        sink.write_all(&chunk).await?;
    }
    sink.flush().await?;

    info!("Read {} bytes from {}", total, path);
    Ok(())
}

/// Print file metadata.
async fn cmd_stat(driver: &Arc<dyn StorageDriver>, path: &str) -> Result<()> {
    let storage_path = parse_path(path)?;

    let size = driver.size(&storage_path).await?;
    let mime = driver.mime_type(&storage_path).await?;
    let hash = driver.file_hash(&storage_path).await?;

    println!("Path:  {}", path);
    println!("Size:  {} bytes", size);
    println!("Type:  {}", mime);
    println!("MD5:   {}", hash);
    println!("URL:   {}", driver.url(&storage_path));
    Ok(())
}
