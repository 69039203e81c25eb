//! Main entry point for the ptbkit CLI application.
//!
//! `list` shows what an archive contains, `import` recovers its records as
//! JSON, and `export` encodes a JSON snapshot back into an archive.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use ptbkit::cli::Command;
use ptbkit::{Cli, Container, ExportSnapshot, ImportConfig, Importer, Role, encode};

/// How long exit waits for entity tasks abandoned after a timeout
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only initialize logging if verbose or RUST_LOG is set
    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        let directive = if cli.verbose { "ptbkit=debug" } else { "ptbkit=warn" };
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
            .init();
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let outcome = runtime.block_on(run(cli.command));
    // Dropping the runtime would wait for abandoned blocking tasks
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    outcome
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::List { file } => list_members(&file).await,
        Command::Import {
            file,
            output,
            config,
            dump_dir,
            max_member_bytes,
            timeout_ms,
        } => {
            let mut config = match config {
                Some(path) => ImportConfig::from_json_file(&path)?,
                None => ImportConfig::default(),
            };
            // Flags override the config file
            if dump_dir.is_some() {
                config.dump_dir = dump_dir;
            }
            if max_member_bytes.is_some() {
                config.max_member_bytes = max_member_bytes;
            }
            if timeout_ms.is_some() {
                config.entity_timeout_ms = timeout_ms;
            }
            config.validate()?;

            import(&file, output.as_deref(), config).await
        }
        Command::Export { snapshot, output } => export(&snapshot, &output).await,
    }
}

/// Print every member with its size and the roles it resolves to.
async fn list_members(path: &Path) -> Result<()> {
    let container = Container::open_file(path).await?;

    println!("{:>10}  {:>10}  {:<20}  Name", "Length", "Size", "Role");
    println!("{}", "-".repeat(70));

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;

    for entry in container.entries() {
        let roles: Vec<String> = Role::ALL
            .into_iter()
            .filter(|&role| container.resolve(role.candidates()) == Some(entry.file_name.as_str()))
            .map(|role| role.to_string())
            .collect();
        let roles = if roles.is_empty() { "-".to_string() } else { roles.join(", ") };

        println!(
            "{:>10}  {:>10}  {:<20}  {}",
            entry.uncompressed_size, entry.compressed_size, roles, entry.file_name
        );
        total_uncompressed += entry.uncompressed_size;
        total_compressed += entry.compressed_size;
    }

    println!("{}", "-".repeat(70));
    println!(
        "{:>10}  {:>10}  {:<20}  {} members",
        format_size(total_uncompressed),
        format_size(total_compressed),
        "",
        container.entries().len()
    );

    Ok(())
}

/// Recover records and write them as JSON.
///
/// Warnings go to stderr. Exits with an error when nothing was recovered.
async fn import(path: &Path, output: Option<&Path>, config: ImportConfig) -> Result<()> {
    let result = Importer::new(config).extract_file(path).await;
    let json = result.to_json().context("Failed to serialize import result")?;

    match output {
        Some(out) => tokio::fs::write(out, json + "\n")
            .await
            .with_context(|| format!("Failed to write {}", out.display()))?,
        None => println!("{json}"),
    }

    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
    if !result.success {
        bail!("import failed: {}", result.errors.join("; "));
    }

    eprintln!(
        "recovered {} accounts, {} customers, {} vendors, {} employees, {} items",
        result.stats.accounts,
        result.stats.customers,
        result.stats.vendors,
        result.stats.employees,
        result.stats.inventory
    );
    Ok(())
}

/// Encode a JSON snapshot into an archive.
async fn export(snapshot: &Path, output: &Path) -> Result<()> {
    let snapshot = ExportSnapshot::from_json_file(snapshot)?;
    let bytes = encode(&snapshot)?;
    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    eprintln!("wrote {} ({})", output.display(), format_size(bytes.len() as u64));
    Ok(())
}

/// Format a byte size into a human-readable string.
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
