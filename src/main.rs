//! Main entry point for the fwpluck CLI application.
//!
//! Lists or extracts entries of a ZIP archive (typically an IPSW firmware
//! package) that lives on an HTTP server or on local disk.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fwpluck::{
    Archive, ArchiveOpener, Cli, Connector, EntryExtractor, HttpConnector, LocalConnector,
    ReadAt, TransferStats, find_kbag,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level())),
        )
        .with_writer(std::io::stderr)
        .init();

    // Ctrl-C cancels in-flight requests instead of killing the process, so
    // the transfer summary still gets printed.
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling");
                cancel.cancel();
            }
        }
    });

    if cli.is_http_url() {
        let stats = TransferStats::new();
        let connector =
            HttpConnector::new(cli.source.clone(), &cli.fetch_config(), cancel.clone(), stats.clone())?;

        let result = run(&connector, &cli, cancel).await;

        if !cli.is_quiet() {
            eprintln!("\nTotal bytes transferred: {}", format_size(stats.bytes()));
        }
        result
    } else {
        let connector = LocalConnector::new(&cli.source);
        run(&connector, &cli, cancel).await
    }
}

/// Open the archive and either list it or pull the requested entry out.
async fn run<C: Connector>(connector: &C, cli: &Cli, cancel: CancellationToken) -> Result<()> {
    let archive = ArchiveOpener::new(cli.attempts)
        .with_cancellation(cancel)
        .open(connector)
        .await
        .with_context(|| format!("failed to open {}", cli.source))?;

    if cli.list {
        list_files(&archive);
        return Ok(());
    }

    let Some(name) = cli.entry.as_deref() else {
        anyhow::bail!("no entry given");
    };
    let extractor = EntryExtractor::new(cli.chunk_size);

    if cli.kbag {
        let data = extractor
            .extract_to_vec(&archive, name)
            .await
            .with_context(|| format!("failed to extract {name}"))?;
        let record = find_kbag(data.as_slice())
            .with_context(|| format!("no key bag in {name}"))?;
        println!("{}", record.kbag_hex());
        return Ok(());
    }

    if cli.is_pipe() {
        let mut stdout = tokio::io::stdout();
        extractor
            .extract(&archive, name, &mut stdout)
            .await
            .with_context(|| format!("failed to extract {name}"))?;
        stdout.flush().await?;
        return Ok(());
    }

    let output_path = output_path(cli, name);
    if !cli.is_quiet() {
        println!("  extracting: {}", name);
    }
    let written = extractor
        .extract_to_file(&archive, name, &output_path)
        .await
        .with_context(|| format!("failed to extract {name}"))?;
    info!(path = %output_path.display(), bytes = written, "extracted");

    Ok(())
}

/// Print a table of the archive's entries.
fn list_files<R: ReadAt>(archive: &Archive<R>) {
    println!(
        "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
        "Length", "Size", "Cmpr", "Date", "Time"
    );
    println!("{}", "-".repeat(70));

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in archive.entries() {
        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();

        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.compressed_size, entry.uncompressed_size),
            year,
            month,
            day,
            hour,
            minute,
            entry.name
        );

        if !entry.is_directory {
            total_uncompressed += entry.uncompressed_size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(70));
    println!(
        "{:>10}  {:>10}  {}  {:>21}  {} files",
        total_uncompressed,
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        "",
        file_count
    );
}

/// Percentage saved by compression.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// Where an extracted entry lands: `-o` wins, otherwise the entry's base
/// name inside `-d` (or the current directory).
fn output_path(cli: &Cli, name: &str) -> PathBuf {
    if let Some(output) = &cli.output {
        return PathBuf::from(output);
    }

    let file_name = Path::new(name)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());

    match &cli.extract_dir {
        Some(dir) => PathBuf::from(dir).join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Format a byte size into a human-readable string.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sizes() {
        assert_eq!(format_size(500), "500 bytes");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
    }

    #[test]
    fn output_path_defaults_to_base_name() {
        let cli = Cli::parse_from(["fwpluck", "fw.ipsw", "Firmware/dfu/iBSS.img3"]);
        assert_eq!(
            output_path(&cli, "Firmware/dfu/iBSS.img3"),
            PathBuf::from("iBSS.img3")
        );

        let cli = Cli::parse_from(["fwpluck", "-d", "out", "fw.ipsw", "Firmware/dfu/iBSS.img3"]);
        assert_eq!(
            output_path(&cli, "Firmware/dfu/iBSS.img3"),
            PathBuf::from("out").join("iBSS.img3")
        );

        let cli = Cli::parse_from(["fwpluck", "-o", "x.bin", "fw.ipsw", "a/b"]);
        assert_eq!(output_path(&cli, "a/b"), PathBuf::from("x.bin"));
    }

    #[test]
    fn compression_ratio() {
        assert_eq!(ratio(25, 100), "  75%");
        assert_eq!(ratio(0, 0), "  0%");
    }
}
