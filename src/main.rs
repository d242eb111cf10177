//! Rollcall Desk - class attendance board with bulk status changes and export.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use eframe::egui;
use rollcall_desk as app;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::{MakeWriterExt, OptionalWriter};

use app::client::{AttendanceBackend, connect_backend};
use app::config::{AppConfig, ConfigLoadResult, data_dir};
use app::db;
use app::models::{FilterCriteria, records_from_values};
use app::ui::{AttendanceView, MainApp};

/// Class attendance board with bulk status changes and export.
#[derive(Parser)]
#[command(name = "rollcall-desk", version)]
struct Cli {
    /// Use config.toml from current directory (dev mode)
    #[arg(long)]
    dev: bool,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Open the window on this query string (e.g. "date=2026-03-02&class=7B")
    #[arg(long, value_name = "QS")]
    query: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Export the rows matching a query without opening the window
    Export {
        #[arg(long, value_name = "QS")]
        query: String,
        /// Output file (default: scope-based name in the export directory)
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
    },
    /// Print the summary of a scope as JSON
    Stats {
        #[arg(long, value_name = "QS")]
        query: String,
    },
    /// Replace a scope's records with the contents of a JSON file
    Import {
        #[arg(long, value_name = "QS")]
        query: String,
        /// JSON array of attendance records
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Log to stdout and a daily file; the guard flushes the file writer on exit.
    // Without a writable log directory only stdout is used.
    let log_dir = data_dir().join("logs");
    let (file_writer, _log_guard, log_error) = match open_log_file(&log_dir) {
        Ok((writer, guard)) => (Some(writer), Some(guard), None),
        Err(e) => (None, None, Some(e)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_ansi(false)
        .with_writer(std::io::stdout.and(move || match &file_writer {
            Some(w) => OptionalWriter::some(w.clone()),
            None => OptionalWriter::none(),
        }))
        .init();
    if let Some(e) = log_error {
        tracing::warn!("File logging disabled, cannot use {}: {e}", log_dir.display());
    }

    tracing::info!("Rollcall Desk starting...");

    // Determine config path based on mode
    let config_path = match (&cli.config, cli.dev) {
        (Some(path), _) => path.clone(),
        (None, true) => {
            tracing::info!("Dev mode: loading config from current directory");
            PathBuf::from("config.toml")
        }
        (None, false) => AppConfig::default_path(),
    };
    tracing::info!("Config path: {:?}", config_path);

    let config = match AppConfig::try_load(&config_path) {
        ConfigLoadResult::Loaded(config) => {
            tracing::info!("Config loaded successfully");
            config
        }
        ConfigLoadResult::Missing => {
            tracing::info!("Config missing, using defaults");
            AppConfig::default()
        }
        ConfigLoadResult::Invalid(e) => {
            bail!("invalid config {}: {e}", config_path.display());
        }
    };

    // Create tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;

    match cli.command {
        Some(Command::Export { query, output, format }) => rt.block_on(run_export(&config, &query, output, format)),
        Some(Command::Stats { query }) => rt.block_on(run_stats(&config, &query)),
        Some(Command::Import { query, file }) => rt.block_on(run_import(&config, &query, &file)),
        None => run_main_app(config, config_path, cli.query, rt),
    }
}

/// Daily rolling log file in `log_dir`, written from a background thread.
fn open_log_file(log_dir: &Path) -> Result<(NonBlocking, WorkerGuard), InitError> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("rollcall-desk")
        .filename_suffix("log")
        .build(log_dir)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Run the main window.
fn run_main_app(
    config: AppConfig,
    config_path: PathBuf,
    query: Option<String>,
    rt: tokio::runtime::Runtime,
) -> anyhow::Result<()> {
    let backend = rt
        .block_on(connect_backend(&config.store))
        .context("failed to open attendance store")?;

    let query = query.or_else(|| {
        (config.ui.remember_last_query && !config.ui.last_query.is_empty()).then(|| config.ui.last_query.clone())
    });
    let criteria = query.as_deref().map(FilterCriteria::from_query).unwrap_or_default();
    tracing::info!("Opening {}", criteria.scope());

    let view = AttendanceView::new(backend, rt.handle().clone(), criteria);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Rollcall Desk")
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([900.0, 600.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Rollcall Desk",
        options,
        Box::new(|cc| {
            let mut fonts = egui::FontDefinitions::default();
            egui_phosphor::add_to_fonts(&mut fonts, egui_phosphor::Variant::Regular);
            cc.egui_ctx.set_fonts(fonts);
            Ok(Box::new(MainApp::new(config, config_path, rt, view)))
        }),
    )
    .map_err(|e| anyhow::anyhow!("window error: {e}"))
}

/// Load the scope named by `query` and wait for it to settle.
async fn load_view(backend: Arc<dyn AttendanceBackend>, query: &str) -> anyhow::Result<AttendanceView> {
    let criteria = FilterCriteria::from_query(query);
    if criteria.group_id().is_none() {
        bail!("query must name a class (class=...)");
    }

    let mut view = AttendanceView::new(backend, tokio::runtime::Handle::current(), criteria);
    view.settle().await;
    if let app::service::QueryState::Failed(message) = view.query_state() {
        bail!("could not load {}: {message}", view.criteria().scope());
    }
    Ok(view)
}

async fn run_export(config: &AppConfig, query: &str, output: Option<PathBuf>, format: ExportFormat) -> anyhow::Result<()> {
    let backend = connect_backend(&config.store).await?;
    let mut view = load_view(backend, query).await?;

    let path = match output {
        Some(path) => path,
        None => {
            let name = view.export_filename(format.extension());
            match &config.export.directory {
                Some(dir) => dir.join(name),
                None => PathBuf::from(name),
            }
        }
    };

    let rows = match format {
        ExportFormat::Csv => view.export_csv(&path)?,
        ExportFormat::Xlsx => view.export_excel(&path)?,
    };
    println!("{rows} rows written to {}", path.display());
    Ok(())
}

async fn run_stats(config: &AppConfig, query: &str) -> anyhow::Result<()> {
    let backend = connect_backend(&config.store).await?;
    let view = load_view(backend, query).await?;
    // The backend's own totals are reported alongside, never in place of, the computed stats.
    let summary = serde_json::json!({
        "scope": view.criteria().scope().to_string(),
        "stats": view.stats(),
        "server_aggregate": view.server_aggregate(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_import(config: &AppConfig, query: &str, file: &Path) -> anyhow::Result<()> {
    let criteria = FilterCriteria::from_query(query);
    let Some(key) = criteria.scope().key() else {
        bail!("query must name a class (class=...)");
    };

    let content = std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let values: Vec<serde_json::Value> =
        serde_json::from_str(&content).with_context(|| format!("invalid records in {}", file.display()))?;
    let total = values.len();
    let records = records_from_values(values);

    let store = db::open_store(&config.store).await?;
    let count = records.len();
    store.put(&key, records).await?;
    if count < total {
        println!("{count} records imported into {key}, {} unreadable skipped", total - count);
    } else {
        println!("{count} records imported into {key}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unusable_log_dir_is_an_error() {
        let blocker = std::env::temp_dir().join(format!("rollcall_log_blocker_{}", std::process::id()));
        std::fs::write(&blocker, b"not a directory").unwrap();

        assert!(open_log_file(&blocker.join("logs")).is_err());
        let _ = std::fs::remove_file(&blocker);
    }
}
