//! Command-line interface for `GeoLens`, a vector geospatial viewer engine.
//!
//! The binary loads a file or URL into a [`geolens_core::ViewerSession`] drawing into a
//! terminal sink, and exposes the session operations as subcommands and as an
//! interactive shell.
//!
//! # Available Commands
//!
//! - `inspect` - Show the CRS, feature counts and columns of a dataset
//! - `query` - Run SQL against table `data` and print the matching records
//! - `filter` - Apply an ad-hoc `<column> <op> <value>` filter
//! - `shell` - Line-oriented session over one dataset
//! - `drivers` - List known formats and their capabilities

mod display;
mod sink;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Level, info, warn};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use geolens_core::dataset::CurrentView;
use geolens_core::drivers::get_drivers;
use geolens_core::ingest::InputSource;
use geolens_core::{LoadReport, ViewerConfig, ViewerError, ViewerSession};

use crate::display::{format_drivers, format_legend, format_records, format_summary};
use crate::sink::TerminalSink;

#[derive(Parser)]
#[command(
    name = "geolens",
    version,
    about = "Load, reproject and query vector geospatial data",
    long_about = "GeoLens loads GeoJSON, zipped Shapefiles and (Geo)Parquet from files or URLs,\n\
                  normalizes them to WGS84 and lets you query them with SQL as table `data`."
)]
/// Command-line arguments and options for the `GeoLens` CLI.
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the `GeoLens` CLI.
#[derive(Subcommand)]
enum Commands {
    /// Displays the CRS, feature counts and columns of a dataset.
    Inspect {
        /// Path or http(s) URL of the dataset.
        #[arg(value_name = "INPUT")]
        input: String,

        /// Maximum number of features to display (0 for no limit).
        #[arg(short, long, default_value_t = 0)]
        limit: usize,
    },

    /// Runs SQL against table `data` and prints the matching records.
    ///
    /// Text that does not start with SELECT is used as a WHERE clause.
    Query {
        /// Path or http(s) URL of the dataset.
        #[arg(value_name = "INPUT")]
        input: String,

        /// Query or predicate, e.g. "pop > 1000000".
        #[arg(long, value_name = "SQL")]
        sql: String,

        /// Maximum number of features to display before querying (0 for no limit).
        #[arg(short, long, default_value_t = 0)]
        limit: usize,

        /// Maximum number of records to print.
        #[arg(long, default_value_t = 20)]
        max_rows: usize,

        /// Directory to export the result to as GeoJSON.
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Keeps the records matching `<column> <op> <value>`.
    Filter {
        /// Path or http(s) URL of the dataset.
        #[arg(value_name = "INPUT")]
        input: String,

        /// Filter expression, e.g. "country == 'FR'".
        #[arg(long = "where", value_name = "EXPR")]
        expression: String,

        /// Maximum number of records to print.
        #[arg(long, default_value_t = 20)]
        max_rows: usize,

        /// Directory to export the result to as GeoJSON.
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Starts a line-oriented session over a dataset. Type .help for commands.
    Shell {
        /// Path or http(s) URL of the dataset.
        #[arg(value_name = "INPUT")]
        input: String,
    },

    /// Lists all known formats and their capabilities.
    Drivers,
}

/// Entry point for the `GeoLens` command-line interface.
///
/// # Errors
///
/// Returns an error if command execution fails or if the logging system cannot be initialized.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // Bridge logs from the `log` crate to the `tracing` ecosystem.
    LogTracer::init()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Inspect { input, limit } => {
            info!("Inspecting {input}");
            handle_inspect(&input, limit).await?;
        },
        Commands::Query {
            input,
            sql,
            limit,
            max_rows,
            output,
        } => {
            info!("Querying {input}");
            handle_query(&input, &sql, limit, max_rows, output.as_deref()).await?;
        },
        Commands::Filter {
            input,
            expression,
            max_rows,
            output,
        } => {
            info!("Filtering {input}");
            handle_filter(&input, &expression, max_rows, output.as_deref()).await?;
        },
        Commands::Shell { input } => {
            handle_shell(&input).await?;
        },
        Commands::Drivers => {
            handle_drivers();
        },
    }

    Ok(())
}

/// A loaded session and the sink it draws into.
struct App {
    session: ViewerSession,
    sink: Arc<TerminalSink>,
    report: LoadReport,
}

/// Turn a viewer error into the message printed to the user.
fn user_error(err: ViewerError) -> anyhow::Error {
    match err.recovery_suggestion() {
        Some(hint) => anyhow!("{}\nHint: {hint}", err.user_message()),
        None => anyhow!(err.user_message()),
    }
}

async fn open(input: &str, config: ViewerConfig) -> Result<App> {
    let sink = Arc::new(TerminalSink::default());
    let mut session = ViewerSession::new(config, sink.clone()).map_err(user_error)?;
    if let Err(err) = session.connect_engine().await {
        warn!("{err}; SQL queries are disabled");
    }

    let source = InputSource::parse(input).map_err(user_error)?;
    let report = session.load(&source).await.map_err(user_error)?;
    session.wait_for_render().await;
    Ok(App {
        session,
        sink,
        report,
    })
}

fn export(session: &ViewerSession, dir: &Path) -> Result<()> {
    let path = session.export_current(dir).map_err(user_error)?;
    println!("Exported to {}", path.display());
    Ok(())
}

async fn handle_inspect(input: &str, limit: usize) -> Result<()> {
    let app = open(input, ViewerConfig::default().with_feature_limit(limit)).await?;
    println!("{}", format_summary(Some(&app.report), &app.session.summary()));
    if let Some(message) = app.sink.placeholder() {
        println!("{message}");
    }
    Ok(())
}

async fn handle_query(
    input: &str,
    sql: &str,
    limit: usize,
    max_rows: usize,
    output: Option<&Path>,
) -> Result<()> {
    let mut app = open(input, ViewerConfig::default().with_feature_limit(limit)).await?;
    let view = app.session.run_sql(sql).await.map_err(user_error)?;
    println!("{}", format_records(view, max_rows));
    app.session.wait_for_render().await;

    if let Some(dir) = output {
        export(&app.session, dir)?;
    }
    Ok(())
}

async fn handle_filter(
    input: &str,
    expression: &str,
    max_rows: usize,
    output: Option<&Path>,
) -> Result<()> {
    let mut app = open(input, ViewerConfig::default()).await?;
    let view = app.session.run_filter(expression).map_err(user_error)?;
    println!("{}", format_records(view, max_rows));
    app.session.wait_for_render().await;

    if let Some(dir) = output {
        export(&app.session, dir)?;
    }
    Ok(())
}

const SHELL_HELP: &str = "\
.limit N       show at most N features (0 for all)
.filter EXPR   keep records matching <column> <op> <value>
.reset         clear the filter
.fit           fit the view to the current features
.color [COL]   color by a column, or clear the coloring
.schema        show the dataset summary
.export DIR    write the current features as GeoJSON
.quit          leave the shell
anything else  SQL against table `data`";

enum ShellFlow {
    Continue,
    Quit,
}

async fn handle_shell(input: &str) -> Result<()> {
    let mut app = open(input, ViewerConfig::default()).await?;
    println!("{}", format_summary(Some(&app.report), &app.session.summary()));
    println!("Type .help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match run_shell_command(&mut app, line).await {
            Ok(ShellFlow::Quit) => break,
            Ok(ShellFlow::Continue) => {},
            Err(err) => eprintln!("Error: {err}"),
        }
    }
    Ok(())
}

async fn run_shell_command(app: &mut App, line: &str) -> Result<ShellFlow> {
    let (command, argument) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        ".quit" | ".exit" => return Ok(ShellFlow::Quit),
        ".help" => println!("{SHELL_HELP}"),
        ".limit" => {
            let limit: usize = argument
                .parse()
                .map_err(|_| anyhow!("Usage: .limit N"))?;
            app.session.change_limit(limit);
            app.session.wait_for_render().await;
            println!("Showing {} features", app.sink.drawn());
        },
        ".filter" => {
            let view = app.session.run_filter(argument).map_err(user_error)?;
            println!("{}", format_records(view, 20));
            app.session.wait_for_render().await;
        },
        ".reset" => {
            let shown = app.session.reset().map_or(0, CurrentView::len);
            app.session.wait_for_render().await;
            println!("Showing {shown} features");
        },
        ".fit" => match app.session.fit_view() {
            Some(b) => println!(
                "Bounds: [{:.6}, {:.6}, {:.6}, {:.6}]",
                b.min_x, b.min_y, b.max_x, b.max_y
            ),
            None => println!("Nothing to fit"),
        },
        ".color" => {
            let column = (!argument.is_empty()).then_some(argument);
            match app.session.set_color_column(column) {
                Some(scale) => println!("{}", format_legend(&scale)),
                None if column.is_some() => {
                    return Err(anyhow!("Column '{argument}' cannot be used for coloring"));
                },
                None => println!("Coloring cleared"),
            }
        },
        ".schema" => {
            let summary = app.sink.summary().unwrap_or_else(|| app.session.summary());
            println!("{}", format_summary(None, &summary));
        },
        ".export" => {
            if argument.is_empty() {
                return Err(anyhow!("Usage: .export DIR"));
            }
            export(&app.session, Path::new(argument))?;
        },
        other if other.starts_with('.') => {
            return Err(anyhow!("Unknown command {other}; type .help"));
        },
        _ => {
            let view = app.session.run_sql(line).await.map_err(user_error)?;
            println!("{}", format_records(view, 20));
            app.session.wait_for_render().await;
        },
    }

    Ok(ShellFlow::Continue)
}

/// Handles the `drivers` subcommand by displaying a formatted table of known formats.
fn handle_drivers() {
    let drivers = get_drivers();
    println!("\nKnown Drivers ({} total):\n", drivers.len());
    println!("{}", format_drivers(&drivers));
}

#[cfg(test)]
mod tests {
    use super::*;
    use geolens_core::error::{FormatError, QueryError};

    #[test]
    fn test_user_error_includes_hint() {
        let err = user_error(ViewerError::Format(FormatError::RemoteArchive {
            url: "https://example.com/a.zip".to_string(),
        }));
        let text = err.to_string();
        assert!(text.contains("https://example.com/a.zip"));
        assert!(text.contains("Hint: Download the archive"));

        let err = user_error(ViewerError::Query(QueryError::EmptyResult));
        assert_eq!(err.to_string(), "Query error: Query returned no rows");
    }

    #[test]
    fn test_cli_parses_filter_where() {
        let cli = Cli::try_parse_from([
            "geolens",
            "-v",
            "filter",
            "cities.geojson",
            "--where",
            "pop > 10",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Filter { ref expression, max_rows: 20, .. } if expression == "pop > 10"
        ));
    }
}
