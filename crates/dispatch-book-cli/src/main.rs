//! dispatch-book CLI - HTTP endpoint and one-shot updates

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use dispatch_book::{Layout, Loose, RecordUpdater, SaveRequest};
use dispatch_book_cli::{serve, ServerConfig};
use dispatch_book_xlsx::XlsxReader;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dispatch-book")]
#[command(
    author,
    version,
    about = "Record dispatch quantities and water-meter readings in a workbook"
)]
struct Cli {
    /// Workbook (.xlsx) or JSON document to update
    #[arg(long, global = true, default_value = "Dispatch order.xlsx")]
    store: PathBuf,

    /// Store format (default: from the store's extension)
    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,

    /// Layout table (TOML); the built-in layout when omitted
    ///
    /// The built-in layout writes four sheets: " Daily Dispatch", "Water
    /// Quantity", " Monthly production" and "Second meter production". For a
    /// workbook with only the first two, pass a layout without the
    /// `monthly_production` and `second_meter` sections, such as
    /// `crates/dispatch-book/layouts/two-sheet.toml`.
    #[arg(long, global = true)]
    layout: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    Xlsx,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the save form and the /save_data endpoint
    ///
    /// Every sheet named by the layout must exist in the workbook; see
    /// `--layout` for workbooks without the production sheets.
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, env = "PORT", default_value_t = 5000)]
        port: u16,

        /// Directory holding index.html
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Record a dispatched quantity
    Dispatch {
        #[arg(long)]
        location: String,

        #[arg(long)]
        quantity: Decimal,

        /// Day of the month (1-31)
        #[arg(long)]
        day: u32,
    },

    /// Record meter readings for a ship (water quantity and production sheets)
    Meter {
        #[arg(long)]
        ship: u32,

        /// Final reading of meter 1
        #[arg(long = "final")]
        final_reading: Decimal,

        /// Previous reading of meter 1
        #[arg(long)]
        previous: Decimal,

        /// Final reading of meter 2
        #[arg(long)]
        meter2: Option<Decimal>,

        /// YYYY-MM-DD or RFC 3339
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
    },

    /// Record a monthly production reading
    Production {
        #[arg(long)]
        ship: u32,

        #[arg(long)]
        reading: Decimal,

        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
    },

    /// Record a second meter reading
    SecondMeter {
        #[arg(long)]
        ship: u32,

        #[arg(long)]
        reading: Decimal,

        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
    },

    /// List all sheets in a workbook
    Sheets {
        /// Input workbook
        input: PathBuf,
    },

    /// Print the layout table as TOML
    Layout,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sheets { input } => list_sheets(&input),
        Commands::Layout => {
            let layout = load_layout(cli.layout.as_deref())?;
            print!("{}", layout.to_toml()?);
            Ok(())
        }
        Commands::Serve {
            host,
            port,
            static_dir,
        } => {
            let updater = open_updater(&cli.store, cli.backend, cli.layout.as_deref())?;
            let config = ServerConfig {
                host,
                port,
                static_dir,
            };
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime
                .block_on(serve(config, updater))
                .context("Server error")
        }
        Commands::Dispatch {
            location,
            quantity,
            day,
        } => {
            let updater = open_updater(&cli.store, cli.backend, cli.layout.as_deref())?;
            report(updater.update_dispatch(&location, quantity, day))
        }
        Commands::Meter {
            ship,
            final_reading,
            previous,
            meter2,
            date,
        } => {
            let updater = open_updater(&cli.store, cli.backend, cli.layout.as_deref())?;
            let request = SaveRequest {
                kind: "meter".into(),
                ship_number: Some(Loose::from(ship)),
                meter1_final: Some(decimal_field(final_reading)),
                meter1_previous: Some(decimal_field(previous)),
                meter2_final: meter2.map(decimal_field),
                date: Some(date.format("%Y-%m-%d").to_string()),
                ..Default::default()
            };
            let commands = request.to_commands(updater.layout())?;
            report(updater.apply(&commands))
        }
        Commands::Production { ship, reading, date } => {
            let updater = open_updater(&cli.store, cli.backend, cli.layout.as_deref())?;
            report(updater.update_monthly_production(ship, reading, date))
        }
        Commands::SecondMeter { ship, reading, date } => {
            let updater = open_updater(&cli.store, cli.backend, cli.layout.as_deref())?;
            report(updater.update_second_meter(ship, reading, date))
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    dispatch_book::request::parse_date(s).map_err(|e| e.to_string())
}

fn decimal_field(value: Decimal) -> Loose {
    Loose::Text(value.to_string())
}

fn load_layout(path: Option<&Path>) -> Result<Layout> {
    match path {
        Some(path) => Layout::load(path)
            .with_context(|| format!("Failed to load layout '{}'", path.display())),
        None => Ok(Layout::default()),
    }
}

fn open_updater(store: &Path, backend: Option<Backend>, layout: Option<&Path>) -> Result<RecordUpdater> {
    let layout = load_layout(layout)?;
    let backend = backend.unwrap_or_else(|| backend_for(store));

    let updater = match backend {
        Backend::Xlsx => {
            if !store.exists() {
                tracing::warn!("workbook '{}' does not exist yet", store.display());
            }
            RecordUpdater::xlsx(store, layout)
        }
        Backend::Json => RecordUpdater::json(store, layout),
    };
    Ok(updater)
}

fn backend_for(store: &Path) -> Backend {
    match store.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => Backend::Json,
        _ => Backend::Xlsx,
    }
}

fn report(result: dispatch_book::Result<Vec<dispatch_book::AppliedWrite>>) -> Result<()> {
    let writes = match result {
        Ok(writes) => writes,
        Err(e) => bail!("Failed to save: {e}"),
    };
    for write in writes {
        println!("{write}");
    }
    Ok(())
}

fn list_sheets(input: &Path) -> Result<()> {
    let workbook = XlsxReader::read_file(input)
        .with_context(|| format!("Failed to open '{}'", input.display()))?;

    for (i, name) in workbook.sheet_names().into_iter().enumerate() {
        println!("{}\t{:?}", i, name);
    }

    Ok(())
}
