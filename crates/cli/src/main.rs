// GridSift CLI - query, export and browse record grids

mod exit_codes;
mod tui;

use gridsift_cli::table::{self, ViewRequest};

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use gridsift_config::Settings;
use gridsift_engine::SessionOutcome;
use gridsift_io::{IoError, RecordTable};

use exit_codes::{EXIT_CANCELLED, EXIT_COMMIT_PARTIAL, EXIT_ERROR, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "gsift")]
#[command(about = "Filter, sort and edit record grids")]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Query and sort options shared by `query` and `export`
#[derive(Args)]
struct ViewArgs {
    /// Filter query (`layer:A-WALL,-layer:A-WALL`, `rot>45`, `=name rot@1`, `"exact text"`)
    #[arg(long, short = 'q', allow_hyphen_values = true)]
    query: Option<String>,

    /// Sort key, primary first (COL, COL:asc, COL:desc). Up to three are used.
    #[arg(long, short = 's')]
    sort: Vec<String>,

    /// Columns to show, in order
    #[arg(long, value_delimiter = ',')]
    columns: Option<Vec<String>>,
}

impl ViewArgs {
    fn request(self) -> ViewRequest {
        ViewRequest {
            query: self.query,
            sort: self.sort,
            columns: self.columns,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the records matching a query as an aligned table
    #[command(after_help = "\
Examples:
  gsift query blocks.csv -q 'layer:A-FURN rot>0' -s Name
  gsift query plan.json -q '=name =layer' --max-rows 20
  gsift query blocks.csv -s Layer -s Rotation:desc --json")]
    Query {
        /// Records file (.json array of objects, drawing .json, .csv, .tsv)
        input: PathBuf,

        #[command(flatten)]
        view: ViewArgs,

        /// Stop after this many rows (0 = all)
        #[arg(long, default_value_t = 0)]
        max_rows: usize,

        /// Print the matching records as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Write the records matching a query to a delimited file
    #[command(after_help = "\
Examples:
  gsift export blocks.csv -o furniture.csv -q layer:A-FURN
  gsift export plan.json -o plan.tsv --tsv -s Name")]
    Export {
        /// Records file (.json array of objects, drawing .json, .csv, .tsv)
        input: PathBuf,

        /// Output file
        #[arg(long, short = 'o')]
        output: PathBuf,

        #[command(flatten)]
        view: ViewArgs,

        /// Tab-separated output (overrides export.delimiter)
        #[arg(long)]
        tsv: bool,

        /// Leave out the header row
        #[arg(long)]
        no_headers: bool,
    },

    /// Open a drawing in the interactive grid
    #[command(after_help = "\
Examples:
  gsift browse plan.json
  gsift browse plan.json -q 'layer:A-' --paste rotations.tsv
  gsift browse plan.json --allow-create --select 0,2

On exit the returned records are printed as JSON.
Press ? inside the grid for keybindings.")]
    Browse {
        /// Drawing file (JSON with "version" and "documents")
        drawing: PathBuf,

        /// Initial filter query
        #[arg(long, short = 'q', allow_hyphen_values = true)]
        query: Option<String>,

        /// Tab-separated text pasted with Ctrl+V
        #[arg(long)]
        paste: Option<PathBuf>,

        /// Export target for `x` (default: <drawing>.export.csv)
        #[arg(long)]
        export_to: Option<PathBuf>,

        /// Allow deleting selected rows (Del) from the drawing
        #[arg(long)]
        allow_delete: bool,

        /// Confirming with nothing selected returns the search text
        #[arg(long)]
        allow_create: bool,

        /// Rows selected at start (zero-based record indices)
        #[arg(long, value_delimiter = ',')]
        select: Vec<usize>,
    },

    /// Print the settings file location
    Config,
}

/// Logging goes to stderr. The interactive grid owns the terminal, so it
/// only logs when RUST_LOG asks for it.
fn init_logging(interactive: bool) {
    if interactive && std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(matches!(cli.command, Some(Commands::Browse { .. })));

    let result = match cli.command {
        None => {
            // No subcommand = show help
            eprintln!("Usage: gsift <command> [options]");
            eprintln!("       gsift --help for more information");
            Ok(())
        }
        Some(Commands::Query {
            input,
            view,
            max_rows,
            json,
        }) => cmd_query(&input, view.request(), max_rows, json),
        Some(Commands::Export {
            input,
            output,
            view,
            tsv,
            no_headers,
        }) => cmd_export(&input, &output, view.request(), tsv, no_headers),
        Some(Commands::Browse {
            drawing,
            query,
            paste,
            export_to,
            allow_delete,
            allow_create,
            select,
        }) => cmd_browse(drawing, query, paste, export_to, allow_delete, allow_create, select),
        Some(Commands::Config) => {
            println!("{}", Settings::config_path_display());
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Exit with `code` and print nothing
    pub fn silent(code: u8) -> Self {
        Self { code, message: String::new(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<IoError> for CliError {
    fn from(err: IoError) -> Self {
        Self { code: EXIT_IO, message: err.to_string(), hint: None }
    }
}

fn load_table(input: &Path) -> Result<RecordTable, CliError> {
    let table = gridsift_io::load_records(input)?;
    log::debug!("{}: {} record(s), {} column(s)", input.display(), table.records.len(), table.columns.len());
    Ok(table)
}

fn cmd_query(input: &Path, request: ViewRequest, max_rows: usize, json: bool) -> Result<(), CliError> {
    let settings = Settings::load();
    let records = load_table(input)?;
    let session = table::open_session(records, &request, settings.session_options()).map_err(CliError::args)?;

    if json {
        let store = session.store();
        let records: Vec<_> = session
            .view()
            .rows()
            .iter()
            .filter_map(|&id| store.get(id).cloned())
            .collect();
        let value = table::records_to_json(&records, session.view().columns());
        let text = serde_json::to_string_pretty(&value).map_err(|e| CliError::error(e.to_string()))?;
        println!("{}", text);
    } else {
        print!("{}", table::render_table(&session, max_rows));
    }
    Ok(())
}

fn export_delimiter(settings: &Settings, tsv: bool) -> Result<u8, CliError> {
    if tsv {
        return Ok(b'\t');
    }
    let c = settings.export_delimiter;
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        Err(CliError::args(format!("export.delimiter {:?} is not a single-byte character", c))
            .with_hint(Settings::config_path_display()))
    }
}

fn cmd_export(input: &Path, output: &Path, request: ViewRequest, tsv: bool, no_headers: bool) -> Result<(), CliError> {
    let settings = Settings::load();
    let delimiter = export_delimiter(&settings, tsv)?;
    let records = load_table(input)?;
    let session = table::open_session(records, &request, settings.session_options()).map_err(CliError::args)?;

    let (headers, rows) = session.export_rows();
    let include_headers = settings.export_include_headers && !no_headers;
    gridsift_io::csv::export(output, &headers, &rows, delimiter, include_headers)?;
    eprintln!("exported {} row(s) to {}", rows.len(), output.display());
    Ok(())
}

fn outcome_name(outcome: &SessionOutcome) -> &'static str {
    match outcome {
        SessionOutcome::Cancelled => "cancelled",
        SessionOutcome::Selected(_) => "selected",
        SessionOutcome::Modified(_) => "modified",
        SessionOutcome::Created(_) => "created",
    }
}

fn cmd_browse(
    drawing: PathBuf,
    query: Option<String>,
    paste: Option<PathBuf>,
    export_to: Option<PathBuf>,
    allow_delete: bool,
    allow_create: bool,
    select: Vec<usize>,
) -> Result<(), CliError> {
    let settings = Settings::load();
    let delimiter = export_delimiter(&settings, false)?;
    let documents = gridsift_io::drawing::load(&drawing).map_err(|e| {
        CliError::from(e).with_hint("browse expects a drawing file: {\"version\": 1, \"documents\": [...]}")
    })?;
    let paste_text = paste
        .map(|p| gridsift_io::csv::read_file_as_utf8(&p))
        .transpose()?;

    let mut session_options = settings.session_options();
    session_options.allow_create_from_search = allow_create;
    session_options.initial_selection = select;

    let options = tui::BrowseOptions {
        export_path: export_to.unwrap_or_else(|| drawing.with_extension("export.csv")),
        drawing_path: drawing,
        paste_text,
        export_delimiter: delimiter,
        export_headers: settings.export_include_headers,
        allow_delete,
    };
    let result = tui::run(documents, options, session_options, query.as_deref()).map_err(CliError::error)?;

    let records = result.outcome.records();
    let output = serde_json::json!({
        "outcome": outcome_name(&result.outcome),
        "saved": result.saved,
        "records": table::records_to_json(&records, &result.columns),
    });
    let text = serde_json::to_string_pretty(&output).map_err(|e| CliError::error(e.to_string()))?;
    println!("{}", text);

    if result.failed_edits > 0 {
        return Err(CliError {
            code: EXIT_COMMIT_PARTIAL,
            message: format!("{} edit(s) failed in the last commit", result.failed_edits),
            hint: Some("run with RUST_LOG=warn to see each failure".to_string()),
        });
    }
    if result.outcome == SessionOutcome::Cancelled {
        return Err(CliError::silent(EXIT_CANCELLED));
    }
    Ok(())
}
