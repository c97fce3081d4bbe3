//! Duke Merge CLI - fill Word templates from spreadsheet rows

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use duke_merge::{
    enumerate_rows, generate, CancellationFlag, GenerateOptions, GenerationMode, MappingStore, MergeError,
    ProgressSink, RowPolicy, Session, Workbook, WorkbookExt, DEFAULT_HEADER_ROWS,
    DEFAULT_OUTPUT_PREFIX,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "duke-merge")]
#[command(
    author,
    version,
    about = "Generate one Word document per spreadsheet row"
)]
struct Cli {
    /// More log output (repeat for more)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate documents from a configuration file
    Generate {
        /// Configuration file (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Directory for the generated documents (created if missing)
        #[arg(short, long)]
        out: PathBuf,

        /// Output mode
        #[arg(short, long, default_value = "separate")]
        mode: String,

        /// Rows above the data
        #[arg(long, default_value_t = DEFAULT_HEADER_ROWS)]
        header_rows: u32,

        /// Which rows count as data: any-column or first-column
        #[arg(long, default_value = "any-column")]
        row_policy: RowPolicy,

        /// Output file name prefix
        #[arg(long, default_value = DEFAULT_OUTPUT_PREFIX)]
        prefix: String,

        /// Keep run formatting where tokens sit inside a single run
        #[arg(long)]
        preserve_formatting: bool,

        /// Use this spreadsheet instead of the configured one
        #[arg(long)]
        excel: Option<PathBuf>,

        /// Use this template instead of the configured one
        #[arg(long)]
        template: Option<PathBuf>,

        /// Stop after this many documents
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List the data rows of a spreadsheet
    Rows {
        /// Input spreadsheet file (xlsx, xlsm)
        #[arg(short, long)]
        excel: PathBuf,

        /// Rows above the data
        #[arg(long, default_value_t = DEFAULT_HEADER_ROWS)]
        header_rows: u32,

        /// Which rows count as data: any-column or first-column
        #[arg(long, default_value = "any-column")]
        row_policy: RowPolicy,
    },

    /// Show each mapping with the value currently at its cell
    Preview {
        /// Configuration file (YAML)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Edit the mappings of a configuration file
    Mapping {
        #[command(subcommand)]
        action: MappingAction,
    },

    /// Write a new configuration file
    Init {
        /// Configuration file to create
        #[arg(short, long)]
        config: PathBuf,

        /// Spreadsheet path to store
        #[arg(long)]
        excel: Option<PathBuf>,

        /// Template path to store
        #[arg(long)]
        template: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum MappingAction {
    /// Map a token to a cell (replaces an existing mapping of the token)
    Add {
        #[arg(short, long)]
        config: PathBuf,
        /// Token, with or without ${...}
        token: String,
        /// Cell reference whose column is used, e.g. B4
        cell_ref: String,
    },

    /// Remove the mapping of a token
    Remove {
        #[arg(short, long)]
        config: PathBuf,
        token: String,
    },

    /// Print the mappings
    List {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Generate {
            config,
            out,
            mode,
            header_rows,
            row_policy,
            prefix,
            preserve_formatting,
            excel,
            template,
            limit,
        } => {
            let options = GenerateOptions {
                header_rows,
                row_policy,
                output_prefix: prefix,
                preserve_run_formatting: preserve_formatting,
            };
            run_generate(
                &config,
                &out,
                &GenerationMode::parse(&mode),
                &options,
                excel.as_deref(),
                template.as_deref(),
                limit,
            )
        }
        Commands::Rows {
            excel,
            header_rows,
            row_policy,
        } => list_rows(&excel, header_rows, row_policy),
        Commands::Preview { config } => preview(&config),
        Commands::Mapping { action } => edit_mapping(action),
        Commands::Init {
            config,
            excel,
            template,
            force,
        } => init_config(&config, excel.as_deref(), template.as_deref(), force),
    }
}

/// Log to stderr; `RUST_LOG` wins over the flags
fn init_logging(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Progress line on stderr
///
/// Raises its cancellation flag once `limit` documents are written.
struct StderrProgress {
    limit: Option<usize>,
    cancel: CancellationFlag,
}

impl StderrProgress {
    fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            cancel: CancellationFlag::new(),
        }
    }
}

impl ProgressSink for StderrProgress {
    fn report(&mut self, done: usize, total: usize) {
        let mut stderr = io::stderr();
        let _ = write!(stderr, "\rGenerating documents... {}/{}", done, total);
        if done == total {
            let _ = writeln!(stderr);
        }
        let _ = stderr.flush();

        if self.limit.is_some_and(|limit| done >= limit) {
            self.cancel.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

fn run_generate(
    config_path: &Path,
    out: &Path,
    mode: &GenerationMode,
    options: &GenerateOptions,
    excel: Option<&Path>,
    template: Option<&Path>,
    limit: Option<usize>,
) -> Result<()> {
    let mut store = MappingStore::open(config_path)
        .with_context(|| format!("Failed to read '{}'", config_path.display()))?;
    if let Some(excel) = excel {
        store.set_excel_path(excel.to_string_lossy());
    }
    if let Some(template) = template {
        store.set_word_template_path(template.to_string_lossy());
    }
    tracing::debug!(
        mappings = store.list().len(),
        config = %config_path.display(),
        "configuration loaded"
    );

    std::fs::create_dir_all(out)
        .with_context(|| format!("Failed to create '{}'", out.display()))?;

    let mut progress = StderrProgress::new(limit);
    match generate(store.configuration(), out, mode, options, &mut progress) {
        Ok(count) => {
            if progress.is_cancelled() {
                eprintln!();
            }
            eprintln!("Generated {} document(s) in '{}'", count, out.display());
            Ok(())
        }
        Err(err) => {
            eprintln!();
            if let MergeError::BatchAbort(abort) = &err {
                eprintln!(
                    "{} document(s) were written before the failure.\n{}",
                    abort.generated,
                    abort.advisory()
                );
            }
            Err(err).context("Document generation failed")
        }
    }
}

fn list_rows(excel: &Path, header_rows: u32, policy: RowPolicy) -> Result<()> {
    let workbook =
        Workbook::open(excel).with_context(|| format!("Failed to open '{}'", excel.display()))?;
    let sheet = workbook
        .active_worksheet()
        .context("Workbook has no worksheets")?;

    let rows = enumerate_rows(sheet, header_rows, policy);
    let mut stdout = io::stdout().lock();
    for row in &rows {
        writeln!(stdout, "{}", row)?;
    }
    eprintln!(
        "{} data row(s) on sheet '{}' (last populated row {})",
        rows.len(),
        sheet.name(),
        sheet.max_row()
    );
    Ok(())
}

fn preview(config_path: &Path) -> Result<()> {
    let mut session = Session::new();
    session
        .load_config(config_path)
        .with_context(|| format!("Failed to read '{}'", config_path.display()))?;
    if session.worksheet().is_none() {
        eprintln!("Warning: the configured spreadsheet could not be opened");
    }

    let entries = session.store().list();
    if entries.is_empty() {
        println!("No mappings");
        return Ok(());
    }

    let width = entries
        .iter()
        .map(|e| e.normalized_reference().len())
        .max()
        .unwrap_or(0)
        .max("Cell".len());

    println!("{:<width$}  {:<24}  Token", "Cell", "Value", width = width);
    for entry in entries {
        let reference = entry.normalized_reference();
        let value = session
            .preview(&reference)
            .unwrap_or_else(|| "invalid cell reference".to_string());
        println!(
            "{:<width$}  {:<24}  {}",
            reference,
            value,
            entry.normalized_token(),
            width = width
        );
    }
    Ok(())
}

fn edit_mapping(action: MappingAction) -> Result<()> {
    match action {
        MappingAction::Add {
            config,
            token,
            cell_ref,
        } => {
            let mut store = if config.exists() {
                MappingStore::open(&config)
                    .with_context(|| format!("Failed to read '{}'", config.display()))?
            } else {
                MappingStore::new()
            };
            store.add(&token, &cell_ref);
            store
                .save(&config)
                .with_context(|| format!("Failed to write '{}'", config.display()))?;
            eprintln!(
                "Mapped {} to {}",
                duke_merge::normalize_token(&token),
                cell_ref.to_uppercase()
            );
        }
        MappingAction::Remove { config, token } => {
            let mut store = MappingStore::open(&config)
                .with_context(|| format!("Failed to read '{}'", config.display()))?;
            if !store.remove(&token) {
                bail!("No mapping for '{}'", token);
            }
            store
                .save(&config)
                .with_context(|| format!("Failed to write '{}'", config.display()))?;
        }
        MappingAction::List { config } => {
            let store = MappingStore::open(&config)
                .with_context(|| format!("Failed to read '{}'", config.display()))?;
            for entry in store.list() {
                println!(
                    "{}\t{}",
                    entry.normalized_token(),
                    entry.normalized_reference()
                );
            }
        }
    }
    Ok(())
}

fn init_config(
    config: &Path,
    excel: Option<&Path>,
    template: Option<&Path>,
    force: bool,
) -> Result<()> {
    if config.exists() && !force {
        bail!(
            "'{}' already exists (use --force to overwrite)",
            config.display()
        );
    }

    let mut store = MappingStore::new();
    if let Some(excel) = excel {
        store.set_excel_path(excel.to_string_lossy());
    }
    if let Some(template) = template {
        store.set_word_template_path(template.to_string_lossy());
    }
    store
        .save(config)
        .with_context(|| format!("Failed to write '{}'", config.display()))?;
    eprintln!("Wrote '{}'", config.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generate_defaults() {
        let cli = Cli::try_parse_from([
            "duke-merge",
            "generate",
            "--config",
            "mapping.yaml",
            "--out",
            "out",
        ])
        .unwrap();

        let Commands::Generate {
            mode,
            header_rows,
            row_policy,
            prefix,
            preserve_formatting,
            ..
        } = cli.command
        else {
            panic!("expected generate");
        };
        assert_eq!(mode, "separate");
        assert_eq!(header_rows, 3);
        assert_eq!(row_policy, RowPolicy::AnyColumn);
        assert_eq!(prefix, "document_");
        assert!(!preserve_formatting);
    }

    #[test]
    fn test_mapping_add_args() {
        let cli = Cli::try_parse_from([
            "duke-merge",
            "-v",
            "mapping",
            "add",
            "--config",
            "m.yaml",
            "name",
            "b4",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(
            cli.command,
            Commands::Mapping {
                action: MappingAction::Add { ref token, ref cell_ref, .. }
            } if token == "name" && cell_ref == "b4"
        ));
    }

    #[test]
    fn test_progress_limit_cancels() {
        let mut progress = StderrProgress::new(Some(2));
        progress.report(0, 5);
        progress.report(1, 5);
        assert!(!progress.is_cancelled());

        progress.report(2, 5);
        assert!(progress.is_cancelled());

        let mut unlimited = StderrProgress::new(None);
        unlimited.report(5, 5);
        assert!(!unlimited.is_cancelled());
    }

    #[test]
    fn test_generate_limit_arg() {
        let cli = Cli::try_parse_from([
            "duke-merge",
            "generate",
            "--config",
            "m.yaml",
            "--out",
            "out",
            "--limit",
            "3",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Generate { limit: Some(3), .. }
        ));
    }

    #[test]
    fn test_bad_row_policy_rejected() {
        let result = Cli::try_parse_from([
            "duke-merge",
            "rows",
            "--excel",
            "a.xlsx",
            "--row-policy",
            "sideways",
        ]);
        assert!(result.is_err());
    }
}
