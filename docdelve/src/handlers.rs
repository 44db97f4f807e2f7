use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use clap::parser::ValueSource;
use colored::Colorize;
use docdelve_core::data::{Database, RunStatus};
use docdelve_core::explore::{ExploreOptions, ExploreProgressCallback, RankerChoice, execute_explore};
use docdelve_core::report::{
    ReportData, ReportFormat, gather_report_data, generate_report, report_data_from_result,
    save_report,
};
use docdelve_scanner::ollama::{DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
use docdelve_scanner::{RunResult, Termination};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

pub const DATABASE_FILE: &str = "docdelve.db";

// Helper functions for explore handler

/// Load start URLs from either a file or a single URL argument
pub fn load_urls_from_source(
    url: Option<&Url>,
    hosts_file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    if let Some(hosts_file_path) = hosts_file {
        load_urls_from_file(hosts_file_path)
    } else if let Some(url) = url {
        Ok(vec![url.as_str().to_string()])
    } else {
        Err("Either --url or --hosts-file must be provided".to_string())
    }
}

/// Load and parse URLs from a file. Blank lines and `#` comments are skipped.
pub fn load_urls_from_file(path: &PathBuf) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read hosts file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add https:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    // Try to parse as-is
    if let Ok(url) = Url::parse(line)
        && url.has_host()
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("https://{}", line);
    if let Ok(url) = Url::parse(&with_scheme)
        && url.host_str().is_some_and(|host| host.contains('.') || host == "localhost")
    {
        return Some(with_scheme);
    }

    eprintln!("{} Skipping invalid URL '{}'", "⚠".yellow(), line);
    None
}

pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Build the options for exploring `url` from the `explore` arguments.
pub fn explore_options_from_args(url: &str, args: &ArgMatches) -> Result<ExploreOptions, String> {
    let mut options = ExploreOptions::new(url);

    if let Some(depth) = args.get_one::<usize>("max-depth") {
        options.max_depth = *depth;
    }
    if let Some(steps) = args.get_one::<usize>("step-budget") {
        if *steps == 0 {
            return Err("--step-budget must be at least 1".to_string());
        }
        options.step_budget = *steps;
    }
    options.time_budget = args
        .get_one::<u64>("time-budget")
        .map(|secs| Duration::from_secs(*secs));
    if let Some(secs) = args.get_one::<u64>("interaction-timeout") {
        options.interaction_timeout = Duration::from_secs(*secs);
    }
    if let Some(secs) = args.get_one::<u64>("rank-timeout") {
        options.rank_timeout = Duration::from_secs(*secs);
    }
    if let Some(failures) = args.get_one::<usize>("max-restore-failures") {
        options.max_restore_failures = *failures;
    }

    options.ranker = match args.get_one::<String>("ranker").map(String::as_str) {
        Some("order") => RankerChoice::DocumentOrder,
        Some("ollama") | None => RankerChoice::Ollama {
            url: args
                .get_one::<String>("ollama-url")
                .map(String::as_str)
                .unwrap_or(DEFAULT_OLLAMA_URL)
                .to_string(),
            model: args
                .get_one::<String>("model")
                .map(String::as_str)
                .unwrap_or(DEFAULT_MODEL)
                .to_string(),
        },
        Some(other) => return Err(format!("Unknown ranker '{}'", other)),
    };
    options.goal = args.get_one::<String>("goal").cloned();

    options.headless = !args.get_flag("headful");
    options.chrome_executable = args.get_one::<PathBuf>("chrome").cloned();
    if let Some(millis) = args.get_one::<u64>("settle-ms") {
        options.settle = Duration::from_millis(*millis);
    }
    if let Some(extensions) = args.get_many::<String>("extensions") {
        options.document_extensions = extensions
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
    }
    if options.document_extensions.is_empty() {
        return Err("--extensions needs at least one file extension".to_string());
    }

    Ok(options)
}

fn report_format(args: &ArgMatches) -> Result<ReportFormat> {
    let name = args
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    ReportFormat::from_str(name).ok_or_else(|| anyhow!("Unknown report format '{}'", name))
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> io::Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

fn write_report(content: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            save_report(content, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => print!("{}", content),
    }
    Ok(())
}

pub fn handle_init(args: &ArgMatches) -> Result<()> {
    print_divider();
    println!("{}", "  DOCDELVE INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let config_dir = expand_path(
        args.get_one::<String>("PATH")
            .map(String::as_str)
            .unwrap_or(crate::commands::DEFAULT_CONFIG_DIR),
    );
    let force = args.get_flag("force");
    let db_path = database_path(&config_dir);

    println!(
        "{} Target: {}",
        "→".blue(),
        config_dir.display().to_string().bright_white()
    );
    println!();

    if Database::exists(&db_path) {
        if !force {
            println!("{}", "⚠ WARNING".yellow().bold());
            println!("Database already exists at:");
            println!(
                "  {} {}",
                "•".yellow(),
                db_path.display().to_string().bright_white()
            );
            println!("{}", "Overwriting it deletes every recorded run.".yellow());
            println!();

            let response = print_prompt("Would you like to overwrite it? [y/N]:")?;
            println!();

            if response != "y" && response != "yes" {
                println!("{} Keeping existing database", "→".blue());
                println!();
                return Ok(());
            }
        }

        Database::drop(&db_path)
            .with_context(|| format!("Failed to remove {}", db_path.display()))?;
        println!("{} Existing database removed", "✓".green().bold());
    }

    println!("{} Creating directory structure...", "→".blue());
    fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;

    println!("{} Creating database...", "→".blue());
    Database::new(&db_path)
        .with_context(|| format!("Failed to create database at {}", db_path.display()))?;

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!();
    println!(
        "{} Config directory: {}",
        "✓".green().bold(),
        config_dir.display().to_string().bright_white()
    );
    println!(
        "{} Database: {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );
    println!();
    Ok(())
}

/// The default database is optional; one named on the command line is created if missing.
fn open_run_database(args: &ArgMatches) -> Result<Option<Database>> {
    if args.get_flag("no-db") {
        return Ok(None);
    }

    let Some(path) = args.get_one::<String>("db") else {
        return Ok(None);
    };
    let db_path = expand_path(path);
    let explicit = args.value_source("db") == Some(ValueSource::CommandLine);

    if !Database::exists(&db_path) {
        if !explicit {
            println!(
                "{} No database at {}, this run will not be recorded (run `docdelve init` to keep a history)",
                "ℹ".blue(),
                db_path.display()
            );
            return Ok(None);
        }
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let db = Database::new(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    Ok(Some(db))
}

fn print_run_header(options: &ExploreOptions, index: usize, total: usize) {
    println!();
    print_divider();
    if total > 1 {
        println!(
            "{} [{}/{}] {}",
            "Exploring".bright_white().bold(),
            index + 1,
            total,
            options.url.bright_white()
        );
    } else {
        println!("{} {}", "Exploring".bright_white().bold(), options.url.bright_white());
    }
    print_divider();

    let ranker = match &options.ranker {
        RankerChoice::Ollama { model, .. } => format!("ollama ({})", model),
        RankerChoice::DocumentOrder => "page order".to_string(),
    };
    println!("Max depth:   {}", options.max_depth);
    println!("Step budget: {}", options.step_budget);
    if let Some(budget) = options.time_budget {
        println!("Time budget: {}s", budget.as_secs());
    }
    println!("Ranker:      {}", ranker);
    println!("Documents:   {}\n", options.document_extensions.join(", "));
}

fn print_progress(message: String) {
    if message.starts_with("[+]") {
        println!("{}", message.green());
    } else if message.starts_with("[!]") {
        println!("{}", message.yellow());
    } else {
        println!("{}", message);
    }
}

fn print_run_summary(result: &RunResult) {
    println!();
    let headline = format!(
        "{} documents in {} states, {} clicks, {:.1}s",
        result.documents.len(),
        result.states_visited,
        result.steps,
        result.elapsed.as_secs_f64()
    );
    match &result.termination {
        Termination::Aborted { reason } => {
            println!("{} Exploration aborted: {}", "✗".red().bold(), reason);
            println!("  Partial results: {}", headline);
        }
        Termination::Cancelled => {
            println!("{} Exploration cancelled: {}", "→".yellow().bold(), headline);
        }
        other => println!(
            "{} Exploration complete ({}): {}",
            "✓".green().bold(),
            other.as_str().replace('_', " "),
            headline
        ),
    }
    if result.total_failures() > 0 {
        println!(
            "  {} navigation, {} restore, {} ranker failures",
            result.navigation_failures, result.restore_failures, result.ranker_failures
        );
    }
    println!();
}

pub async fn handle_explore(args: &ArgMatches, cancel: CancellationToken) -> Result<()> {
    let urls = load_urls_from_source(
        args.get_one::<Url>("url"),
        args.get_one::<PathBuf>("hosts-file"),
    )
    .map_err(|e| anyhow!(e))?;
    let format = report_format(args)?;
    let output = args.get_one::<PathBuf>("output");
    let db = open_run_database(args)?;

    let mut reports = Vec::new();
    let mut failed = Vec::new();

    for (index, url) in urls.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }

        let mut options = explore_options_from_args(url, args).map_err(|e| anyhow!(e))?;
        options.show_progress_bars = true;
        print_run_header(&options, index, urls.len());

        let run_id = match &db {
            Some(db) => Some(db.create_run(&options.url, Some(&options.to_json()))?),
            None => None,
        };

        let progress_callback: ExploreProgressCallback = Arc::new(print_progress);
        match execute_explore(options, Some(progress_callback), cancel.clone()).await {
            Ok(result) => {
                print_run_summary(&result);
                let data = match (&db, &run_id) {
                    (Some(db), Some(run_id)) => {
                        db.complete_run(run_id, &result)?;
                        info!("Recorded run {}", run_id);
                        gather_report_data(db, run_id)?
                            .ok_or_else(|| anyhow!("Run {} vanished from the database", run_id))?
                    }
                    _ => report_data_from_result("unrecorded", &result),
                };
                reports.push(data);
            }
            Err(e) => {
                if let (Some(db), Some(run_id)) = (&db, &run_id) {
                    db.fail_run(run_id, &e)?;
                }
                eprintln!("{} {}", "✗".red().bold(), e);
                failed.push(url.clone());
            }
        }
    }

    if !reports.is_empty() {
        let rendered = render_reports(&reports, format)?;
        write_report(&rendered, output)?;
    }

    if reports.is_empty() && !failed.is_empty() {
        bail!("Exploration failed for {}", failed.join(", "));
    }
    Ok(())
}

fn render_reports(reports: &[ReportData], format: ReportFormat) -> Result<String> {
    let rendered = reports
        .iter()
        .map(|data| generate_report(data, format))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(match format {
        ReportFormat::List => rendered.concat(),
        _ => rendered.join("\n"),
    })
}

pub fn handle_report(args: &ArgMatches) -> Result<()> {
    let db_path = expand_path(
        args.get_one::<String>("db")
            .map(String::as_str)
            .unwrap_or(crate::commands::DEFAULT_DATABASE),
    );
    if !Database::exists(&db_path) {
        bail!(
            "No database at {} (run `docdelve init` first)",
            db_path.display()
        );
    }
    let db = Database::new(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    let output = args.get_one::<PathBuf>("output");

    if args.get_flag("list-runs") {
        print_run_list(&db)?;
        return Ok(());
    }

    if args.get_flag("all-documents") {
        let mut listing = db.all_document_urls()?.join("\n");
        if !listing.is_empty() {
            listing.push('\n');
        }
        return write_report(&listing, output);
    }

    let run_id = match args.get_one::<String>("run") {
        Some(run_id) => run_id.clone(),
        None => db
            .latest_run_id()?
            .ok_or_else(|| anyhow!("No runs recorded in {}", db_path.display()))?,
    };
    let data = gather_report_data(&db, &run_id)?
        .ok_or_else(|| anyhow!("Unknown run '{}'", run_id))?;

    let report = generate_report(&data, report_format(args)?)?;
    write_report(&report, output)
}

fn print_run_list(db: &Database) -> Result<()> {
    let runs = db.list_runs()?;
    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<36}  {:<10}  {:>9}  {:>6}  {}",
            "RUN", "STATUS", "DOCUMENTS", "STATES", "START URL"
        )
        .bold()
    );
    for run in runs {
        let documents = db.get_documents(&run.id)?.len();
        let status = match run.status {
            RunStatus::Completed => run.status.as_str().green(),
            RunStatus::Failed => run.status.as_str().red(),
            RunStatus::Cancelled => run.status.as_str().yellow(),
            RunStatus::Running => run.status.as_str().blue(),
        };
        println!(
            "{:<36}  {:<10}  {:>9}  {:>6}  {}",
            run.id, status, documents, run.states_visited, run.start_url
        );
    }
    Ok(())
}

/// Database location for a config directory created by `init`.
pub fn database_path(config_dir: &Path) -> PathBuf {
    config_dir.join(DATABASE_FILE)
}
