use crate::CLAP_STYLING;
use clap::{ArgAction, arg, command, value_parser};
use docdelve_scanner::ollama::{DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_CONFIG_DIR: &str = "~/.config/docdelve/";
pub const DEFAULT_DATABASE: &str = "~/.config/docdelve/docdelve.db";

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("docdelve")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("docdelve")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(-v --"verbose" "Increase log verbosity (-v info, -vv debug, -vvv trace)")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes the docdelve database on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Directory to store the docdelve database")
                        .default_value(DEFAULT_CONFIG_DIR),
                )
                .arg(
                    arg!(-f --"force")
                        .help(
                            "Forces the overwriting of any existing database at the specified \
                        location.",
                        )
                        .required(false),
                ),
        )
        .subcommand(
            command!("explore")
                .about(
                    "Click through an interactive site in a real browser and collect every \
                document link reachable within the depth cap.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required_unless_present("hosts-file")
                        .help("The start page to explore")
                        .value_parser(value_parser!(Url))
                        .conflicts_with("hosts-file"),
                )
                .arg(
                    arg!(-H --"hosts-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of start pages, explored one after another")
                        .value_parser(value_parser!(PathBuf))
                        .conflicts_with("url"),
                )
                .arg(
                    arg!(-d --"max-depth" <DEPTH>)
                        .required(false)
                        .help("Maximum number of clicks away from the start page")
                        .value_parser(value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"step-budget" <STEPS>)
                        .required(false)
                        .help("Stop after this many clicks")
                        .value_parser(value_parser!(usize))
                        .default_value("200"),
                )
                .arg(
                    arg!(--"time-budget" <SECONDS>)
                        .required(false)
                        .help("Stop after this many seconds (default: no limit)")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    arg!(--"interaction-timeout" <SECONDS>)
                        .required(false)
                        .help("Give up on a single click after this many seconds")
                        .value_parser(value_parser!(u64))
                        .default_value("30"),
                )
                .arg(
                    arg!(--"rank-timeout" <SECONDS>)
                        .required(false)
                        .help("Fall back to page order when ranking takes longer than this")
                        .value_parser(value_parser!(u64))
                        .default_value("60"),
                )
                .arg(
                    arg!(--"max-restore-failures" <COUNT>)
                        .required(false)
                        .help("Abort after this many consecutive failed returns to an earlier page")
                        .value_parser(value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"ranker" <RANKER>)
                        .required(false)
                        .help("How to order clickable elements: ollama (LLM) or order (page order)")
                        .value_parser(["ollama", "order"])
                        .default_value("ollama"),
                )
                .arg(
                    arg!(--"ollama-url" <URL>)
                        .required(false)
                        .help("Base URL of the Ollama server")
                        .default_value(DEFAULT_OLLAMA_URL),
                )
                .arg(
                    arg!(-m --"model" <MODEL>)
                        .required(false)
                        .help("Ollama model used for ranking")
                        .default_value(DEFAULT_MODEL),
                )
                .arg(
                    arg!(--"goal" <TEXT>)
                        .required(false)
                        .help("Describe what the ranker should look for (default: tender documents)"),
                )
                .arg(
                    arg!(--"headful")
                        .required(false)
                        .help("Show the browser window instead of running headless")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"chrome" <PATH>)
                        .required(false)
                        .help("Path to the Chrome/Chromium executable")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"settle-ms" <MILLIS>)
                        .required(false)
                        .help("Time to let a page settle after each load or click")
                        .value_parser(value_parser!(u64))
                        .default_value("1500"),
                )
                .arg(
                    arg!(-e --"extensions" <EXT>)
                        .required(false)
                        .help("Comma-separated file extensions that count as documents")
                        .action(ArgAction::Append)
                        .value_delimiter(',')
                        .default_value("pdf"),
                )
                .arg(
                    arg!(--"db" <PATH>)
                        .required(false)
                        .help("Database to record the run in")
                        .default_value(DEFAULT_DATABASE),
                )
                .arg(
                    arg!(--"no-db")
                        .required(false)
                        .help("Do not record the run")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, markdown, list")
                        .value_parser(["text", "json", "markdown", "list"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            command!("report")
                .about("Render the report of a recorded run")
                .arg(
                    arg!(--"db" <PATH>)
                        .required(false)
                        .help("Database holding the runs")
                        .default_value(DEFAULT_DATABASE),
                )
                .arg(
                    arg!(-r --"run" <RUN_ID>)
                        .required(false)
                        .help("Run to report on (default: the latest run)"),
                )
                .arg(
                    arg!(-l --"list-runs")
                        .required(false)
                        .help("List recorded runs instead of rendering a report")
                        .action(ArgAction::SetTrue)
                        .conflicts_with_all(["run", "all-documents"]),
                )
                .arg(
                    arg!(--"all-documents")
                        .required(false)
                        .help("Print every document URL found by any run, one per line")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("run"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, markdown, list")
                        .value_parser(["text", "json", "markdown", "list"])
                        .default_value("text"),
                ),
        )
}
