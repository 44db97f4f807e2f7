use anyhow::Result;
use colored::Colorize;
use docdelve::commands::command_argument_builder;
use docdelve::handlers::{handle_explore, handle_init, handle_report};
use docdelve_core::print_banner;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    init_tracing(chosen_command.get_count("verbose"));

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    match chosen_command.subcommand() {
        // No subcommand provided, just show the banner
        None => Ok(()),
        Some(("init", primary_command)) => handle_init(primary_command),
        Some(("explore", primary_command)) => {
            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!(
                        "\n{} Stopping after the current step, partial results are kept",
                        "→".yellow().bold()
                    );
                    ctrl_c.cancel();
                }
            });
            handle_explore(primary_command, cancel).await
        }
        Some(("report", primary_command)) => handle_report(primary_command),
        _ => unreachable!("clap should ensure we don't get here"),
    }
}

/// `RUST_LOG` wins; otherwise `-v` raises the level of our own crates only.
fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,docdelve={level},docdelve_core={level},docdelve_scanner={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
