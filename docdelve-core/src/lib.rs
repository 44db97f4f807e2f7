pub mod data;
pub mod explore;
pub mod report;

use colored::Colorize;

pub fn print_banner() {
    let banner = r#"
     _            _      _
  __| | ___   ___| | ___| |_   _____
 / _` |/ _ \ / __| |/ _ \ \ \ / / _ \
| (_| | (_) | (__| |  __/ |\ V /  __/
 \__,_|\___/ \___|_|\___|_| \_/ \___|
"#;
    println!("{}", banner.bright_cyan().bold());
    println!(
        "  {} {}\n",
        "click-driven document discovery".bright_white(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
