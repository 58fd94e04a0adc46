use colored::Colorize;
use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use crate::orchestrator::GenerationOutput;
use crate::wire::GenerationRequest;

/// Spinner on stderr while the backend works; hidden when stderr is not a terminal.
pub fn spinner(req: &GenerationRequest) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(format!(
        "generating {} project via {} ({} test cases)",
        req.framework.display_name(),
        req.provider,
        req.test_plan.len()
    ));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

pub fn print_summary(out: &GenerationOutput, written_to: &Path) {
    println!(
        "\n{}",
        "┏━━━━━━━━━━━━━━━━━━━━━━━ Generated ━━━━━━━━━━━━━━━━━━━━━━━┓".bold()
    );
    println!(
        "  {}: {}   {}: {}   {}: {}",
        "Files".green().bold(),
        out.files.len(),
        "Size".cyan().bold(),
        format_size(out.archive.len(), DECIMAL),
        "Request".bold(),
        out.request_id
    );
    println!("{}", "┗━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━┛".bold());

    for path in &out.files {
        println!("  {} {}", "+".green(), path);
    }
    println!("\n{} {}", "archive:".bold(), written_to.display().to_string().underline());
}

pub fn print_failure(code: &str, message: &str) {
    eprintln!("{} {} {}", "error".red().bold(), format!("[{code}]").yellow(), message);
}
