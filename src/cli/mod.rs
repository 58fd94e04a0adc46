use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::provider::ProviderKind;
use crate::wire::{Framework, Mode};

#[derive(Parser, Debug)]
#[command(name = "testplan_codegen", version, about = "Turn manual test plans into runnable automated test projects")]
pub struct Args {
    /// TOML config file; environment variables override it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a zipped test project from a CSV or JSON test plan.
    Generate(GenerateArgs),

    /// Validate a CSV test plan and print it as JSON.
    ParseCsv {
        file: PathBuf,
    },

    /// Run the HTTP API.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
pub struct GenerateArgs {
    /// `.csv` with the required columns, or a JSON array of test cases.
    #[arg(long)]
    pub plan: PathBuf,

    /// selenium-python-pytest | cypress-javascript | playwright-typescript
    #[arg(long)]
    pub framework: Framework,

    #[arg(long, default_value = "template")]
    pub mode: Mode,

    #[arg(long, default_value = "mock")]
    pub provider: ProviderKind,

    #[arg(long)]
    pub url: Option<String>,

    /// Falls back to OPENAI_API_KEY / ANTHROPIC_API_KEY.
    #[arg(long)]
    pub api_key: Option<String>,

    /// Output file or directory; defaults to the generated archive name in the current directory.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Keep prompt/response transcripts (under `.testgen/transcripts` unless configured).
    #[arg(long, default_value_t = false)]
    pub save_transcript: bool,
}
