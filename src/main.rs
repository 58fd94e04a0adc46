use anyhow::{Context, Result};
use clap::Parser;
use fs_err as fs;
use serde::Deserialize;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use testplan_codegen::cli::{Args, Command, GenerateArgs};
use testplan_codegen::config::Config;
use testplan_codegen::errors::GenError;
use testplan_codegen::ingest;
use testplan_codegen::orchestrator::Generator;
use testplan_codegen::server;
use testplan_codegen::ux;
use testplan_codegen::wire::{ApiKey, GenerationRequest, TestPlan};

const DEFAULT_TRANSCRIPT_DIR: &str = ".testgen/transcripts";

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(args.debug);

    let mut cfg = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Generate(g) => {
            if let Err(e) = run_generate(cfg, g).await {
                match e.downcast_ref::<GenError>() {
                    Some(ge) => ux::print_failure(ge.code(), &ge.to_string()),
                    None => ux::print_failure("ERROR", &format!("{e:#}")),
                }
                std::process::exit(1);
            }
            Ok(())
        }
        Command::ParseCsv { file } => {
            let plan = ingest::parse_test_plan(&fs::read(&file)?)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        }
        Command::Serve { bind } => {
            if let Some(b) = bind {
                cfg.bind = b;
            }
            let addr: SocketAddr = cfg
                .bind
                .parse()
                .with_context(|| format!("invalid bind address {:?}", cfg.bind))?;
            server::serve(addr, Generator::new(Arc::new(cfg))).await
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug,hyper=info,h2=info,rustls=info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_generate(mut cfg: Config, g: GenerateArgs) -> Result<()> {
    if g.save_transcript && cfg.transcript_dir.is_none() {
        cfg.transcript_dir = Some(DEFAULT_TRANSCRIPT_DIR.to_string());
    }

    let req = GenerationRequest {
        test_plan: load_plan(&g.plan)?,
        framework: g.framework,
        url: g.url.filter(|u| !u.trim().is_empty()),
        mode: g.mode,
        provider: g.provider,
        credential: g.api_key.map(ApiKey::new).filter(|k| !k.is_blank()),
    };

    let generator = Generator::new(Arc::new(cfg));
    let pb = ux::spinner(&req);
    let result = generator.generate(req).await;
    pb.finish_and_clear();
    let out = result?;

    let dest = resolve_out(g.out.as_deref(), &out.filename);
    write_atomic(&dest, &out.archive)?;
    ux::print_summary(&out, &dest);
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanFile {
    Cases(TestPlan),
    Wrapped { test_cases: TestPlan },
}

/// `.csv` goes through column validation; anything else is read as JSON,
/// either a bare array or the `{"test_cases": [...]}` shape the API returns.
fn load_plan(path: &Path) -> Result<TestPlan> {
    let bytes = fs::read(path)?;
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if is_csv {
        return Ok(ingest::parse_test_plan(&bytes)?);
    }
    let plan: PlanFile = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not a JSON list of test cases", path.display()))?;
    Ok(match plan {
        PlanFile::Cases(cases) | PlanFile::Wrapped { test_cases: cases } => cases,
    })
}

fn resolve_out(out: Option<&Path>, filename: &str) -> PathBuf {
    match out {
        None => PathBuf::from(filename),
        Some(p) if p.is_dir() => p.join(filename),
        Some(p) => p.to_path_buf(),
    }
}

/// Write next to the destination, then rename, so a failed run never leaves a partial archive.
fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match dest.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.write_all(bytes)?;
    tmp.persist(dest)
        .map_err(|e| e.error)
        .with_context(|| format!("writing {}", dest.display()))?;
    Ok(())
}
