use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::archive;
use crate::config::Config;
use crate::errors::{GenError, Result};
use crate::extract::extract;
use crate::log;
use crate::prompt;
use crate::provider::retry::invoke_with_retry;
use crate::provider::{self, DynProvider, ProviderKind};
use crate::template::{self, sanitize_identifier};
use crate::wire::{Framework, GeneratedProject, GenerationRequest, Instruction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    PromptBuilt,
    BackendInvoked,
    ResponseExtracted,
    SkeletonSynthesized,
    Packaged,
}

/// Where adapters come from. Production uses [`Registry`]; tests swap in
/// scripted backends.
pub trait BackendFactory: Send + Sync {
    fn make(&self, kind: ProviderKind, cfg: &Config) -> Result<DynProvider>;
}

pub struct Registry;

impl BackendFactory for Registry {
    fn make(&self, kind: ProviderKind, cfg: &Config) -> Result<DynProvider> {
        provider::make_provider(kind, cfg)
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub request_id: Uuid,
    pub filename: String,
    pub archive: Vec<u8>,
    pub files: Vec<String>,
    pub trace: Vec<Stage>,
}

struct Run {
    id: Uuid,
    trace: Vec<Stage>,
}

impl Run {
    fn new() -> Self {
        Self { id: Uuid::new_v4(), trace: vec![Stage::Idle] }
    }

    fn advance(&mut self, to: Stage) {
        debug!(request_id = %self.id, from = ?self.trace.last(), to = ?to, "stage");
        self.trace.push(to);
    }

    fn current(&self) -> Stage {
        self.trace.last().copied().unwrap_or(Stage::Idle)
    }
}

#[derive(Clone)]
pub struct Generator {
    cfg: Arc<Config>,
    backends: Arc<dyn BackendFactory>,
}

impl Generator {
    pub fn new(cfg: Arc<Config>) -> Self {
        Self::with_backends(cfg, Arc::new(Registry))
    }

    pub fn with_backends(cfg: Arc<Config>, backends: Arc<dyn BackendFactory>) -> Self {
        Self { cfg, backends }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Run one request to a finished archive. Nothing is packaged unless the
    /// whole file list validated. Dropping the future aborts an in-flight
    /// backend call.
    pub async fn generate(&self, req: GenerationRequest) -> Result<GenerationOutput> {
        let mut run = Run::new();
        info!(
            request_id = %run.id,
            framework = %req.framework,
            provider = %req.provider,
            mode = %req.mode,
            cases = req.test_plan.len(),
            "generation started"
        );

        match self.run(&req, &mut run).await {
            Ok(out) => {
                info!(
                    request_id = %run.id,
                    files = out.files.len(),
                    bytes = out.archive.len(),
                    filename = %out.filename,
                    "generation finished"
                );
                Ok(out)
            }
            Err(e) => {
                warn!(request_id = %run.id, stage = ?run.current(), code = e.code(), error = %e, "generation failed");
                Err(e)
            }
        }
    }

    async fn run(&self, req: &GenerationRequest, run: &mut Run) -> Result<GenerationOutput> {
        if req.test_plan.is_empty() {
            return Err(GenError::InvalidRequest("test plan is empty".into()));
        }

        let project = match req.provider {
            ProviderKind::Mock => {
                let project = template::synthesize(&req.test_plan, req.framework, req.url.as_deref());
                run.advance(Stage::SkeletonSynthesized);
                project
            }
            kind => self.generate_with_backend(kind, req, run).await?,
        };

        let archive = archive::pack(&project)?;
        run.advance(Stage::Packaged);

        Ok(GenerationOutput {
            request_id: run.id,
            filename: archive_filename(req.url.as_deref(), req.framework),
            archive,
            files: project.files.into_iter().map(|f| f.path).collect(),
            trace: run.trace.clone(),
        })
    }

    async fn generate_with_backend(
        &self,
        kind: ProviderKind,
        req: &GenerationRequest,
        run: &mut Run,
    ) -> Result<GeneratedProject> {
        let credential = req
            .credential
            .as_ref()
            .filter(|k| !k.is_blank())
            .or_else(|| self.cfg.default_credential(kind).filter(|k| !k.is_blank()))
            .ok_or_else(|| GenError::Authentication(format!("no API key provided for {kind}")))?;
        let backend = self.backends.make(kind, &self.cfg)?;

        let ins = prompt::build_instruction(req);
        run.advance(Stage::PromptBuilt);
        let raw = invoke_with_retry(backend.as_ref(), &ins, Some(credential), &self.cfg.retry).await?;
        run.advance(Stage::BackendInvoked);
        self.record(run.id, "generate", req, &ins, &raw).await;

        let err = match extract(&raw) {
            Ok(project) => {
                run.advance(Stage::ResponseExtracted);
                return Ok(project);
            }
            Err(e) => e,
        };
        if let GenError::MalformedResponse { reason, raw } = &err {
            debug!(request_id = %run.id, %reason, raw = %raw, "unusable backend reply");
        }
        if !self.cfg.reprompt_on_malformed {
            return Err(err);
        }

        warn!(request_id = %run.id, error = %err, "re-prompting in strict mode");
        let strict = prompt::build_strict_instruction(req);
        run.advance(Stage::PromptBuilt);
        let raw = invoke_with_retry(backend.as_ref(), &strict, Some(credential), &self.cfg.retry).await?;
        run.advance(Stage::BackendInvoked);
        self.record(run.id, "generate.strict", req, &strict, &raw).await;

        let project = extract(&raw)?;
        run.advance(Stage::ResponseExtracted);
        Ok(project)
    }

    /// Transcript writes are blocking file IO, so they run on the blocking pool.
    async fn record(&self, tx: Uuid, stage: &'static str, req: &GenerationRequest, ins: &Instruction, raw: &str) {
        let Some(dir) = self.cfg.transcript_dir.clone() else { return };
        let (req, ins, raw) = (req.clone(), ins.clone(), raw.to_string());
        let saved =
            tokio::task::spawn_blocking(move || log::save_stage(Path::new(&dir), tx, stage, &req, &ins, &raw)).await;
        match saved {
            Ok(Ok(paths)) => debug!(request_id = %tx, dir = %paths.dir.display(), "transcript saved"),
            Ok(Err(e)) => warn!(request_id = %tx, error = %e, "could not save transcript"),
            Err(e) => warn!(request_id = %tx, error = %e, "transcript writer did not finish"),
        }
    }
}

/// `tests_e2e_<site>_<framework>.zip`, with `app` when no usable URL is given.
pub fn archive_filename(url: Option<&str>, framework: Framework) -> String {
    let site = url.and_then(primary_label).unwrap_or_else(|| "app".to_string());
    format!("tests_e2e_{}_{}.zip", site, sanitize_identifier(framework.as_str()))
}

/// First DNS label of the host, skipping a leading `www`. Accepts bare hosts
/// like `shop.example.com:8080/login` as well as full URLs.
fn primary_label(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let host = Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| {
            let rest = raw.split_once("://").map_or(raw, |(_, r)| r);
            let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
            let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
            host.split(':').next().unwrap_or_default().to_string()
        });

    let host = host.trim_start_matches("www.");
    let label = sanitize_identifier(host.split('.').next().unwrap_or_default());
    (!label.is_empty()).then_some(label)
}
