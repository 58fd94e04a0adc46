use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::Serialize;
use serde_json::to_string_pretty;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::wire::{GenerationRequest, Instruction};

pub struct SavedPaths {
    pub dir: PathBuf,
    pub system: PathBuf,
    pub user: PathBuf,
    pub response: PathBuf,
    pub meta: PathBuf,
}

#[derive(Serialize)]
struct StageMeta<'a> {
    stage: &'a str,
    request_id: Uuid,
    timestamp: DateTime<Utc>,
    provider: &'a str,
    framework: &'a str,
    mode: &'a str,
    url: Option<&'a str>,
    test_cases: usize,
    system_bytes: usize,
    user_bytes: usize,
    response_bytes: usize,
}

pub fn tx_dir(root: &Path, tx: Uuid) -> PathBuf {
    root.join(tx.to_string())
}

/// Write one backend round trip under `<root>/<tx>/`. The credential is not
/// part of any file.
pub fn save_stage(
    root: &Path,
    tx: Uuid,
    stage: &str,
    req: &GenerationRequest,
    ins: &Instruction,
    response: &str,
) -> anyhow::Result<SavedPaths> {
    let dir = tx_dir(root, tx);
    fs::create_dir_all(&dir)?;

    let system = dir.join(format!("{stage}.system.txt"));
    let user = dir.join(format!("{stage}.user.txt"));
    let response_path = dir.join(format!("{stage}.response.txt"));
    let meta = dir.join(format!("{stage}.meta.json"));

    fs::write(&system, &ins.system)?;
    fs::write(&user, &ins.user)?;
    fs::write(&response_path, response)?;
    fs::write(
        &meta,
        to_string_pretty(&StageMeta {
            stage,
            request_id: tx,
            timestamp: Utc::now(),
            provider: req.provider.as_str(),
            framework: req.framework.as_str(),
            mode: req.mode.as_str(),
            url: req.url.as_deref(),
            test_cases: req.test_plan.len(),
            system_bytes: ins.system.len(),
            user_bytes: ins.user.len(),
            response_bytes: response.len(),
        })?,
    )?;

    Ok(SavedPaths { dir, system, user, response: response_path, meta })
}
