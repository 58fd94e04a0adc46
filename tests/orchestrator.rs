use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use testplan_codegen::archive::unpack;
use testplan_codegen::config::Config;
use testplan_codegen::errors::{GenError, Result};
use testplan_codegen::orchestrator::{BackendFactory, Generator, Stage};
use testplan_codegen::provider::retry::RetryPolicy;
use testplan_codegen::provider::{DynProvider, Provider, ProviderKind};
use testplan_codegen::wire::{ApiKey, Framework, GenerationRequest, Instruction, Mode, TestCase};

const GOOD: &str = "Here is your code:\n```json\n{\"files\":[{\"path\":\"a.py\",\"content\":\"x\"}]}\n```\nEnjoy!";

/// Replays canned replies in order and records what it was asked.
#[derive(Default)]
struct Script {
    replies: Mutex<VecDeque<Result<String>>>,
    seen: Mutex<Vec<(Instruction, Option<String>)>>,
    made: Mutex<usize>,
}

impl Script {
    fn new(replies: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Script { replies: Mutex::new(replies.into()), ..Default::default() })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

struct ScriptedBackend(Arc<Script>);

#[async_trait]
impl Provider for ScriptedBackend {
    async fn invoke(&self, ins: &Instruction, credential: Option<&ApiKey>) -> Result<String> {
        self.0
            .seen
            .lock()
            .unwrap()
            .push((ins.clone(), credential.map(|k| k.expose().to_string())));
        self.0
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenError::permanent("script exhausted")))
    }
}

struct ScriptedFactory(Arc<Script>);

impl BackendFactory for ScriptedFactory {
    fn make(&self, _kind: ProviderKind, _cfg: &Config) -> Result<DynProvider> {
        *self.0.made.lock().unwrap() += 1;
        Ok(Box::new(ScriptedBackend(self.0.clone())))
    }
}

fn config() -> Config {
    let mut cfg = Config::default();
    cfg.retry = RetryPolicy { max_retries: 2, base_delay_ms: 1, max_delay_ms: 2 };
    cfg.openai.api_key = Some(ApiKey::new("sk-env-default"));
    cfg
}

fn scripted(cfg: Config, script: &Arc<Script>) -> Generator {
    Generator::with_backends(Arc::new(cfg), Arc::new(ScriptedFactory(script.clone())))
}

fn plan() -> Vec<TestCase> {
    vec![
        TestCase::from_pairs([
            ("Test Case ID", json!("TC-01")),
            ("Title", json!("Login with valid credentials")),
            ("Steps", json!("1. Open /login\n2. Submit")),
            ("Expected Result", json!("Dashboard is shown")),
        ]),
        TestCase::from_pairs([("Test Case ID", json!("TC 02!")), ("Title", json!("Logout"))]),
    ]
}

fn request(provider: ProviderKind) -> GenerationRequest {
    GenerationRequest {
        test_plan: plan(),
        framework: Framework::SeleniumPythonPytest,
        url: Some("https://www.shop.example.com".into()),
        mode: Mode::Template,
        provider,
        credential: None,
    }
}

#[tokio::test]
async fn mock_template_archives_are_byte_identical() {
    let gen = Generator::new(Arc::new(Config::default()));
    let a = gen.generate(request(ProviderKind::Mock)).await.unwrap();
    let b = gen.generate(request(ProviderKind::Mock)).await.unwrap();

    assert_eq!(a.archive, b.archive);
    assert_ne!(a.request_id, b.request_id);
    assert_eq!(a.filename, "tests_e2e_shop_selenium_python_pytest.zip");
    assert_eq!(a.trace, vec![Stage::Idle, Stage::SkeletonSynthesized, Stage::Packaged]);

    let paths: Vec<String> = unpack(&a.archive).unwrap().into_iter().map(|f| f.path).collect();
    assert_eq!(paths, a.files);
    for expected in ["requirements.txt", "pytest.ini", "pages/base_page.py", "tests/test_tc_01.py", "tests/test_tc_02_.py"] {
        assert!(paths.iter().any(|p| p == expected), "missing {expected} in {paths:?}");
    }
}

#[tokio::test]
async fn mock_needs_no_credential_and_never_calls_a_backend() {
    let script = Script::new(vec![]);
    let out = scripted(Config::default(), &script).generate(request(ProviderKind::Mock)).await.unwrap();
    assert!(!out.archive.is_empty());
    assert_eq!(*script.made.lock().unwrap(), 0);
}

#[tokio::test]
async fn backend_reply_is_extracted_and_packaged() {
    let script = Script::new(vec![Ok(GOOD.into())]);
    let out = scripted(config(), &script).generate(request(ProviderKind::OpenAI)).await.unwrap();

    assert_eq!(out.files, vec!["a.py"]);
    assert_eq!(
        out.trace,
        vec![Stage::Idle, Stage::PromptBuilt, Stage::BackendInvoked, Stage::ResponseExtracted, Stage::Packaged]
    );
    let files = unpack(&out.archive).unwrap();
    assert_eq!(files[0].content, "x");

    let seen = script.seen.lock().unwrap();
    assert!(seen[0].0.user.contains("Target URL: https://www.shop.example.com"));
    assert_eq!(seen[0].1.as_deref(), Some("sk-env-default"));
}

#[tokio::test]
async fn request_credential_wins_over_config_default() {
    let script = Script::new(vec![Ok(GOOD.into())]);
    let mut req = request(ProviderKind::OpenAI);
    req.credential = Some(ApiKey::new("sk-from-request"));
    scripted(config(), &script).generate(req).await.unwrap();
    assert_eq!(script.seen.lock().unwrap()[0].1.as_deref(), Some("sk-from-request"));
}

#[tokio::test]
async fn missing_credential_fails_before_any_backend_call() {
    let script = Script::new(vec![Ok(GOOD.into())]);
    let err = scripted(config(), &script).generate(request(ProviderKind::Anthropic)).await.unwrap_err();
    assert_eq!(err.code(), "AUTHENTICATION_ERROR");
    assert_eq!(*script.made.lock().unwrap(), 0);
    assert_eq!(script.calls(), 0);
}

#[tokio::test]
async fn malformed_reply_gets_one_strict_reprompt() {
    let script = Script::new(vec![Ok("Sorry, I cannot comply.".into()), Ok(GOOD.into())]);
    let out = scripted(config(), &script).generate(request(ProviderKind::OpenAI)).await.unwrap();

    assert_eq!(out.files, vec!["a.py"]);
    let seen = script.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(!seen[0].0.system.contains("STRICT MODE"));
    assert!(seen[1].0.system.contains("STRICT MODE"));
    assert_eq!(seen[0].0.user, seen[1].0.user);
    assert_eq!(out.trace.iter().filter(|s| **s == Stage::PromptBuilt).count(), 2);
}

#[tokio::test]
async fn second_malformed_reply_fails_the_request() {
    let script = Script::new(vec![Ok("nope".into()), Ok("{\"files\": []}".into()), Ok(GOOD.into())]);
    let err = scripted(config(), &script).generate(request(ProviderKind::OpenAI)).await.unwrap_err();
    assert_eq!(err.code(), "MALFORMED_RESPONSE");
    assert_eq!(script.calls(), 2);
}

#[tokio::test]
async fn reprompt_can_be_disabled() {
    let script = Script::new(vec![Ok("nope".into()), Ok(GOOD.into())]);
    let mut cfg = config();
    cfg.reprompt_on_malformed = false;
    let err = scripted(cfg, &script).generate(request(ProviderKind::OpenAI)).await.unwrap_err();
    assert_eq!(err.code(), "MALFORMED_RESPONSE");
    assert_eq!(script.calls(), 1);
}

#[tokio::test]
async fn traversal_in_reply_aborts_without_archive() {
    let reply = json!({ "files": [
        { "path": "README.md", "content": "ok" },
        { "path": "../../etc/passwd", "content": "root::0:0" }
    ]})
    .to_string();
    let script = Script::new(vec![Ok(reply)]);
    let err = scripted(config(), &script).generate(request(ProviderKind::OpenAI)).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_PATH");
}

#[tokio::test]
async fn transient_failures_are_retried_and_auth_failures_are_not() {
    let script = Script::new(vec![Err(GenError::transient("HTTP 503")), Ok(GOOD.into())]);
    scripted(config(), &script).generate(request(ProviderKind::OpenAI)).await.unwrap();
    assert_eq!(script.calls(), 2);

    let script = Script::new(vec![Err(GenError::Authentication("HTTP 401".into())), Ok(GOOD.into())]);
    let err = scripted(config(), &script).generate(request(ProviderKind::OpenAI)).await.unwrap_err();
    assert_eq!(err.code(), "AUTHENTICATION_ERROR");
    assert_eq!(script.calls(), 1);
}

#[tokio::test]
async fn empty_plan_is_rejected() {
    let mut req = request(ProviderKind::Mock);
    req.test_plan.clear();
    let err = Generator::new(Arc::new(Config::default())).generate(req).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");
}

#[tokio::test]
async fn transcripts_are_written_per_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config();
    cfg.transcript_dir = Some(tmp.path().to_string_lossy().into_owned());
    let script = Script::new(vec![Ok("nope".into()), Ok(GOOD.into())]);
    let out = scripted(cfg, &script).generate(request(ProviderKind::OpenAI)).await.unwrap();

    let dir = tmp.path().join(out.request_id.to_string());
    for name in ["generate.response.txt", "generate.strict.response.txt", "generate.strict.meta.json"] {
        assert!(dir.join(name).is_file(), "missing {name}");
    }
    assert_eq!(std::fs::read_to_string(dir.join("generate.response.txt")).unwrap(), "nope");
}

#[tokio::test]
async fn blank_request_credential_falls_back_to_config_default() {
    let script = Script::new(vec![Ok(GOOD.into())]);
    let mut req = request(ProviderKind::OpenAI);
    req.credential = Some(ApiKey::new("   "));
    scripted(config(), &script).generate(req).await.unwrap();
    assert_eq!(script.seen.lock().unwrap()[0].1.as_deref(), Some("sk-env-default"));
}

#[tokio::test]
async fn blank_config_default_is_not_a_credential() {
    let script = Script::new(vec![Ok(GOOD.into())]);
    let mut cfg = config();
    cfg.openai.api_key = Some(ApiKey::new(""));
    let err = scripted(cfg, &script).generate(request(ProviderKind::OpenAI)).await.unwrap_err();
    assert_eq!(err.code(), "AUTHENTICATION_ERROR");
    assert_eq!(script.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unwritable_transcript_dir_does_not_fail_the_request() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("not-a-dir");
    std::fs::write(&blocker, "file").unwrap();
    let mut cfg = config();
    cfg.transcript_dir = Some(blocker.to_string_lossy().into_owned());

    let script = Script::new(vec![Ok(GOOD.into())]);
    let out = scripted(cfg, &script).generate(request(ProviderKind::OpenAI)).await.unwrap();
    assert_eq!(out.files, vec!["a.py"]);
    assert!(blocker.is_file());
}
