use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::errors::GenError;
use crate::provider::ProviderKind;

/// ========================================
/// Test plan input
/// ========================================

pub const FIELD_ID: &str = "Test Case ID";
pub const FIELD_TITLE: &str = "Title";
pub const FIELD_OBJECTIVE: &str = "Objective";
pub const FIELD_PRECONDITIONS: &str = "Preconditions";
pub const FIELD_STEPS: &str = "Steps";
pub const FIELD_EXPECTED: &str = "Expected Result";

/// Columns an uploaded plan must carry, in display order.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    FIELD_ID,
    FIELD_TITLE,
    FIELD_OBJECTIVE,
    FIELD_PRECONDITIONS,
    FIELD_STEPS,
    FIELD_EXPECTED,
];

/// One manual test case as a bag of named fields. Unknown fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestCase(pub Map<String, Value>);

pub type TestPlan = Vec<TestCase>;

impl TestCase {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        TestCase(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Text value of a field; null, blank strings and missing keys are `None`.
    pub fn field(&self, name: &str) -> Option<String> {
        match self.0.get(name)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.trim().to_string()),
            other => Some(other.to_string()),
        }
    }

    pub fn id(&self) -> Option<String> { self.field(FIELD_ID) }
    pub fn title(&self) -> Option<String> { self.field(FIELD_TITLE) }
    pub fn objective(&self) -> Option<String> { self.field(FIELD_OBJECTIVE) }
    pub fn preconditions(&self) -> Option<String> { self.field(FIELD_PRECONDITIONS) }
    pub fn steps(&self) -> Option<String> { self.field(FIELD_STEPS) }
    pub fn expected(&self) -> Option<String> { self.field(FIELD_EXPECTED) }
}

/// ========================================
/// Request options
/// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framework {
    SeleniumPythonPytest,
    CypressJavascript,
    PlaywrightTypescript,
}

impl Framework {
    pub const ALL: [Framework; 3] = [
        Framework::SeleniumPythonPytest,
        Framework::CypressJavascript,
        Framework::PlaywrightTypescript,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::SeleniumPythonPytest => "selenium-python-pytest",
            Framework::CypressJavascript => "cypress-javascript",
            Framework::PlaywrightTypescript => "playwright-typescript",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Framework::SeleniumPythonPytest => "Selenium + Python + Pytest",
            Framework::CypressJavascript => "Cypress + JavaScript",
            Framework::PlaywrightTypescript => "Playwright + TypeScript",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = GenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Framework::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| GenError::UnsupportedFramework(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Template,
    Full,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Template => "template",
            Mode::Full => "full",
        }
    }

    /// What the mode means to the model; backends only ever see this text.
    pub fn meaning(&self) -> &'static str {
        match self {
            Mode::Full => "Full implementation with logic: runnable tests with real locators, actions and assertions",
            Mode::Template => "Template structure with TODOs: skeleton files with placeholders for locators and assertions",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = GenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "template" => Ok(Mode::Template),
            "full" => Ok(Mode::Full),
            other => Err(GenError::InvalidRequest(format!(
                "unknown mode {other:?} (expected \"template\" or \"full\")"
            ))),
        }
    }
}

/// Backend credential. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        ApiKey(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// ========================================
/// Generation request
/// ========================================

/// Untyped request body as callers send it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGenerationRequest {
    pub test_plan: Vec<TestCase>,
    pub framework: String,
    #[serde(default)]
    pub url: Option<String>,
    pub mode: String,
    pub provider: String,
    #[serde(default, alias = "api_key")]
    pub credential: Option<ApiKey>,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub test_plan: TestPlan,
    pub framework: Framework,
    pub url: Option<String>,
    pub mode: Mode,
    pub provider: ProviderKind,
    pub credential: Option<ApiKey>,
}

impl TryFrom<RawGenerationRequest> for GenerationRequest {
    type Error = GenError;

    fn try_from(raw: RawGenerationRequest) -> Result<Self, Self::Error> {
        Ok(GenerationRequest {
            provider: raw.provider.parse()?,
            framework: raw.framework.parse()?,
            mode: raw.mode.parse()?,
            url: raw.url.filter(|u| !u.trim().is_empty()),
            credential: raw.credential.filter(|k| !k.is_blank()),
            test_plan: raw.test_plan,
        })
    }
}

/// System + user text handed to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub system: String,
    pub user: String,
}

/// ========================================
/// Generated output
/// ========================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

impl GeneratedFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self { path: path.into(), content: content.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedProject {
    pub files: Vec<GeneratedFile>,
}

impl GeneratedProject {
    pub fn new(files: Vec<GeneratedFile>) -> Self {
        Self { files }
    }

    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }

    pub fn get(&self, path: &str) -> Option<&GeneratedFile> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
