use async_trait::async_trait;

use super::Provider;
use crate::errors::{GenError, Result};
use crate::wire::{ApiKey, GeneratedFile, GeneratedProject, Instruction};

/// Network-free backend with a fixed reply. The reply is wrapped in prose and
/// a json fence the way chatty models answer, so the full extraction path
/// runs against it.
pub struct MockProvider;

pub fn demo_project() -> GeneratedProject {
    GeneratedProject::new(vec![
        GeneratedFile::new("README.md", "# Mock Project\nThis is a generated mock project.\n"),
        GeneratedFile::new("requirements.txt", "pytest\nselenium\n"),
        GeneratedFile::new("tests/test_mock.py", "def test_example():\n    assert True\n"),
    ])
}

#[async_trait]
impl Provider for MockProvider {
    async fn invoke(&self, _ins: &Instruction, _credential: Option<&ApiKey>) -> Result<String> {
        let payload = serde_json::to_string_pretty(&demo_project())
            .map_err(|e| GenError::permanent(format!("mock payload: {e}")))?;
        Ok(format!("Here is the generated project:\n```json\n{payload}\n```\nGood luck!"))
    }
}
