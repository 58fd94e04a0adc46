use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::collections::HashSet;

use crate::wire::{Framework, GeneratedFile, GeneratedProject, TestCase, TestPlan};

const DEFAULT_BASE_URL: &str = "http://localhost:3000";

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]").expect("static pattern"));

/// Lower-case `raw` and replace every character outside `[a-z0-9]` with `_`.
pub fn sanitize_identifier(raw: &str) -> String {
    NON_ALNUM.replace_all(&raw.to_lowercase(), "_").into_owned()
}

/// One file stem per case: the sanitized identifier, or `tc_<n>` (1-based)
/// when there is none. A stem taken by an earlier case gets `_<n>` appended.
pub fn case_stems(plan: &TestPlan) -> Vec<String> {
    let mut used = HashSet::new();
    plan.iter()
        .enumerate()
        .map(|(i, tc)| {
            let n = i + 1;
            let mut stem = tc
                .id()
                .map(|id| sanitize_identifier(&id))
                .unwrap_or_else(|| format!("tc_{n}"));
            while !used.insert(stem.clone()) {
                stem = format!("{stem}_{n}");
            }
            stem
        })
        .collect()
}

/// Build a runnable-looking project without any model call. Output depends
/// only on the arguments.
pub fn synthesize(plan: &TestPlan, framework: Framework, url: Option<&str>) -> GeneratedProject {
    let base_url = url.filter(|u| !u.trim().is_empty()).unwrap_or(DEFAULT_BASE_URL);
    let stems = case_stems(plan);

    let (mut files, tests): (Vec<GeneratedFile>, Vec<GeneratedFile>) = match framework {
        Framework::SeleniumPythonPytest => (
            selenium_boilerplate(base_url),
            plan.iter().zip(&stems).map(|(tc, stem)| selenium_test(tc, stem)).collect(),
        ),
        Framework::CypressJavascript => (
            cypress_boilerplate(base_url),
            plan.iter().zip(&stems).map(|(tc, stem)| cypress_spec(tc, stem)).collect(),
        ),
        Framework::PlaywrightTypescript => (
            playwright_boilerplate(base_url),
            plan.iter().zip(&stems).map(|(tc, stem)| playwright_spec(tc, stem)).collect(),
        ),
    };

    files.push(readme(framework, base_url, plan, &tests));
    files.extend(tests);
    GeneratedProject::new(files)
}

// ---------------------------------------------------------------------------
// shared rendering
// ---------------------------------------------------------------------------

/// Quoted string literal valid in Python, JavaScript and TypeScript.
fn lit(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

fn label(tc: &TestCase, stem: &str) -> String {
    tc.title().or_else(|| tc.id()).unwrap_or_else(|| stem.to_string())
}

/// The case fields as line comments. Every physical line gets the prefix, so
/// field text can never escape the comment.
fn comment_block(tc: &TestCase, prefix: &str) -> String {
    let fields = [
        ("Test Case ID", tc.id()),
        ("Title", tc.title()),
        ("Objective", tc.objective()),
        ("Preconditions", tc.preconditions()),
        ("Steps", tc.steps()),
        ("Expected Result", tc.expected()),
    ];

    let mut out = String::new();
    for (name, value) in fields {
        let value = value
            .unwrap_or_else(|| "(not specified)".to_string())
            .replace("\r\n", "\n")
            .replace(['\r', '\u{2028}', '\u{2029}'], "\n");
        let mut lines = value.lines();
        out.push_str(&format!("{prefix} {name}: {}\n", lines.next().unwrap_or_default()));
        for line in lines {
            out.push_str(&format!("{prefix}   {line}\n"));
        }
    }
    out
}

fn pretty(value: serde_json::Value) -> String {
    let mut s = serde_json::to_string_pretty(&value).unwrap_or_default();
    s.push('\n');
    s
}

fn readme(framework: Framework, base_url: &str, plan: &TestPlan, tests: &[GeneratedFile]) -> GeneratedFile {
    let (setup, run) = match framework {
        Framework::SeleniumPythonPytest => ("pip install -r requirements.txt", "pytest"),
        Framework::CypressJavascript => ("npm install", "npm run cy:run"),
        Framework::PlaywrightTypescript => ("npm install && npx playwright install", "npm test"),
    };

    let mut cases = String::new();
    for (tc, file) in plan.iter().zip(tests) {
        let id = tc.id().unwrap_or_else(|| "(no id)".to_string());
        let title = tc.title().unwrap_or_default();
        cases.push_str(&format!("- `{}`: {} {}\n", file.path, id, title).replace(" \n", "\n"));
    }

    GeneratedFile::new(
        "README.md",
        format!(
r#"# E2E tests ({display})

Generated from a test plan with {count} test case(s). Each test is a skeleton:
the manual steps are recorded as comments and the implementation is marked TODO.

## Setup

    {setup}

## Run

    {run}

Set `BASE_URL` to point the suite at another environment (default: {base_url}).

## Test cases

{cases}"#,
            display = framework.display_name(),
            count = plan.len(),
        ),
    )
}

// ---------------------------------------------------------------------------
// selenium-python-pytest
// ---------------------------------------------------------------------------

fn selenium_boilerplate(base_url: &str) -> Vec<GeneratedFile> {
    vec![
        GeneratedFile::new("requirements.txt", "pytest>=8.0\nselenium>=4.15\nwebdriver-manager>=4.0\n"),
        GeneratedFile::new(
            "pytest.ini",
            "[pytest]\ntestpaths = tests\naddopts = -ra\nmarkers =\n    e2e: end-to-end browser test\n",
        ),
        GeneratedFile::new(
            "conftest.py",
            format!(
r#"import os

import pytest
from selenium import webdriver
from selenium.webdriver.chrome.service import Service
from webdriver_manager.chrome import ChromeDriverManager

DEFAULT_BASE_URL = {url}


@pytest.fixture(scope="session")
def base_url() -> str:
    return os.environ.get("BASE_URL", DEFAULT_BASE_URL)


@pytest.fixture
def driver():
    options = webdriver.ChromeOptions()
    if os.environ.get("HEADLESS", "1") == "1":
        options.add_argument("--headless=new")
    drv = webdriver.Chrome(service=Service(ChromeDriverManager().install()), options=options)
    yield drv
    drv.quit()
"#,
                url = lit(base_url)
            ),
        ),
        GeneratedFile::new("pages/__init__.py", ""),
        GeneratedFile::new(
            "pages/base_page.py",
r#"from selenium.webdriver.remote.webdriver import WebDriver
from selenium.webdriver.remote.webelement import WebElement
from selenium.webdriver.support import expected_conditions as EC
from selenium.webdriver.support.ui import WebDriverWait


class BasePage:
    def __init__(self, driver: WebDriver, timeout: int = 10) -> None:
        self.driver = driver
        self.wait = WebDriverWait(driver, timeout)

    def open(self, url: str) -> None:
        self.driver.get(url)

    def wait_visible(self, locator: tuple[str, str]) -> WebElement:
        return self.wait.until(EC.visibility_of_element_located(locator))

    def wait_clickable(self, locator: tuple[str, str]) -> WebElement:
        return self.wait.until(EC.element_to_be_clickable(locator))
"#,
        ),
    ]
}

fn selenium_test(tc: &TestCase, stem: &str) -> GeneratedFile {
    GeneratedFile::new(
        format!("tests/test_{stem}.py"),
        format!(
r#"{comments}
import pytest

from pages.base_page import BasePage


@pytest.mark.e2e
def test_{stem}(driver, base_url):
    page = BasePage(driver)
    page.open(base_url)
    # TODO: implement the steps above and assert the expected result.
    pytest.skip({reason})
"#,
            comments = comment_block(tc, "#"),
            reason = lit(&format!("TODO: implement {}", label(tc, stem))),
        ),
    )
}

// ---------------------------------------------------------------------------
// cypress-javascript
// ---------------------------------------------------------------------------

fn cypress_boilerplate(base_url: &str) -> Vec<GeneratedFile> {
    vec![
        GeneratedFile::new(
            "package.json",
            pretty(json!({
                "name": "e2e-tests",
                "version": "1.0.0",
                "private": true,
                "scripts": { "cy:open": "cypress open", "cy:run": "cypress run" },
                "devDependencies": { "cypress": "^13.6.0" }
            })),
        ),
        GeneratedFile::new(
            "cypress.config.js",
            format!(
r#"const {{ defineConfig }} = require('cypress');

module.exports = defineConfig({{
  e2e: {{
    baseUrl: process.env.BASE_URL || {url},
    specPattern: 'cypress/e2e/**/*.cy.js',
    supportFile: 'cypress/support/e2e.js',
  }},
}});
"#,
                url = lit(base_url)
            ),
        ),
        GeneratedFile::new("cypress/support/e2e.js", "import './commands';\n"),
        GeneratedFile::new(
            "cypress/support/commands.js",
r#"// Custom commands shared by the generated specs.
Cypress.Commands.add('fillField', (selector, value) => {
  cy.get(selector).clear().type(value);
});
"#,
        ),
    ]
}

fn cypress_spec(tc: &TestCase, stem: &str) -> GeneratedFile {
    GeneratedFile::new(
        format!("cypress/e2e/{stem}.cy.js"),
        format!(
r#"{comments}
describe({suite}, () => {{
  it({name}, () => {{
    cy.visit('/');
    // TODO: implement the steps above and assert the expected result.
    cy.log('TODO: not implemented');
  }});
}});
"#,
            comments = comment_block(tc, "//"),
            suite = lit(&tc.id().unwrap_or_else(|| stem.to_string())),
            name = lit(&label(tc, stem)),
        ),
    )
}

// ---------------------------------------------------------------------------
// playwright-typescript
// ---------------------------------------------------------------------------

fn playwright_boilerplate(base_url: &str) -> Vec<GeneratedFile> {
    vec![
        GeneratedFile::new(
            "package.json",
            pretty(json!({
                "name": "e2e-tests",
                "version": "1.0.0",
                "private": true,
                "scripts": { "test": "playwright test" },
                "devDependencies": { "@playwright/test": "^1.44.0", "typescript": "^5.4.0" }
            })),
        ),
        GeneratedFile::new(
            "playwright.config.ts",
            format!(
r#"import {{ defineConfig }} from '@playwright/test';

export default defineConfig({{
  testDir: './tests',
  use: {{
    baseURL: process.env.BASE_URL ?? {url},
  }},
}});
"#,
                url = lit(base_url)
            ),
        ),
        GeneratedFile::new(
            "pages/base-page.ts",
r#"import { Page } from '@playwright/test';

export class BasePage {
  constructor(protected readonly page: Page) {}

  async open(path = '/'): Promise<void> {
    await this.page.goto(path);
  }
}
"#,
        ),
    ]
}

fn playwright_spec(tc: &TestCase, stem: &str) -> GeneratedFile {
    GeneratedFile::new(
        format!("tests/{stem}.spec.ts"),
        format!(
r#"{comments}
import {{ test }} from '@playwright/test';
import {{ BasePage }} from '../pages/base-page';

test.describe({suite}, () => {{
  test({name}, async ({{ page }}) => {{
    const base = new BasePage(page);
    await base.open();
    // TODO: implement the steps above and assert the expected result.
    test.fixme(true, 'TODO: not implemented');
  }});
}});
"#,
            comments = comment_block(tc, "//"),
            suite = lit(&tc.id().unwrap_or_else(|| stem.to_string())),
            name = lit(&label(tc, stem)),
        ),
    )
}
