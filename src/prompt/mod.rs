use crate::wire::{Framework, GenerationRequest, Instruction, Mode, TestPlan};

fn role(framework: Framework) -> String {
    format!(
        "You are an expert QA Automation Engineer specializing in {}.\n\
         Your task is to generate a complete test automation project from the provided test plan.",
        framework.display_name()
    )
}

fn selenium_rules() -> &'static str {
r#"Project Layout (Page Object Model):
- `pages/` holds one page object per screen; every page object extends `pages/base_page.py::BasePage`.
- `tests/` holds one `test_<case id>.py` module per test case; test functions are named `test_<case id>`.
- `conftest.py` provides a `driver` fixture (Chrome via webdriver-manager, quit on teardown) and a `base_url` fixture read from the BASE_URL environment variable, defaulting to the target URL.

Interaction Mapping:
| Plan wording                   | Code                                                                 |
|--------------------------------|----------------------------------------------------------------------|
| fill / enter / type <value>    | `self.wait_visible(locator).clear()` then `.send_keys(value)`        |
| click / press / select         | `self.wait_clickable(locator).click()`                               |
| navigate / open                | `self.driver.get(url)`                                               |
| verify / should / expected     | `assert` on element text, visibility, URL or title                   |

Required Files:
1. `requirements.txt` (MUST include: pytest, selenium, webdriver-manager)
2. `pytest.ini` (testpaths = tests, markers registered)
3. `README.md` (setup, how to run, BASE_URL override)
4. `conftest.py`
5. `pages/__init__.py` and `pages/base_page.py`

Best Practices:
- Use explicit waits (WebDriverWait + expected_conditions); never time.sleep.
- Use type hints.
- Prefer specific selectors (ID, name, data-testid, CSS) over XPath."#
}

fn cypress_rules() -> &'static str {
r#"Project Layout (flat spec files):
- `cypress/e2e/<case id>.cy.js` holds one spec per test case with a single `describe` and one `it` per scenario.
- Reusable actions live in `cypress/support/commands.js` as custom commands; no page-object classes.
- `cypress.config.js` sets `e2e.baseUrl` from the target URL and `specPattern` to `cypress/e2e/**/*.cy.js`.

Interaction Mapping:
| Plan wording                   | Code                                              |
|--------------------------------|---------------------------------------------------|
| fill / enter / type <value>    | `cy.get(selector).clear().type(value)`            |
| click / press / select         | `cy.get(selector).click()` / `.select(option)`    |
| navigate / open                | `cy.visit(path)`                                  |
| verify / should / expected     | `.should('be.visible')`, `.should('contain', t)`, `cy.url().should(...)` |

Required Files:
1. `package.json` (devDependencies: cypress; scripts: `cy:open`, `cy:run`)
2. `cypress.config.js`
3. `cypress/support/e2e.js` (imports ./commands)
4. `cypress/support/commands.js`
5. `README.md` (install, how to run headless and interactive)

Best Practices:
- Rely on Cypress retry-ability; never use fixed `cy.wait(ms)`.
- Prefer `data-testid` / `data-cy` selectors."#
}

fn playwright_rules() -> &'static str {
r#"Project Layout (Page Object Model):
- `pages/` holds one page object class per screen; every class extends `pages/base-page.ts::BasePage`.
- `tests/<case id>.spec.ts` holds one spec per test case using `test.describe` / `test`.
- `playwright.config.ts` sets `use.baseURL` from the target URL and `testDir: './tests'`.

Interaction Mapping:
| Plan wording                   | Code                                                     |
|--------------------------------|----------------------------------------------------------|
| fill / enter / type <value>    | `await page.getByLabel(label).fill(value)` or `locator.fill(value)` |
| click / press / select         | `await page.getByRole(role, { name }).click()` / `selectOption` |
| navigate / open                | `await page.goto(path)`                                  |
| verify / should / expected     | `await expect(locator).toBeVisible()` / `toHaveText` / `expect(page).toHaveURL` |

Required Files:
1. `package.json` (devDependencies: @playwright/test, typescript; scripts: `test`)
2. `playwright.config.ts`
3. `pages/base-page.ts`
4. `README.md` (install browsers, how to run)

Best Practices:
- Use web-first assertions and auto-waiting locators; never `waitForTimeout`.
- Prefer role, label and test-id locators over CSS chains."#
}

fn rules(framework: Framework) -> &'static str {
    match framework {
        Framework::SeleniumPythonPytest => selenium_rules(),
        Framework::CypressJavascript => cypress_rules(),
        Framework::PlaywrightTypescript => playwright_rules(),
    }
}

fn output_contract() -> &'static str {
r##"Output Contract (NON-NEGOTIABLE):
Output MUST be a single valid JSON object with exactly one key "files", an ordered list of objects.
Each object must have "path" (relative file path, forward slashes, no leading "/", no "..") and "content" (full file content as a string).

Example Output:
{
  "files": [
    { "path": "README.md", "content": "# Tests\n..." },
    { "path": "<test file path>", "content": "..." }
  ]
}

- One file per test case, named after its "Test Case ID" (lower-case, non-alphanumerics replaced by "_").
- Include every required file listed above.
- Do not omit files, do not truncate content, do not use placeholders like "...rest of file"."##
}

fn strict_block() -> &'static str {
r#"STRICT MODE: your previous answer could not be parsed.
- Reply with the JSON object ONLY: no markdown, no prose, no code fences, nothing before "{" or after "}".
- Every entry MUST have a non-empty string "path" and a string "content".
- Escape quotes, backslashes and newlines inside "content" so the document is valid JSON."#
}

pub fn system_prompt(framework: Framework) -> String {
    format!(
        "{role}\n\n{rules}\n\n{contract}",
        role = role(framework),
        rules = rules(framework),
        contract = output_contract()
    )
}

/// Used for the single re-prompt after a reply with no usable file list.
pub fn system_prompt_strict(framework: Framework) -> String {
    format!("{}\n\n{}", system_prompt(framework), strict_block())
}

pub fn user_prompt(plan: &TestPlan, framework: Framework, url: Option<&str>, mode: Mode) -> String {
    let cases = serde_json::to_string_pretty(plan).unwrap_or_else(|_| "[]".to_string());
    format!(
r#"Target URL: {url}
Generation Mode: {mode} ({meaning})
Framework: {framework} ({display})

Test Cases:
{cases}

Generate the full project structure."#,
        url = url.filter(|u| !u.trim().is_empty()).unwrap_or("not provided"),
        mode = mode,
        meaning = mode.meaning(),
        framework = framework,
        display = framework.display_name(),
        cases = cases
    )
}

pub fn build_instruction(req: &GenerationRequest) -> Instruction {
    Instruction {
        system: system_prompt(req.framework),
        user: user_prompt(&req.test_plan, req.framework, req.url.as_deref(), req.mode),
    }
}

pub fn build_strict_instruction(req: &GenerationRequest) -> Instruction {
    Instruction {
        system: system_prompt_strict(req.framework),
        ..build_instruction(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderKind;
    use crate::wire::TestCase;
    use serde_json::json;

    fn request(framework: Framework, url: Option<&str>, mode: Mode) -> GenerationRequest {
        GenerationRequest {
            test_plan: vec![TestCase::from_pairs([
                ("Test Case ID", json!("TC-01")),
                ("Title", json!("Login with valid credentials")),
                ("Steps", json!("1. Fill username\n2. Click Login")),
            ])],
            framework,
            url: url.map(str::to_string),
            mode,
            provider: ProviderKind::OpenAI,
            credential: None,
        }
    }

    #[test]
    fn every_framework_states_the_output_contract() {
        for fw in Framework::ALL {
            let sys = system_prompt(fw);
            assert!(sys.contains(fw.display_name()));
            assert!(sys.contains(r#"exactly one key "files""#));
            assert!(sys.contains("Interaction Mapping"));
            assert!(sys.contains("README.md"));
        }
    }

    #[test]
    fn output_contract_example_is_complete() {
        let sys = system_prompt(Framework::SeleniumPythonPytest);
        assert!(sys.contains(r##"{ "path": "README.md", "content": "# Tests\n..." },"##));
        assert!(sys.contains(r#"{ "path": "<test file path>", "content": "..." }"#));
        assert!(sys.ends_with(r#"do not use placeholders like "...rest of file"."#));
    }

    #[test]
    fn framework_rules_do_not_bleed_into_each_other() {
        let selenium = system_prompt(Framework::SeleniumPythonPytest);
        let cypress = system_prompt(Framework::CypressJavascript);
        let playwright = system_prompt(Framework::PlaywrightTypescript);
        assert!(selenium.contains("webdriver-manager") && !selenium.contains("cy.get"));
        assert!(cypress.contains("cy.get(selector).clear().type(value)") && !cypress.contains("send_keys"));
        assert!(playwright.contains("@playwright/test") && !playwright.contains("cypress.config.js"));
    }

    #[test]
    fn user_prompt_carries_url_mode_and_plan() {
        let ins = build_instruction(&request(Framework::SeleniumPythonPytest, Some("https://shop.example.com"), Mode::Full));
        assert!(ins.user.contains("Target URL: https://shop.example.com"));
        assert!(ins.user.contains("Generation Mode: full (Full implementation"));
        assert!(ins.user.contains("Framework: selenium-python-pytest (Selenium + Python + Pytest)"));
        assert!(ins.user.contains("\"Test Case ID\": \"TC-01\""));
        assert!(ins.user.contains("1. Fill username\\n2. Click Login"));
    }

    #[test]
    fn missing_url_is_explicit_and_template_is_described() {
        let ins = build_instruction(&request(Framework::CypressJavascript, None, Mode::Template));
        assert!(ins.user.contains("Target URL: not provided"));
        assert!(ins.user.contains("Generation Mode: template (Template structure with TODOs"));
    }

    #[test]
    fn strict_instruction_keeps_user_prompt() {
        let req = request(Framework::PlaywrightTypescript, None, Mode::Full);
        let normal = build_instruction(&req);
        let strict = build_strict_instruction(&req);
        assert_eq!(normal.user, strict.user);
        assert!(strict.system.starts_with(&normal.system));
        assert!(strict.system.contains("STRICT MODE"));
    }
}
