use serde_json::Value;
use tracing::debug;

use crate::errors::{GenError, Result};
use crate::wire::{GeneratedFile, GeneratedProject};

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Recover the `{"files": [...]}` payload from a model reply.
///
/// Candidates, in order:
/// 1. the whole reply, when it is a bare JSON object (structured-output mode)
/// 2. the first ```json fence, up to the next closing fence (or end of text)
/// 3. the greedy span from the first `{` to the last `}`
/// 4. every top-level balanced object, left to right, honouring string
///    literals and escapes
///
/// The first candidate that parses and passes the shape check wins. Nothing
/// is dropped or defaulted.
pub fn extract(raw: &str) -> Result<GeneratedProject> {
    let candidates = candidates(raw);
    if candidates.is_empty() {
        return Err(GenError::malformed("no structured payload found in response", raw));
    }

    let mut parse_err = None;
    let mut shape_err = None;
    for candidate in candidates {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => match into_project(value, raw) {
                Ok(project) => return Ok(project),
                Err(e) => {
                    debug!(error = %e, "candidate payload has the wrong shape");
                    shape_err.get_or_insert(e);
                }
            },
            Err(e) => {
                debug!(error = %e, "candidate payload did not parse");
                parse_err.get_or_insert(e);
            }
        }
    }

    if let Some(e) = shape_err {
        return Err(e);
    }
    let reason = match parse_err {
        Some(e) => format!("payload is not valid JSON: {e}"),
        None => "payload is not valid JSON".to_string(),
    };
    Err(GenError::malformed(reason, raw))
}

fn candidates(raw: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let whole = raw.trim();
    if whole.starts_with('{') {
        push_unique(&mut out, whole);
    }
    if let Some(fenced) = fenced_json(raw) {
        push_unique(&mut out, fenced);
    }
    if let Some(greedy) = greedy_object_span(raw) {
        push_unique(&mut out, greedy);
    }
    for object in balanced_objects(raw) {
        push_unique(&mut out, object);
    }
    out
}

fn push_unique<'a>(out: &mut Vec<&'a str>, candidate: &'a str) {
    let candidate = candidate.trim();
    if !candidate.is_empty() && !out.contains(&candidate) {
        out.push(candidate);
    }
}

fn fenced_json(raw: &str) -> Option<&str> {
    let start = raw.find(JSON_FENCE)? + JSON_FENCE.len();
    let rest = &raw[start..];
    let end = rest.find(FENCE).unwrap_or(rest.len());
    Some(&rest[..end])
}

fn greedy_object_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Top-level `{...}` spans whose braces balance, in order of appearance. A
/// `{` that never closes is skipped and the scan resumes at the next one.
fn balanced_objects(raw: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(offset) = raw[from..].find('{') {
        let start = from + offset;
        match balanced_end(raw, start) {
            Some(end) => {
                out.push(&raw[start..=end]);
                from = end + 1;
            }
            None => from = start + 1,
        }
    }
    out
}

/// Index of the `}` closing the `{` at `start`. Braces inside JSON strings
/// are ignored, so `"content": "fn main() {"` does not confuse the depth.
fn balanced_end(raw: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in raw.as_bytes()[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn into_project(value: Value, raw: &str) -> Result<GeneratedProject> {
    let obj = value
        .as_object()
        .ok_or_else(|| GenError::malformed("payload is not a JSON object", raw))?;
    let entries = obj
        .get("files")
        .ok_or_else(|| GenError::malformed("missing \"files\" field", raw))?
        .as_array()
        .ok_or_else(|| GenError::malformed("\"files\" is not a list", raw))?;
    if entries.is_empty() {
        return Err(GenError::malformed("\"files\" is empty", raw));
    }

    let mut files = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let entry = entry
            .as_object()
            .ok_or_else(|| GenError::malformed(format!("files[{i}] is not an object"), raw))?;

        let path = match entry.get("path") {
            Some(Value::String(p)) if !p.trim().is_empty() => p.clone(),
            Some(Value::String(_)) => return Err(GenError::malformed(format!("files[{i}].path is empty"), raw)),
            Some(_) => return Err(GenError::malformed(format!("files[{i}].path is not a string"), raw)),
            None => return Err(GenError::malformed(format!("files[{i}] has no path"), raw)),
        };
        let content = match entry.get("content") {
            Some(Value::String(c)) => c.clone(),
            Some(_) => return Err(GenError::malformed(format!("files[{i}].content is not a string"), raw)),
            None => return Err(GenError::malformed(format!("files[{i}] ({path}) has no content"), raw)),
        };
        files.push(GeneratedFile { path, content });
    }

    Ok(GeneratedProject::new(files))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(err: GenError) -> String {
        match err {
            GenError::MalformedResponse { reason, .. } => reason,
            other => panic!("expected malformed response, got {other:?}"),
        }
    }

    #[test]
    fn fenced_block_between_prose() {
        let raw = "Here is your code:\n```json\n{\"files\":[{\"path\":\"a.py\",\"content\":\"x\"}]}\n```\nEnjoy!";
        let project = extract(raw).unwrap();
        assert_eq!(project.files, vec![GeneratedFile::new("a.py", "x")]);
    }

    #[test]
    fn refusal_is_malformed_and_keeps_raw() {
        let raw = "Sorry, I cannot comply.";
        match extract(raw).unwrap_err() {
            GenError::MalformedResponse { raw: kept, .. } => assert_eq!(kept, raw),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bare_object_wrapped_in_prose() {
        let raw = "Sure! {\"files\": [{\"path\": \"tests/t.py\", \"content\": \"def f(): {}\"}]} Let me know.";
        let project = extract(raw).unwrap();
        assert_eq!(project.files[0].content, "def f(): {}");
    }

    #[test]
    fn trailing_braces_in_prose_fall_back_to_balanced_scan() {
        let raw = "{\"files\": [{\"path\": \"a.js\", \"content\": \"}\"}]}\nUse it like {this}.";
        let project = extract(raw).unwrap();
        assert_eq!(project.files[0].path, "a.js");
        assert_eq!(project.files[0].content, "}");
    }

    #[test]
    fn balanced_scan_ignores_braces_in_strings() {
        let raw = "{\"a\": \"{{\\\"}\"} tail }";
        assert_eq!(balanced_objects(raw), vec!["{\"a\": \"{{\\\"}\"}"]);
    }

    #[test]
    fn balanced_scan_skips_unclosed_and_keeps_going() {
        let raw = "see { here, then {\"x\": 1} and {y}";
        assert_eq!(balanced_objects(raw), vec!["{\"x\": 1}", "{y}"]);
    }

    #[test]
    fn placeholder_braces_in_prose_before_the_payload() {
        let raw = "I used `{name}` placeholders:\n{\"files\":[{\"path\":\"a.py\",\"content\":\"x\"}]}\nDone.";
        assert_eq!(extract(raw).unwrap().files, vec![GeneratedFile::new("a.py", "x")]);
    }

    #[test]
    fn prose_object_without_files_is_skipped() {
        let raw = "Options were {} and {\"retries\": 2}. {\"files\":[{\"path\":\"b.js\",\"content\":\"\"}]}";
        assert_eq!(extract(raw).unwrap().files[0].path, "b.js");
    }

    #[test]
    fn unclosed_fence_runs_to_end_of_text() {
        let raw = "```json\n{\"files\":[{\"path\":\"README.md\",\"content\":\"\"}]}";
        let project = extract(raw).unwrap();
        assert_eq!(project.files[0].content, "");
    }

    #[test]
    fn broken_fence_falls_back_to_balanced_scan() {
        let raw = "```json\n{\"files\": [\n```\n{\"files\":[{\"path\":\"a\",\"content\":\"b\"}]}";
        assert_eq!(extract(raw).unwrap().files, vec![GeneratedFile::new("a", "b")]);
    }

    #[test]
    fn bare_json_reply_with_fence_inside_content() {
        let raw = serde_json::json!({ "files": [
            { "path": "README.md", "content": "Config example:\n```json\n{\"baseUrl\": \"http://x\"}\n```\n" },
            { "path": "tests/test_a.py", "content": "def test_a():\n    pass\n" }
        ]})
        .to_string();
        let project = extract(&raw).unwrap();
        assert_eq!(project.paths(), vec!["README.md", "tests/test_a.py"]);
        assert!(project.files[0].content.contains("```json\n{\"baseUrl\""));
    }

    #[test]
    fn fenced_reply_with_inner_bash_fence() {
        let payload = serde_json::json!({ "files": [
            { "path": "README.md", "content": "Run:\n```bash\npytest -q\n```\n" }
        ]});
        let raw = format!("Here you go:\n```json\n{payload}\n```\nGood luck!");
        let project = extract(&raw).unwrap();
        assert_eq!(project.files[0].content, "Run:\n```bash\npytest -q\n```\n");
    }

    #[test]
    fn unparseable_everywhere_reports_json_error() {
        let raw = "```json\n{\"files\": [\n```\nno object here";
        assert!(reason(extract(raw).unwrap_err()).contains("not valid JSON"));
    }

    #[test]
    fn shape_errors_are_reported_precisely() {
        let cases = [
            ("[1,2]", "no structured payload"),
            ("{\"data\": []}", "missing \"files\""),
            ("{\"files\": {}}", "not a list"),
            ("{\"files\": []}", "is empty"),
            ("{\"files\": [3]}", "files[0] is not an object"),
            ("{\"files\": [{\"content\": \"x\"}]}", "files[0] has no path"),
            ("{\"files\": [{\"path\": \" \", \"content\": \"x\"}]}", "files[0].path is empty"),
            ("{\"files\": [{\"path\": \"a\", \"content\": \"x\"}, {\"path\": \"b\"}]}", "files[1] (b) has no content"),
            ("{\"files\": [{\"path\": \"a\", \"content\": null}]}", "content is not a string"),
        ];
        for (raw, expected) in cases {
            let got = reason(extract(raw).unwrap_err());
            assert!(got.contains(expected), "{raw}: {got}");
        }
    }
}
