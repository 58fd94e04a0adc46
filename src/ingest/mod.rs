use csv::{ReaderBuilder, Trim};
use serde_json::Value;

use crate::errors::{GenError, Result};
use crate::wire::{TestCase, TestPlan, REQUIRED_COLUMNS};

/// Parse an uploaded test plan. The header row must name every required
/// column; extra columns are carried through. Cells are trimmed and missing
/// cells read as empty strings.
pub fn parse_test_plan(bytes: &[u8]) -> Result<TestPlan> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| GenError::InvalidCsv(format!("failed to read CSV headers: {e}")))?
        .clone();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        return Err(GenError::InvalidCsv(format!("Missing columns: {}", missing.join(", "))));
    }

    let mut plan = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| GenError::InvalidCsv(format!("failed to parse CSV row {}: {e}", row + 1)))?;
        plan.push(TestCase::from_pairs(
            headers
                .iter()
                .enumerate()
                .filter(|(_, h)| !h.is_empty())
                .map(|(i, h)| (h, Value::String(record.get(i).unwrap_or_default().to_string()))),
        ));
    }
    Ok(plan)
}
