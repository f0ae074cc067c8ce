use crate::domain::analysis::AnalysisResult;
use crate::domain::contract::AnalyzeResponse;
use crate::domain::ticker::TickerSymbol;
use anyhow::Context;

/// Returns the first balanced top-level `{...}` in `text`, skipping braces inside string
/// literals. Handles fenced blocks and prose around the object.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn parse_analysis(text: &str, ticker: &TickerSymbol) -> anyhow::Result<AnalysisResult> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim());
    let parsed = serde_json::from_str::<AnalyzeResponse>(json_str)
        .with_context(|| format!("model output is not valid analysis JSON: {json_str}"))?;
    parsed.validate_and_into_analysis(ticker)
}
