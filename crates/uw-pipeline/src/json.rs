//! Reading JSON out of model replies.

use serde_json::{Map, Value};

/// The first JSON object in `text`.
///
/// Models wrap JSON in code fences or add a sentence before it; everything
/// outside the outermost braces is ignored.
pub fn parse_json_object(text: &str) -> Result<Map<String, Value>, String> {
    let start = text.find('{').ok_or_else(|| "no JSON object in reply".to_string())?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| "unterminated JSON object in reply".to_string())?;
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("reply is not a JSON object".into()),
        Err(e) => Err(format!("invalid JSON in reply: {e}")),
    }
}
