//! Sensitive-content scan applied before a pattern becomes shareable.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

// (rule name, pattern)
static RULES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("email", Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").unwrap()),
        (
            "phone_number",
            Regex::new(r"(?:\+\d{1,3}[\s.-]?)?\(?\b\d{3}\)?[\s.-]\d{3}[\s.-]\d{4}\b").unwrap(),
        ),
        ("national_id", Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap()),
        ("payment_card", Regex::new(r"\b(?:\d{4}[\s-]?){3}\d{4}\b").unwrap()),
        ("iban", Regex::new(r"\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b").unwrap()),
        (
            "credential",
            Regex::new(r"(?i)\b(password|passwd|api[_\s-]?key|secret|access[_\s-]?token|private[_\s-]?key)\b\s*[:=]").unwrap(),
        ),
        ("ip_address", Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap()),
        (
            "health_record",
            Regex::new(r"(?i)\b(diagnos(is|ed)|prescription|medical record|hiv|psychiatric)\b").unwrap(),
        ),
    ]
});

/// Names of every rule matching any string in `payload` (keys included).
pub fn scan(payload: &Value) -> Vec<String> {
    let mut texts = Vec::new();
    collect_strings(payload, &mut texts);

    RULES
        .iter()
        .filter(|(_, re)| texts.iter().any(|t| re.is_match(t)))
        .map(|(name, _)| name.to_string())
        .collect()
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => {
            for (k, v) in map {
                out.push(k);
                collect_strings(v, out);
            }
        }
        _ => {}
    }
}
