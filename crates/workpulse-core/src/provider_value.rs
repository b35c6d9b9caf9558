// Tagged view over dynamic provider field values.
//
// Jira custom fields arrive as arbitrary JSON: users, options, arrays of
// either, ADF documents, or plain scalars. Everything the transformers need
// from them goes through the explicit extractors here instead of ad-hoc
// Value poking at call sites.

use serde_json::Value;

/// Tagged provider field value
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderValue<'a> {
    Null,
    Bool(bool),
    Number(f64),
    Text(&'a str),
    Object(&'a serde_json::Map<String, Value>),
    Array(&'a Vec<Value>),
}

impl<'a> ProviderValue<'a> {
    pub fn from_json(value: &'a Value) -> Self {
        match value {
            Value::Null => ProviderValue::Null,
            Value::Bool(b) => ProviderValue::Bool(*b),
            Value::Number(n) => ProviderValue::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => ProviderValue::Text(s),
            Value::Object(map) => ProviderValue::Object(map),
            Value::Array(items) => ProviderValue::Array(items),
        }
    }

    /// Flatten to a display string: user -> displayName, option -> name/value,
    /// array -> comma-joined element displays, scalar -> string form.
    pub fn display_text(&self) -> Option<String> {
        match self {
            ProviderValue::Null => None,
            ProviderValue::Bool(b) => Some(b.to_string()),
            ProviderValue::Number(n) => Some(format_number(*n)),
            ProviderValue::Text(s) => Some((*s).to_string()),
            ProviderValue::Object(map) => object_display(map),
            ProviderValue::Array(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .filter_map(|item| ProviderValue::from_json(item).display_text())
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(", "))
                }
            }
        }
    }

    /// Team field projection: dict -> name/value, string kept as-is
    pub fn team_name(&self) -> Option<String> {
        match self {
            ProviderValue::Null => None,
            ProviderValue::Text(s) => Some((*s).to_string()),
            ProviderValue::Object(map) => map
                .get("name")
                .or_else(|| map.get("value"))
                .and_then(Value::as_str)
                .map(str::to_string),
            other => other.display_text(),
        }
    }

    /// Story-points coercion: numbers pass through, numeric strings parse,
    /// everything else is None.
    pub fn as_story_points(&self) -> Option<f64> {
        match self {
            ProviderValue::Number(n) => Some(*n),
            ProviderValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Development-activity truthiness: true iff the raw value is non-empty.
    ///
    /// Empty means null, "", "{}", "[]", an empty array or an empty object.
    /// Any non-null scalar counts as activity.
    pub fn indicates_activity(&self) -> bool {
        match self {
            ProviderValue::Null => false,
            ProviderValue::Text(s) => !matches!(s.trim(), "" | "{}" | "[]"),
            ProviderValue::Object(map) => !map.is_empty(),
            ProviderValue::Array(items) => !items.is_empty(),
            ProviderValue::Bool(_) | ProviderValue::Number(_) => true,
        }
    }

    /// Collapse an ADF-style rich-text document to plain text by walking its
    /// content tree and collecting `text` leaves.
    pub fn document_text(&self) -> Option<String> {
        match self {
            ProviderValue::Text(s) => Some((*s).to_string()),
            ProviderValue::Object(map) => {
                let mut out = String::new();
                collect_doc_text(map, &mut out);
                let trimmed = out.trim().to_string();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed)
                }
            }
            _ => None,
        }
    }
}

fn object_display(map: &serde_json::Map<String, Value>) -> Option<String> {
    map.get("displayName")
        .or_else(|| map.get("name"))
        .or_else(|| map.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn collect_doc_text(map: &serde_json::Map<String, Value>, out: &mut String) {
    if let Some(text) = map.get("text").and_then(Value::as_str) {
        if !out.is_empty() && !out.ends_with(' ') {
            out.push(' ');
        }
        out.push_str(text);
    }
    if let Some(content) = map.get("content").and_then(Value::as_array) {
        for child in content {
            if let Some(child_map) = child.as_object() {
                collect_doc_text(child_map, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pv(value: &Value) -> ProviderValue<'_> {
        ProviderValue::from_json(value)
    }

    #[test]
    fn test_display_text_user_and_option() {
        let user = json!({"displayName": "Ada Lovelace", "accountId": "x"});
        assert_eq!(pv(&user).display_text(), Some("Ada Lovelace".to_string()));

        let option = json!({"value": "High", "id": "1"});
        assert_eq!(pv(&option).display_text(), Some("High".to_string()));

        let named = json!({"name": "Platform"});
        assert_eq!(pv(&named).display_text(), Some("Platform".to_string()));
    }

    #[test]
    fn test_display_text_arrays() {
        let options = json!([{"value": "a"}, {"value": "b"}]);
        assert_eq!(pv(&options).display_text(), Some("a, b".to_string()));

        let scalars = json!(["x", 2, true]);
        assert_eq!(pv(&scalars).display_text(), Some("x, 2, true".to_string()));

        let empty = json!([]);
        assert_eq!(pv(&empty).display_text(), None);
    }

    #[test]
    fn test_story_points_coercion() {
        assert_eq!(pv(&json!("5.5")).as_story_points(), Some(5.5));
        assert_eq!(pv(&json!(3)).as_story_points(), Some(3.0));
        assert_eq!(pv(&json!("abc")).as_story_points(), None);
        assert_eq!(pv(&json!(null)).as_story_points(), None);
        assert_eq!(pv(&json!({"value": 5})).as_story_points(), None);
    }

    #[test]
    fn test_development_truthiness() {
        for falsy in [json!(null), json!(""), json!("{}"), json!("[]"), json!([]), json!({})] {
            assert!(!pv(&falsy).indicates_activity(), "expected falsy: {falsy}");
        }
        for truthy in [
            json!("{some:x}"),
            json!(true),
            json!(["x"]),
            json!({"pullrequest": {}}),
            json!(1),
        ] {
            assert!(pv(&truthy).indicates_activity(), "expected truthy: {truthy}");
        }
    }

    #[test]
    fn test_team_name() {
        assert_eq!(pv(&json!({"name": "Core"})).team_name(), Some("Core".to_string()));
        assert_eq!(pv(&json!({"value": "Infra"})).team_name(), Some("Infra".to_string()));
        assert_eq!(pv(&json!("Payments")).team_name(), Some("Payments".to_string()));
        assert_eq!(pv(&json!(null)).team_name(), None);
    }

    #[test]
    fn test_document_text_walks_adf() {
        let doc = json!({
            "type": "doc",
            "content": [
                {"type": "paragraph", "content": [
                    {"type": "text", "text": "Fix the"},
                    {"type": "text", "text": "pipeline"}
                ]},
                {"type": "paragraph", "content": [
                    {"type": "text", "text": "soon"}
                ]}
            ]
        });
        assert_eq!(pv(&doc).document_text(), Some("Fix the pipeline soon".to_string()));
        assert_eq!(pv(&json!("plain")).document_text(), Some("plain".to_string()));
        assert_eq!(pv(&json!({"type": "doc", "content": []})).document_text(), None);
    }
}
