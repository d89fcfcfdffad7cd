//! Single and batch update parameters of one collection

use crate::api::types::{
    CollectionUpdateConfig, ParamKind, RefreshRequest, UpdateConfig, UpdateMode, UpdateType,
};
use crate::error::{AppError, Result};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default)]
pub struct UpdateForm {
    config: Option<CollectionUpdateConfig>,
    pub single_params: Map<String, Value>,
    pub batch_params: Map<String, Value>,
    pub update_mode: UpdateMode,
}

impl UpdateForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<&CollectionUpdateConfig> {
        self.config.as_ref()
    }

    /// Forget the loaded configuration and every entered value
    pub fn reset(&mut self) {
        self.config = None;
        self.single_params.clear();
        self.batch_params.clear();
    }

    /// Install a freshly loaded configuration, seeding declared defaults
    pub fn apply_config(&mut self, config: CollectionUpdateConfig) {
        self.reset();
        seed_defaults(&config.single_update, &mut self.single_params);
        seed_defaults(&config.batch_update, &mut self.batch_params);
        self.config = Some(config);
    }

    pub fn set_single(&mut self, name: impl Into<String>, value: Value) {
        self.single_params.insert(name.into(), value);
    }

    pub fn set_batch(&mut self, name: impl Into<String>, value: Value) {
        self.batch_params.insert(name.into(), value);
    }

    /// Set a single update parameter from text, typed by its declared kind
    pub fn set_single_text(&mut self, name: &str, text: &str) -> Result<()> {
        let value = typed_value(self.config.as_ref().map(|c| &c.single_update), name, text)?;
        self.set_single(name, value);
        Ok(())
    }

    /// Set a batch update parameter from text, typed by its declared kind
    pub fn set_batch_text(&mut self, name: &str, text: &str) -> Result<()> {
        let value = typed_value(self.config.as_ref().map(|c| &c.batch_update), name, text)?;
        self.set_batch(name, value);
        Ok(())
    }

    pub fn can_single_update(&self) -> bool {
        self.config
            .as_ref()
            .map_or(false, |c| ready(&c.single_update, &self.single_params))
    }

    pub fn can_batch_update(&self) -> bool {
        self.config
            .as_ref()
            .map_or(false, |c| ready(&c.batch_update, &self.batch_params))
    }

    /// Single update body. Null and empty values are dropped; with
    /// `coerce_year` a numeric string `year` is sent as an integer.
    pub fn single_request(&self, coerce_year: bool) -> RefreshRequest {
        let mut params = Map::new();
        for (key, value) in &self.single_params {
            if value.is_null() || value.as_str() == Some("") {
                continue;
            }
            let value = match (coerce_year && key == "year", value.as_str()) {
                (true, Some(text)) => text
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| value.clone()),
                _ => value.clone(),
            };
            params.insert(key.clone(), value);
        }

        RefreshRequest {
            update_type: UpdateType::Single,
            update_mode: None,
            params,
        }
    }

    pub fn batch_request(&self) -> RefreshRequest {
        RefreshRequest {
            update_type: UpdateType::Batch,
            update_mode: Some(self.update_mode),
            params: self.batch_params.clone(),
        }
    }
}

fn seed_defaults(config: &UpdateConfig, params: &mut Map<String, Value>) {
    for param in &config.params {
        if let Some(default) = &param.default {
            params.insert(param.name.clone(), default.clone());
        }
    }
}

fn ready(config: &UpdateConfig, params: &Map<String, Value>) -> bool {
    config.enabled
        && config
            .params
            .iter()
            .filter(|p| p.required)
            .all(|p| params.get(&p.name).map_or(false, is_truthy))
}

/// Whether a parameter value counts as filled in
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Split a `name=value` assignment. The value stays text until it is
/// typed against the loaded parameter list.
pub fn parse_assignment(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| AppError::Validation(format!("Expected name=value, got '{}'", raw)))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(format!("Missing parameter name in '{}'", raw)));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Type `text` by the kind of parameter `name`. Undeclared parameters and
/// text, date and unknown kinds stay strings.
fn typed_value(config: Option<&UpdateConfig>, name: &str, text: &str) -> Result<Value> {
    let Some(param) = config.and_then(|c| c.params.iter().find(|p| p.name == name)) else {
        return Ok(Value::String(text.to_string()));
    };
    let trimmed = text.trim();
    match param.kind {
        ParamKind::Text | ParamKind::Date | ParamKind::Other => Ok(Value::String(text.to_string())),
        ParamKind::Number => {
            let number = trimmed
                .parse::<i64>()
                .map(Value::from)
                .ok()
                .or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                });
            number.ok_or_else(|| {
                AppError::Validation(format!("Parameter {} expects a number, got '{}'", name, text))
            })
        }
        ParamKind::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
            _ => Err(AppError::Validation(format!(
                "Parameter {} expects true or false, got '{}'",
                name, text
            ))),
        },
        // Options may carry numeric values; match on their text form
        ParamKind::Select => Ok(param
            .options
            .iter()
            .map(|o| &o.value)
            .find(|v| match v {
                Value::String(s) => s == text,
                other => other.to_string() == trimmed,
            })
            .cloned()
            .unwrap_or_else(|| Value::String(text.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{ParamOption, UpdateParam};
    use serde_json::json;

    fn param(name: &str, required: bool, default: Option<Value>) -> UpdateParam {
        UpdateParam {
            name: name.to_string(),
            label: name.to_string(),
            kind: ParamKind::Text,
            placeholder: None,
            required,
            default,
            options: Vec::new(),
            min: None,
            max: None,
            step: None,
        }
    }

    fn config() -> CollectionUpdateConfig {
        CollectionUpdateConfig {
            collection_name: "fund_hk_hist_em".into(),
            display_name: "HK fund history".into(),
            update_description: None,
            single_update: UpdateConfig {
                enabled: true,
                description: None,
                params: vec![param("code", true, None), param("year", false, Some(json!("2024")))],
            },
            batch_update: UpdateConfig {
                enabled: true,
                description: None,
                params: vec![param("concurrency", true, Some(json!(3)))],
            },
        }
    }

    #[test]
    fn test_defaults_are_seeded() {
        let mut form = UpdateForm::new();
        form.set_single("stale", json!("x"));
        form.apply_config(config());

        assert!(form.single_params.get("stale").is_none());
        assert_eq!(form.single_params.get("year"), Some(&json!("2024")));
        assert_eq!(form.batch_params.get("concurrency"), Some(&json!(3)));
    }

    #[test]
    fn test_required_params_gate_updates() {
        let mut form = UpdateForm::new();
        assert!(!form.can_single_update());

        form.apply_config(config());
        assert!(!form.can_single_update());
        assert!(form.can_batch_update());

        form.set_single("code", json!(""));
        assert!(!form.can_single_update());
        form.set_single("code", json!("968001"));
        assert!(form.can_single_update());

        form.set_batch("concurrency", json!(0));
        assert!(!form.can_batch_update());
    }

    #[test]
    fn test_disabled_mode_cannot_update() {
        let mut config = config();
        config.batch_update.enabled = false;
        let mut form = UpdateForm::new();
        form.apply_config(config);
        assert!(!form.can_batch_update());
    }

    #[test]
    fn test_single_request_drops_empty_and_coerces_year() {
        let mut form = UpdateForm::new();
        form.apply_config(config());
        form.set_single("code", json!("968001"));
        form.set_single("note", json!(""));
        form.set_single("extra", Value::Null);

        let request = form.single_request(true);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"update_type": "single", "code": "968001", "year": 2024})
        );

        let request = form.single_request(false);
        assert_eq!(request.params.get("year"), Some(&json!("2024")));

        form.set_single("year", json!("last"));
        assert_eq!(form.single_request(true).params.get("year"), Some(&json!("last")));
    }

    #[test]
    fn test_batch_request_carries_mode() {
        let mut form = UpdateForm::new();
        form.apply_config(config());
        form.update_mode = UpdateMode::Full;

        assert_eq!(
            serde_json::to_value(form.batch_request()).unwrap(),
            json!({"update_type": "batch", "update_mode": "full", "concurrency": 3})
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("0")));
        assert!(is_truthy(&json!(1.5)));
        assert!(is_truthy(&json!([])));
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment("year=2024").unwrap(), ("year".into(), "2024".into()));
        assert_eq!(parse_assignment("q=a=b").unwrap(), ("q".into(), "a=b".into()));
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=x").is_err());
    }

    fn typed(name: &str, kind: ParamKind) -> UpdateParam {
        UpdateParam {
            kind,
            ..param(name, false, None)
        }
    }

    #[test]
    fn test_text_values_follow_declared_kind() {
        let mut config = config();
        config.single_update.params = vec![
            typed("symbol", ParamKind::Text),
            typed("start_date", ParamKind::Date),
            typed("limit", ParamKind::Number),
            typed("adjusted", ParamKind::Boolean),
            UpdateParam {
                options: vec![
                    ParamOption {
                        label: "Daily".into(),
                        value: json!("daily"),
                    },
                    ParamOption {
                        label: "Top 10".into(),
                        value: json!(10),
                    },
                ],
                ..typed("period", ParamKind::Select)
            },
        ];
        let mut form = UpdateForm::new();
        form.apply_config(config);

        form.set_single_text("symbol", "600519").unwrap();
        form.set_single_text("start_date", "20240101").unwrap();
        form.set_single_text("limit", "250").unwrap();
        form.set_single_text("adjusted", "false").unwrap();
        form.set_single_text("period", "10").unwrap();
        form.set_single_text("undeclared", "42").unwrap();

        assert_eq!(form.single_params.get("symbol"), Some(&json!("600519")));
        assert_eq!(form.single_params.get("start_date"), Some(&json!("20240101")));
        assert_eq!(form.single_params.get("limit"), Some(&json!(250)));
        assert_eq!(form.single_params.get("adjusted"), Some(&json!(false)));
        assert_eq!(form.single_params.get("period"), Some(&json!(10)));
        assert_eq!(form.single_params.get("undeclared"), Some(&json!("42")));

        form.set_single_text("symbol", "000001").unwrap();
        assert_eq!(form.single_params.get("symbol"), Some(&json!("000001")));

        assert!(form.set_single_text("limit", "many").is_err());
        assert!(form.set_single_text("adjusted", "maybe").is_err());
    }

    #[test]
    fn test_batch_text_uses_batch_params() {
        let mut config = config();
        config.batch_update.params = vec![typed("concurrency", ParamKind::Number)];
        let mut form = UpdateForm::new();
        form.apply_config(config);

        form.set_batch_text("concurrency", "2.5").unwrap();
        assert_eq!(form.batch_params.get("concurrency"), Some(&json!(2.5)));
    }
}
