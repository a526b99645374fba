use std::collections::HashMap;

use crate::error::{AppError, AppResult};

/// Name/id constraints accepted by listing endpoints, combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameFilter {
    pub name_eq: Option<String>,
    pub name_contains: Option<String>,
    pub name_startswith: Option<String>,
    pub name_endswith: Option<String>,
    pub id: Option<i64>,
}

impl NameFilter {
    /// Reads `name`, `name__eq`, `name__contains`, `name__startswith`,
    /// `name__endswith`, `id` and `id__eq`. Other keys are ignored.
    pub fn from_params(params: &HashMap<String, String>) -> AppResult<Self> {
        let mut filter = Self::default();
        for (key, value) in params {
            match key.as_str() {
                "name" | "name__eq" => filter.name_eq = Some(value.clone()),
                "name__contains" => filter.name_contains = Some(value.clone()),
                "name__startswith" => filter.name_startswith = Some(value.clone()),
                "name__endswith" => filter.name_endswith = Some(value.clone()),
                "id" | "id__eq" => {
                    let id = value
                        .parse()
                        .map_err(|_| AppError::BadRequest(format!("invalid id {value:?}")))?;
                    filter.id = Some(id);
                }
                _ => {}
            }
        }
        Ok(filter)
    }

    pub fn by_name(name: &str) -> Self {
        Self {
            name_eq: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, id: i64, name: &str) -> bool {
        self.id.map_or(true, |want| want == id)
            && self.name_eq.as_deref().map_or(true, |v| name == v)
            && self.name_contains.as_deref().map_or(true, |v| name.contains(v))
            && self.name_startswith.as_deref().map_or(true, |v| name.starts_with(v))
            && self.name_endswith.as_deref().map_or(true, |v| name.ends_with(v))
    }
}

/// Escapes `%`, `_` and `\` so user input matches literally inside LIKE.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
