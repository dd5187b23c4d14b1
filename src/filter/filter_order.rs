use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        match order {
            Value::String(s) => Self::parse_order_string(s),
            Value::Array(arr) => {
                // Array of strings like ["created_at desc", "name asc"]
                let mut out = Vec::new();
                for v in arr {
                    if let Value::String(s) = v {
                        out.extend(Self::parse_order_string(s)?);
                    }
                }
                Ok(out)
            }
            Value::Object(obj) => {
                // { "created_at": "desc", "name": "asc" }
                let mut out = Vec::new();
                for (k, v) in obj {
                    Self::validate_column(k)?;
                    let sort = match v.as_str().unwrap_or("asc").to_ascii_lowercase().as_str() {
                        "desc" => SortDirection::Desc,
                        _ => SortDirection::Asc,
                    };
                    out.push(FilterOrderInfo { column: k.clone(), sort });
                }
                Ok(out)
            }
            _ => Ok(vec![]),
        }
    }

    fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        // split on commas, then each token into column and direction
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut it = trimmed.split_whitespace();
            if let Some(col) = it.next() {
                Self::validate_column(col)?;
                let dir = it.next().unwrap_or("asc");
                let sort = if dir.eq_ignore_ascii_case("desc") {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                };
                out.push(FilterOrderInfo { column: col.to_string(), sort });
            }
        }
        Ok(out)
    }

    fn validate_column(name: &str) -> Result<(), FilterError> {
        let valid = name
            .chars()
            .next()
            .map(|first| first.is_alphabetic() || first == '_')
            .unwrap_or(false)
            && name.chars().all(|c| c.is_alphanumeric() || c == '_');
        if valid {
            Ok(())
        } else {
            Err(FilterError::InvalidColumn(format!("Invalid order column: {}", name)))
        }
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> Result<String, FilterError> {
        if infos.is_empty() {
            return Ok(String::new());
        }
        let parts: Vec<String> =
            infos.iter().map(|i| format!("\"{}\" {}", i.column, i.sort.to_sql())).collect();
        Ok(format!("ORDER BY {}", parts.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_form() {
        let infos = FilterOrder::validate_and_parse(&json!("created_at desc, name")).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].column, "created_at");
        assert_eq!(infos[0].sort, SortDirection::Desc);
        assert_eq!(infos[1].sort, SortDirection::Asc);
    }

    #[test]
    fn parses_object_form() {
        let infos = FilterOrder::validate_and_parse(&json!({"name": "desc"})).unwrap();
        assert_eq!(FilterOrder::generate(&infos).unwrap(), "ORDER BY \"name\" DESC");
    }

    #[test]
    fn rejects_injection_in_column() {
        assert!(FilterOrder::validate_and_parse(&json!("name; DROP TABLE users")).is_err());
    }

    #[test]
    fn empty_order_generates_nothing() {
        assert_eq!(FilterOrder::generate(&[]).unwrap(), "");
    }
}
