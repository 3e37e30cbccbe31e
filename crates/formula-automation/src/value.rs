use core::fmt;

/// A scalar cell value as exposed by an automation host.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl CellValue {
    /// `true` for empty cells and for text that is empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) | CellValue::Bool(_) => false,
        }
    }

    /// The value as the host would display it in a cell with the General format.
    ///
    /// Integral numbers render without a fractional part so that numeric codes (`100`) read the
    /// same as their text form.
    pub fn display_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.clone(),
            CellValue::Bool(true) => "TRUE".to_string(),
            CellValue::Bool(false) => "FALSE".to_string(),
        }
    }

    pub(crate) fn from_json(value: Option<&serde_json::Value>) -> Self {
        match value {
            None | Some(serde_json::Value::Null) => CellValue::Empty,
            Some(serde_json::Value::Bool(b)) => CellValue::Bool(*b),
            Some(serde_json::Value::Number(n)) => CellValue::Number(n.as_f64().unwrap_or(0.0)),
            Some(serde_json::Value::String(s)) => CellValue::Text(s.clone()),
            Some(other) => CellValue::Text(other.to_string()),
        }
    }

    pub(crate) fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            CellValue::Empty => None,
            CellValue::Bool(b) => Some(serde_json::Value::Bool(*b)),
            CellValue::Number(n) => Some(
                serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or_else(|| serde_json::Value::String(format_number(*n))),
            ),
            CellValue::Text(s) => Some(serde_json::Value::String(s.clone())),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_text())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_detection_trims_text() {
        assert!(CellValue::Empty.is_blank());
        assert!(CellValue::from("   ").is_blank());
        assert!(!CellValue::from(" F1 ").is_blank());
        assert!(!CellValue::Number(0.0).is_blank());
    }

    #[test]
    fn display_text_matches_general_format() {
        assert_eq!(CellValue::Number(100.0).display_text(), "100");
        assert_eq!(CellValue::Number(2.5).display_text(), "2.5");
        assert_eq!(CellValue::Bool(true).display_text(), "TRUE");
        assert_eq!(CellValue::Empty.display_text(), "");
    }

    #[test]
    fn json_conversion_keeps_scalars() {
        let json = serde_json::json!("FSBC");
        assert_eq!(CellValue::from_json(Some(&json)), CellValue::from("FSBC"));
        assert_eq!(CellValue::from_json(None), CellValue::Empty);
        assert_eq!(CellValue::Number(3.0).to_json(), Some(serde_json::json!(3.0)));
        assert_eq!(CellValue::Empty.to_json(), None);
    }
}
