//! Text and JSON reports

use serde::Serialize;
use serde_json::json;

use latebind::{Diagnostic, InvokeError, MemberInfo, Value};

#[derive(Debug, Serialize)]
pub struct CallReport {
    pub member: String,
    pub kind: String,
    #[serde(rename = "type")]
    pub type_name: &'static str,
    pub value: serde_json::Value,
    pub display: String,
}

impl CallReport {
    pub fn new(member: &str, kind: impl ToString, value: &Value) -> Self {
        CallReport {
            member: member.to_string(),
            kind: kind.to_string(),
            type_name: value.type_name(),
            value: to_json(value),
            display: value.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DiagnosticReport {
    pub code: u32,
    pub source: Option<String>,
    pub description: Option<String>,
    pub help_file: Option<String>,
    pub help_context: u32,
}

impl From<&Diagnostic> for DiagnosticReport {
    fn from(d: &Diagnostic) -> Self {
        DiagnosticReport {
            code: d.effective_code(),
            source: d.source.clone(),
            description: d.description.clone(),
            help_file: d.help_file.clone(),
            help_context: d.help_context,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FailureReport {
    pub error: String,
    pub status: String,
    pub code: String,
    pub diagnostic: Option<DiagnosticReport>,
}

impl From<&InvokeError> for FailureReport {
    fn from(e: &InvokeError) -> Self {
        let status = e.status();
        FailureReport {
            error: e.to_string(),
            status: status.to_string(),
            code: format!("{:#010x}", status.code()),
            diagnostic: e.diagnostic().map(DiagnosticReport::from),
        }
    }
}

impl FailureReport {
    pub fn to_text(&self) -> String {
        let mut text = format!("error: {}\nstatus: {} ({})", self.error, self.status, self.code);
        if let Some(d) = &self.diagnostic {
            text.push_str(&format!(
                "\nsource: {}\ndescription: {}\ncode: {:#010x}",
                d.source.as_deref().unwrap_or("<nil>"),
                d.description.as_deref().unwrap_or("<nil>"),
                d.code
            ));
        }
        text
    }
}

#[derive(Debug, Serialize)]
pub struct MemberReport {
    pub id: i32,
    pub name: String,
    pub kinds: Vec<String>,
}

impl From<&MemberInfo> for MemberReport {
    fn from(info: &MemberInfo) -> Self {
        MemberReport {
            id: info.id.0,
            name: info.name.clone(),
            kinds: info.kinds.iter().map(ToString::to_string).collect(),
        }
    }
}

impl MemberReport {
    pub fn to_text(&self) -> String {
        format!("{:>4}  {:<12} {}", self.id, self.name, self.kinds.join(", "))
    }
}

/// Map a value onto JSON. Scalars become JSON scalars; currency and dates
/// keep their display form so no precision is lost.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Empty | Value::Null => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::I8(n) => json!(n),
        Value::I16(n) => json!(n),
        Value::I32(n) => json!(n),
        Value::I64(n) => json!(n),
        Value::U8(n) => json!(n),
        Value::U16(n) => json!(n),
        Value::U32(n) => json!(n),
        Value::U64(n) => json!(n),
        Value::F32(n) => json!(n),
        Value::F64(n) => json!(n),
        Value::Array(a) => serde_json::Value::Array(a.items.iter().map(to_json).collect()),
        other => json!(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latebind::{Currency, Status, VarKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_to_json_scalars_and_arrays() {
        assert_eq!(to_json(&Value::I32(3)), json!(3));
        assert_eq!(to_json(&Value::Null), serde_json::Value::Null);
        assert_eq!(to_json(&Value::string("hi")), json!("hi"));
        assert_eq!(to_json(&Value::Currency(Currency::new(5, 2500))), json!("5.2500"));
        assert_eq!(
            to_json(&Value::vector(VarKind::I32, vec![Value::I32(1), Value::I32(2)])),
            json!([1, 2])
        );
    }

    #[test]
    fn test_failure_report_carries_diagnostic() {
        let err = InvokeError::Callee {
            member: "Divide".to_string(),
            diagnostic: Diagnostic {
                scode: Status::Unknown.code(),
                source: Some("Demo".to_string()),
                description: Some("division by zero".to_string()),
                ..Diagnostic::default()
            },
        };
        let report = FailureReport::from(&err);
        assert_eq!(report.code, format!("{:#010x}", Status::CalleeRaisedError.code()));
        let text = report.to_text();
        assert!(text.contains("source: Demo"));
        assert!(text.contains("description: division by zero"));
    }

    #[test]
    fn test_member_report_text() {
        let report = MemberReport {
            id: 2,
            name: "Add".to_string(),
            kinds: vec!["method".to_string()],
        };
        assert_eq!(report.to_text(), "   2  Add          method");
    }
}
