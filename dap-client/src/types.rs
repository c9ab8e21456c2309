// DAP type definitions
//
// Entity shapes shared by requests, responses and events

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

// Identified inside a session by (absolute source path, line); the id is
// assigned by the debugger and may be absent while the breakpoint is pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    #[serde(default)]
    pub id: Option<i64>,
    pub verified: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default)]
    pub line: Option<i64>,
    #[serde(default)]
    pub column: Option<i64>,
}

/// One requested breakpoint inside a `setBreakpoints` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    pub line: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

// Frame ids are opaque and only valid while the thread stays stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub source: Option<Source>,
    pub line: i64,
    pub column: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub name: String,
    pub variables_reference: i64,
    #[serde(default)]
    pub expensive: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: String,
    #[serde(default, rename = "type")]
    pub ty: Option<String>,
    /// 0 means leaf; anything else is a container handle.
    #[serde(default)]
    pub variables_reference: i64,
}

impl Variable {
    /// Format a variable for display
    pub fn format(&self) -> String {
        match &self.ty {
            Some(ty) => format!("{} = {} ({})", self.name, self.value, ty),
            None => format!("{} = {}", self.name, self.value),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: i64,
    pub name: String,
}

/// Feature flags reported by the debugger at initialize time.
///
/// Only the flags this client consults are typed; everything else stays in
/// the flattened map so unknown capabilities survive a round trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Capabilities {
    pub supports_configuration_done_request: Option<bool>,
    pub supports_conditional_breakpoints: Option<bool>,
    pub supports_terminate_request: Option<bool>,
    pub supports_evaluate_for_hovers: Option<bool>,
    pub supports_set_variable: Option<bool>,
    #[serde(flatten)]
    pub other: HashMap<String, Value>,
}

// --- Response bodies, one per command pair ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsResponseBody {
    pub breakpoints: Vec<Breakpoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadsResponseBody {
    pub threads: Vec<Thread>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponseBody {
    pub stack_frames: Vec<StackFrame>,
    #[serde(default)]
    pub total_frames: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesResponseBody {
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesResponseBody {
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponseBody {
    pub result: String,
    #[serde(default, rename = "type")]
    pub ty: Option<String>,
    #[serde(default)]
    pub variables_reference: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueResponseBody {
    #[serde(default)]
    pub all_threads_continued: Option<bool>,
}

// --- Event bodies ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    pub reason: String,
    #[serde(default)]
    pub thread_id: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub all_threads_stopped: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEventBody {
    #[serde(default)]
    pub category: Option<String>,
    pub output: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitedEventBody {
    #[serde(default)]
    pub exit_code: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_with_type() {
        let v = Variable {
            name: "count".to_string(),
            value: "42".to_string(),
            ty: Some("int".to_string()),
            variables_reference: 0,
        };
        assert_eq!(v.format(), "count = 42 (int)");
    }

    #[test]
    fn format_without_type() {
        let v = Variable {
            name: "user".to_string(),
            value: "{App.User}".to_string(),
            ty: None,
            variables_reference: 12,
        };
        assert_eq!(v.format(), "user = {App.User}");
    }

    #[test]
    fn breakpoint_without_id_is_pending() {
        let json = r#"{"verified":false,"message":"No executable code at line"}"#;
        let bp: Breakpoint = serde_json::from_str(json).unwrap();
        assert!(bp.id.is_none());
        assert!(!bp.verified);
        assert_eq!(bp.message.as_deref(), Some("No executable code at line"));
    }

    #[test]
    fn breakpoint_with_source() {
        let json = r#"{"id":3,"verified":true,"source":{"name":"Main.cs","path":"/src/Main.cs"},"line":10,"column":9}"#;
        let bp: Breakpoint = serde_json::from_str(json).unwrap();
        assert_eq!(bp.id, Some(3));
        assert_eq!(bp.source.unwrap().path.as_deref(), Some("/src/Main.cs"));
        assert_eq!(bp.line, Some(10));
    }

    #[test]
    fn source_breakpoint_omits_absent_condition() {
        let sb = SourceBreakpoint {
            line: 17,
            condition: None,
        };
        let json = serde_json::to_string(&sb).unwrap();
        assert_eq!(json, r#"{"line":17}"#);
    }

    #[test]
    fn source_breakpoint_serializes_condition() {
        let sb = SourceBreakpoint {
            line: 17,
            condition: Some("x > 5".to_string()),
        };
        let json = serde_json::to_string(&sb).unwrap();
        assert!(json.contains(r#""condition":"x > 5""#));
    }

    #[test]
    fn capabilities_keep_unknown_flags() {
        let json = r#"{"supportsTerminateRequest":true,"supportsExceptionOptions":false}"#;
        let caps: Capabilities = serde_json::from_str(json).unwrap();
        assert_eq!(caps.supports_terminate_request, Some(true));
        assert!(caps.other.contains_key("supportsExceptionOptions"));
    }

    #[test]
    fn stopped_event_body_parses() {
        let json = r#"{"reason":"breakpoint","threadId":1,"allThreadsStopped":true}"#;
        let body: StoppedEventBody = serde_json::from_str(json).unwrap();
        assert_eq!(body.reason, "breakpoint");
        assert_eq!(body.thread_id, Some(1));
    }

    #[test]
    fn variable_reference_defaults_to_leaf() {
        let json = r#"{"name":"x","value":"1"}"#;
        let v: Variable = serde_json::from_str(json).unwrap();
        assert_eq!(v.variables_reference, 0);
    }
}
