// Debug tools schema definitions
//
// MCP tools for driving .NET debug sessions over DAP

use crate::protocol::Tool;
use serde_json::json;

pub fn get_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "launch".to_string(),
            description: "Launch a .NET program under the debugger".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "program": {
                        "type": "string",
                        "description": "Path to the compiled DLL (e.g., '/proj/Api/bin/Debug/net8.0/Api.dll')"
                    },
                    "args": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Arguments passed to the debuggee"
                    },
                    "cwd": {
                        "type": "string",
                        "description": "Working directory for the debuggee"
                    },
                    "stopAtEntry": {
                        "type": "boolean",
                        "description": "Break at the program entry point",
                        "default": false
                    },
                    "env": {
                        "type": "object",
                        "additionalProperties": { "type": "string" },
                        "description": "Environment overrides; win over launch-profile values"
                    },
                    "launchProfile": {
                        "type": "string",
                        "description": "Profile name from Properties/launchSettings.json"
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional, a new one is derived from the program name)"
                    }
                },
                "required": ["program"]
            }),
        },
        Tool {
            name: "attach".to_string(),
            description: "Attach the debugger to a running process".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "processId": {
                        "type": "integer",
                        "description": "PID of the process to attach to"
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                },
                "required": ["processId"]
            }),
        },
        Tool {
            name: "launch_watch".to_string(),
            description: "Start 'dotnet watch run' for a project and keep the debugger attached across hot-reload restarts".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "projectPath": {
                        "type": "string",
                        "description": "Path to the project directory"
                    },
                    "launchProfile": {
                        "type": "string",
                        "description": "Profile name from Properties/launchSettings.json"
                    },
                    "args": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Arguments passed through to the application after '--'"
                    },
                    "noHotReload": {
                        "type": "boolean",
                        "description": "Force full restarts instead of hot reload",
                        "default": false
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional, derived from the project name)"
                    }
                },
                "required": ["projectPath"]
            }),
        },
        Tool {
            name: "stop_watch".to_string(),
            description: "Stop the watch driver and tear the session down".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional, defaults to the current session)"
                    }
                }
            }),
        },
        Tool {
            name: "restart".to_string(),
            description: "Relaunch the debuggee, optionally rebuilding the project first".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "rebuild": {
                        "type": "boolean",
                        "description": "Run 'dotnet build' in the project directory before relaunching",
                        "default": false
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                }
            }),
        },
        Tool {
            name: "set_breakpoint".to_string(),
            description: "Set a breakpoint at a source line".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file": {
                        "type": "string",
                        "description": "Source file path (e.g., '/proj/Api/Controllers/Foo.cs')"
                    },
                    "line": {
                        "type": "integer",
                        "description": "1-based line number"
                    },
                    "condition": {
                        "type": "string",
                        "description": "Conditional expression - breakpoint only fires when this evaluates to truthy (e.g., 'count > 5')"
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                },
                "required": ["file", "line"]
            }),
        },
        Tool {
            name: "remove_breakpoint".to_string(),
            description: "Remove a breakpoint previously set with set_breakpoint".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file": {
                        "type": "string",
                        "description": "Source file path"
                    },
                    "line": {
                        "type": "integer",
                        "description": "1-based line number"
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                },
                "required": ["file", "line"]
            }),
        },
        Tool {
            name: "list_breakpoints".to_string(),
            description: "List all breakpoints in the session".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                }
            }),
        },
        Tool {
            name: "continue".to_string(),
            description: "Resume execution".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "threadId": {
                        "type": "integer",
                        "description": "Thread to resume (optional, defaults to the stopped thread)"
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                }
            }),
        },
        Tool {
            name: "pause".to_string(),
            description: "Pause execution".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "threadId": {
                        "type": "integer",
                        "description": "Thread to pause (optional)"
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                }
            }),
        },
        Tool {
            name: "step_over".to_string(),
            description: "Step over the current line".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "threadId": {
                        "type": "integer",
                        "description": "Thread to step (optional, defaults to the stopped thread)"
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                }
            }),
        },
        Tool {
            name: "step_into".to_string(),
            description: "Step into the call on the current line".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "threadId": {
                        "type": "integer",
                        "description": "Thread to step (optional, defaults to the stopped thread)"
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                }
            }),
        },
        Tool {
            name: "step_out".to_string(),
            description: "Step out of the current method".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "threadId": {
                        "type": "integer",
                        "description": "Thread to step (optional, defaults to the stopped thread)"
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                }
            }),
        },
        Tool {
            name: "stack_trace".to_string(),
            description: "Get the stack trace of a stopped thread".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "threadId": {
                        "type": "integer",
                        "description": "Thread ID (optional, defaults to the stopped thread)"
                    },
                    "depth": {
                        "type": "integer",
                        "description": "Maximum number of frames",
                        "default": 20
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                }
            }),
        },
        Tool {
            name: "scopes".to_string(),
            description: "List the variable scopes of a stack frame".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "frameId": {
                        "type": "integer",
                        "description": "Frame ID from stack_trace"
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                },
                "required": ["frameId"]
            }),
        },
        Tool {
            name: "variables".to_string(),
            description: "List the variables inside a container reference".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "variablesReference": {
                        "type": "integer",
                        "description": "Container handle from scopes or a structured variable"
                    },
                    "depth": {
                        "type": "integer",
                        "description": "How deep to expand nested containers (1-3)",
                        "default": 1
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                },
                "required": ["variablesReference"]
            }),
        },
        Tool {
            name: "evaluate".to_string(),
            description: "Evaluate an expression in the debuggee".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "expression": {
                        "type": "string",
                        "description": "C# expression to evaluate"
                    },
                    "frameId": {
                        "type": "integer",
                        "description": "Frame context (optional)"
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                },
                "required": ["expression"]
            }),
        },
        Tool {
            name: "threads".to_string(),
            description: "List the debuggee's threads".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                }
            }),
        },
        Tool {
            name: "output".to_string(),
            description: "Return recent debuggee and watch output, newest last".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "lines": {
                        "type": "integer",
                        "description": "How many entries to return",
                        "default": 20
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                }
            }),
        },
        Tool {
            name: "status".to_string(),
            description: "Report session state: running/stopped/reconnecting, process id, uptime, breakpoints".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                }
            }),
        },
        Tool {
            name: "terminate".to_string(),
            description: "Terminate the debuggee and destroy the session".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID (optional)"
                    }
                }
            }),
        },
        Tool {
            name: "list_sessions".to_string(),
            description: "List all debug sessions and which one is current".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        Tool {
            name: "select_session".to_string(),
            description: "Make a session the default for calls that omit sessionId".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sessionId": {
                        "type": "string",
                        "description": "Session to select"
                    }
                },
                "required": ["sessionId"]
            }),
        },
        Tool {
            name: "terminate_session".to_string(),
            description: "Terminate a specific session by ID".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sessionId": {
                        "type": "string",
                        "description": "Session to terminate"
                    }
                },
                "required": ["sessionId"]
            }),
        },
        Tool {
            name: "invoke".to_string(),
            description: "Invoke one method from an assembly via the reflection harness, optionally under the debugger".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "assembly": {
                        "type": "string",
                        "description": "Path to the assembly DLL"
                    },
                    "type": {
                        "type": "string",
                        "description": "Fully qualified type name (e.g., 'Company.Feature.Worker')"
                    },
                    "method": {
                        "type": "string",
                        "description": "Method name to invoke"
                    },
                    "args": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Method arguments"
                    },
                    "ctorArgs": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Constructor arguments for instance methods"
                    },
                    "debug": {
                        "type": "boolean",
                        "description": "Launch the harness as a debug session instead of running it plain",
                        "default": false
                    },
                    "cwd": {
                        "type": "string",
                        "description": "Working directory for the harness"
                    },
                    "sessionId": {
                        "type": "string",
                        "description": "Session ID for debug mode (optional)"
                    }
                },
                "required": ["assembly", "type", "method"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_tools_returns_25_tools() {
        let tools = get_tools();
        assert_eq!(tools.len(), 25);
    }

    #[test]
    fn all_tool_names_are_unique() {
        let tools = get_tools();
        let mut names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), tools.len());
    }

    #[test]
    fn launch_requires_program_only() {
        let tools = get_tools();
        let t = tools.iter().find(|t| t.name == "launch").unwrap();
        let required = t.input_schema["required"].as_array().unwrap();
        let required: Vec<&str> = required.iter().map(|v| v.as_str().unwrap()).collect();
        assert_eq!(required, vec!["program"]);
        assert!(t.input_schema["properties"]["launchProfile"].is_object());
    }

    #[test]
    fn every_debug_tool_accepts_session_id() {
        let tools = get_tools();
        for tool in tools.iter().filter(|t| t.name != "list_sessions") {
            assert!(
                tool.input_schema["properties"]["sessionId"].is_object(),
                "{} is missing sessionId",
                tool.name
            );
        }
    }

    #[test]
    fn set_breakpoint_has_optional_condition() {
        let tools = get_tools();
        let t = tools.iter().find(|t| t.name == "set_breakpoint").unwrap();
        assert!(t.input_schema["properties"]["condition"].is_object());
        let required = t.input_schema["required"].as_array().unwrap();
        let required: Vec<&str> = required.iter().map(|v| v.as_str().unwrap()).collect();
        assert!(!required.contains(&"condition"));
    }

    #[test]
    fn stack_trace_defaults_to_20_frames() {
        let tools = get_tools();
        let t = tools.iter().find(|t| t.name == "stack_trace").unwrap();
        assert_eq!(t.input_schema["properties"]["depth"]["default"], 20);
    }

    #[test]
    fn variables_depth_defaults_to_one_level() {
        let tools = get_tools();
        let t = tools.iter().find(|t| t.name == "variables").unwrap();
        assert_eq!(t.input_schema["properties"]["depth"]["default"], 1);
    }

    #[test]
    fn invoke_requires_assembly_type_method() {
        let tools = get_tools();
        let t = tools.iter().find(|t| t.name == "invoke").unwrap();
        let required = t.input_schema["required"].as_array().unwrap();
        let required: Vec<&str> = required.iter().map(|v| v.as_str().unwrap()).collect();
        assert!(required.contains(&"assembly"));
        assert!(required.contains(&"type"));
        assert!(required.contains(&"method"));
    }
}
