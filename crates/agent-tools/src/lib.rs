//! # agent-tools
//!
//! Ready-made tools for `agent-core`, each declared with an explicit schema
//! through [`FunctionTool`](agent_core::FunctionTool).
//!
//! | tool               | purpose                                   |
//! |--------------------|-------------------------------------------|
//! | `math_calculation` | one arithmetic operation on two numbers   |
//! | `calculate`        | evaluate an arithmetic expression         |
//! | `datetime`         | current date and time                     |
//! | `http_request`     | fetch a URL                               |

pub mod calculator;
pub mod datetime;
pub mod http;
pub mod math;

use agent_core::{FunctionTool, ToolRegistry};

pub use calculator::calculator_tool;
pub use datetime::datetime_tool;
pub use http::{http_tool, http_tool_with};
pub use math::math_tool;

/// Every built-in tool
pub fn builtin_tools() -> Vec<FunctionTool> {
    vec![math_tool(), calculator_tool(), datetime_tool(), http_tool()]
}

/// Register every built-in tool
pub fn register_builtins(registry: &mut ToolRegistry) {
    for tool in builtin_tools() {
        registry.register(tool);
    }
}
