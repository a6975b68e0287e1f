//! Math Tool
//!
//! Single arithmetic operations on one or two numbers.

use agent_core::{Arguments, FunctionTool, Schema};
use anyhow::bail;
use serde_json::{Value, json};

pub const NAME: &str = "math_calculation";

const OPERATIONS: [&str; 6] = ["add", "subtract", "multiply", "divide", "power", "sqrt"];

/// `math_calculation {operation, a, b?}`
pub fn math_tool() -> FunctionTool {
    FunctionTool::from_fn(
        NAME,
        "Perform mathematical calculations and operations",
        Schema::object([
            (
                "operation",
                Schema::enumeration(OPERATIONS)
                    .description("The mathematical operation to perform"),
            ),
            ("a", Schema::number().description("First number for the operation")),
            (
                "b",
                Schema::number()
                    .description("Second number for the operation (not needed for sqrt)")
                    .optional(),
            ),
        ]),
        |args, _ctx| calculate(args),
    )
}

fn calculate(args: &Arguments) -> anyhow::Result<Value> {
    let operation = args.get("operation").and_then(Value::as_str).unwrap_or_default();
    let Some(a) = args.get("a").and_then(Value::as_f64) else {
        bail!("Missing number 'a'");
    };
    let b = args.get("b").and_then(Value::as_f64);

    let result = match (operation, b) {
        ("sqrt", _) if a < 0.0 => bail!("Cannot calculate square root of negative number"),
        ("sqrt", _) => a.sqrt(),
        (_, None) => bail!("Operation '{operation}' needs a second number 'b'"),
        ("add", Some(b)) => a + b,
        ("subtract", Some(b)) => a - b,
        ("multiply", Some(b)) => a * b,
        ("divide", Some(b)) if b == 0.0 => bail!("Division by zero"),
        ("divide", Some(b)) => a / b,
        ("power", Some(b)) => a.powf(b),
        (other, Some(_)) => bail!("Unknown operation: {other}"),
    };
    if !result.is_finite() {
        bail!("Result is not a finite number");
    }

    tracing::debug!(operation, result, "Math operation");
    Ok(json!({
        "result": result,
        "operation": operation,
        "inputs": {"a": a, "b": b},
    }))
}
