use std::error::Error;

use serde_json::{Map, Value};

use crate::cli::display::InvocationProgress;
use crate::cli::CliContext;

/// Parse `--args` into a JSON object. No arguments means an empty object.
pub fn parse_arguments(raw: Option<&str>) -> Result<Value, String> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(Value::Object(Map::new()));
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err("Tool arguments must be a JSON object".to_string()),
        Err(err) => Err(format!("Invalid tool arguments: {err}")),
    }
}

pub async fn run_invoke(
    context: &mut CliContext,
    server_id: &str,
    tool_name: &str,
    raw_arguments: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let arguments = parse_arguments(raw_arguments)?;
    eprintln!("⏳ Running {tool_name} on {server_id}…");

    let mut progress = InvocationProgress::new(std::io::stdout());
    let invocation = context
        .client
        .invoke_tool(&mut context.session, server_id, tool_name, &arguments, |invocation| {
            progress.update(invocation)
        })
        .await;
    if let Some(message) = context.session.last_message() {
        context.transcript.log_message(message)?;
    }

    if invocation.failed() {
        std::process::exit(1);
    }
    Ok(())
}
