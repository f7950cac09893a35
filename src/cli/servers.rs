use std::error::Error;
use std::time::Duration;

use tracing::warn;

use crate::api::SessionServerRecord;
use crate::cli::CliContext;

pub fn format_servers(servers: &[SessionServerRecord]) -> String {
    if servers.is_empty() {
        return "No servers attached to this session.".to_string();
    }

    let width = servers
        .iter()
        .map(|server| server.display_name().chars().count())
        .max()
        .unwrap_or(0);

    let mut lines = vec!["Attached servers:".to_string()];
    for server in servers {
        let status = if server.is_active { "active" } else { "inactive" };
        let mut line = format!(
            "  • {:<width$}  {status}",
            server.display_name(),
            width = width
        );
        if server.server_name.is_some() {
            line.push_str(&format!("  ({})", server.server_id));
        }
        if let Some(installed_at) = &server.installed_at {
            line.push_str(&format!("  installed {installed_at}"));
        }
        lines.push(line.trim_end().to_string());
    }
    lines.join("\n")
}

pub async fn list_servers(context: &mut CliContext) -> Result<(), Box<dyn Error>> {
    let servers = context.client.refresh_servers(&mut context.session).await?;
    println!("{}", format_servers(servers));
    Ok(())
}

/// Poll the server list, printing it whenever it changes. Runs until the
/// process is interrupted.
pub async fn watch_servers(context: &mut CliContext, secs: u64) -> Result<(), Box<dyn Error>> {
    let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
    let mut last: Option<Vec<SessionServerRecord>> = None;

    loop {
        interval.tick().await;
        match context.client.refresh_servers(&mut context.session).await {
            Ok(servers) => {
                if last.as_deref() != Some(servers) {
                    println!("{}", format_servers(servers));
                    last = Some(servers.to_vec());
                }
            }
            Err(err) => warn!(error = %err, "Failed to refresh servers"),
        }
    }
}

pub async fn add_server(context: &mut CliContext, server_id: &str) -> Result<(), Box<dyn Error>> {
    let message = context.client.add_server(&mut context.session, server_id).await?;
    println!("✅ {}", message.as_deref().unwrap_or("Server added"));
    println!("{}", format_servers(&context.session.servers));
    Ok(())
}
