//! `arbor mcp` commands: toggle MCP servers in the agent settings file.

use std::path::Path;

use anyhow::Result;

use arbor_core::mcp::McpSettings;

use crate::McpCommands;

pub fn run_mcp_command(command: McpCommands, settings_path: &Path) -> Result<()> {
    let mut settings = McpSettings::load(settings_path)?;

    match command {
        McpCommands::List => {
            if settings.servers().is_empty() {
                println!("No MCP servers configured in {}.", settings.file().display());
                return Ok(());
            }
            let width = settings.servers().iter().map(|s| s.id.len()).max().unwrap_or(0);
            for server in settings.servers() {
                let state = if server.is_enabled() { "enabled" } else { "disabled" };
                let detail = match (&server.command, &server.kind) {
                    (Some(command), _) => {
                        let args = server.args.as_deref().unwrap_or_default().join(" ");
                        format!("{command} {args}").trim_end().to_string()
                    }
                    (None, Some(kind)) => kind.clone(),
                    (None, None) => String::new(),
                };
                println!("{:<width$}  {state:<8}  {detail}", server.id);
            }
        }
        McpCommands::Enable { id } => {
            settings.set_enabled(&id, true)?;
            println!("Enabled {id}.");
        }
        McpCommands::Disable { id } => {
            settings.set_enabled(&id, false)?;
            println!("Disabled {id}.");
        }
    }

    Ok(())
}
