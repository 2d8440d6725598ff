//! Orderly CLI - plan and fulfil requests with tool-calling models
//!
//! Reads a request (argument, file or stdin), runs it through the orderly-core
//! workflow against the configured MCP tool server and prints progress as it
//! arrives. The exit code reports whether the request was fulfilled.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use orderly_core::config::{ConfigManager, McpTransportKind};
use orderly_core::{Config, ExecutionEvent, ProviderType, RunMode, ToolCallRecord, Workflow};

#[derive(Parser)]
#[command(name = "orderly")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Plan and fulfil requests with tool-calling models", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// LLM Provider (openai, anthropic, gemini, ...) - defaults to config setting
    #[arg(short, long, global = true)]
    provider: Option<String>,

    /// Model to use (defaults to config, then the provider's default)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// MCP server SSE endpoint
    #[arg(long, global = true)]
    mcp_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fulfil a request
    Run {
        /// Request text; read from --file or stdin when omitted
        request: Option<String>,

        /// Read the request from a file
        #[arg(short, long, conflicts_with = "request")]
        file: Option<PathBuf>,

        /// Orchestration mode: plan or stream
        #[arg(long, default_value_t = RunMode::Plan)]
        mode: RunMode,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// List the tools the MCP server offers
    Tools,

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone())?,
        None => ConfigManager::new()?,
    };
    apply_overrides(manager.config_mut(), &cli)?;

    // Logs go to stderr so they never mix with printed events; RUST_LOG wins
    let filter = default_filter(cli.verbose, manager.config());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&filter))
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Run {
            request,
            file,
            mode,
            json,
        }) => {
            let request = read_request(request, file)?;
            run_request(manager.into_config(), &request, mode, json).await
        }
        Some(Commands::Tools) => {
            show_tools(manager.into_config()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Config { save }) => {
            if save {
                manager.save()?;
                println!("{} {}", style("Saved").green(), manager.path().display());
            }
            show_config(&manager)?;
            Ok(ExitCode::SUCCESS)
        }
        None => {
            let request = read_request(None, None)?;
            run_request(manager.into_config(), &request, RunMode::Plan, false).await
        }
    }
}

/// Command-line flags take precedence over the config file
fn apply_overrides(config: &mut Config, cli: &Cli) -> anyhow::Result<()> {
    if let Some(provider) = &cli.provider {
        let provider_type: ProviderType = provider.parse().map_err(anyhow::Error::msg)?;
        if provider_type.as_str() != config.provider.provider_type {
            config.provider.provider_type = provider_type.as_str().to_string();
            // The configured model and key variable belong to the old provider
            config.provider.model = String::new();
            config.provider.api_key_env = provider_type.api_key_env().map(String::from);
        }
    }
    if let Some(model) = &cli.model {
        config.provider.model = model.clone();
    }
    if let Some(url) = &cli.mcp_url {
        config.mcp.transport = McpTransportKind::Sse;
        config.mcp.url = url.clone();
    }
    Ok(())
}

/// `--verbose` beats `[general] log_level`
fn default_filter(verbose: bool, config: &Config) -> String {
    if verbose {
        "info,orderly_core=debug,orderly_mcp=debug".to_string()
    } else {
        config.general.log_level.clone()
    }
}

fn read_request(request: Option<String>, file: Option<PathBuf>) -> anyhow::Result<String> {
    if let Some(request) = request {
        return Ok(request);
    }
    if let Some(path) = file {
        return std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e));
    }

    let mut request = String::new();
    std::io::stdin().read_to_string(&mut request)?;
    Ok(request)
}

async fn run_request(config: Config, request: &str, mode: RunMode, json: bool) -> anyhow::Result<ExitCode> {
    let provider_type = config.provider.provider()?;
    if provider_type.api_key_env().is_some() && config.provider.get_api_key().is_none() {
        show_setup_instructions(provider_type);
        return Ok(ExitCode::FAILURE);
    }

    let (tx, mut rx) = mpsc::channel::<ExecutionEvent>(64);
    let workflow = Workflow::from_config(config)?.with_events(tx);

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
                }
            } else {
                print_event(&event);
            }
        }
    });

    let outcome = workflow.run(request, mode).await;
    // Closes the event channel so the printer drains and stops
    drop(workflow);
    let _ = printer.await;

    if outcome.success {
        println!("{} {}", style("✓ Fulfilled:").bold().green(), outcome.summary);
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{} {}", style("✗ Not fulfilled:").bold().red(), outcome.summary);
        Ok(ExitCode::FAILURE)
    }
}

fn print_event(event: &ExecutionEvent) {
    if event.is_task_complete {
        return;
    }

    let prefix = match event.task_id {
        Some(id) => format!("[task {}] ", id),
        None => String::new(),
    };
    for record in &event.tool_calls {
        print_record(&prefix, record);
    }
    if let Some(content) = &event.content {
        println!("{}{}: {}", style(&prefix).dim(), style("Assistant").bold().green(), content);
    }
}

fn print_record(prefix: &str, record: &ToolCallRecord) {
    let name = if record.fallback {
        format!("{} (fallback)", record.tool_name)
    } else {
        record.tool_name.clone()
    };

    match &record.error {
        None => println!("  {}{} {}", style(prefix).dim(), style("✓").green(), style(name).yellow()),
        Some(error) if record.blocked => println!(
            "  {}{} {} {}",
            style(prefix).dim(),
            style("⊘").yellow(),
            style(name).yellow(),
            style(error).dim()
        ),
        Some(error) => println!(
            "  {}{} {} {}",
            style(prefix).dim(),
            style("✗").red(),
            style(name).yellow(),
            style(error).dim()
        ),
    }
}

async fn show_tools(config: Config) -> anyhow::Result<()> {
    let workflow = Workflow::from_config(config)?;
    let tools = workflow.list_tools().await?;

    println!("{}", style("Available Tools:").bold());
    println!();
    if tools.is_empty() {
        println!("  {}", style("The server offers no tools").dim());
    }
    for tool in &tools {
        println!("  {:<24} {}", style(&tool.name).cyan(), tool.description);
    }
    println!();

    let mut categories: Vec<_> = workflow.config().capabilities.iter().collect();
    categories.sort_by_key(|(agent_type, _)| **agent_type);
    println!("{}", style("Categories:").bold());
    for (agent_type, names) in categories {
        let served: Vec<&str> = names
            .iter()
            .filter(|name| tools.iter().any(|t| &t.name == *name))
            .map(String::as_str)
            .collect();
        let listing = if served.is_empty() {
            style("no tools available".to_string()).red()
        } else {
            style(served.join(", ")).dim()
        };
        println!("  {:<14} {}", style(agent_type).green(), listing);
    }
    Ok(())
}

fn show_config(manager: &ConfigManager) -> anyhow::Result<()> {
    let config = manager.config();
    let provider_type = config.provider.provider()?;

    println!("{}", style("Configuration:").bold());
    println!();
    println!("  Config file: {}", style(manager.path().display()).dim());
    println!("  Provider:    {}", style(provider_type).green());
    println!("  Model:       {}", style(config.provider.model_or_default()?).green());
    println!(
        "  API key:     {}",
        if config.provider.get_api_key().is_some() {
            style("configured").green()
        } else {
            style("missing").red()
        }
    );
    match config.mcp.transport {
        McpTransportKind::Sse => println!("  MCP server:  {}", style(&config.mcp.url).cyan()),
        McpTransportKind::Stdio => println!(
            "  MCP server:  {} {}",
            style(config.mcp.command.as_deref().unwrap_or("<unset>")).cyan(),
            config.mcp.args.join(" ")
        ),
    }
    println!("  Max turns:   {}", config.orchestration.max_iterations);
    println!("  Success on:  {}", config.orchestration.success_markers.join(", "));
    Ok(())
}

fn show_setup_instructions(provider_type: ProviderType) {
    let env_var = provider_type.api_key_env().unwrap_or("API_KEY");

    println!("{}", style("Setup Required").bold().yellow());
    println!("No API key configured for {}.", provider_type);
    println!();

    println!("{}", style("Option 1: Environment Variable (Quick)").bold());
    println!("  export {}=\"your-api-key-here\"", style(env_var).cyan());
    println!();

    println!("{}", style("Option 2: Config File (Persistent)").bold());
    let config_path = ConfigManager::default_config_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "~/.config/orderly/config.toml".to_string());
    println!("  Edit: {}", style(&config_path).cyan());
    println!();
    println!("  Example config:");
    println!("  {}", style("─".repeat(50)).dim());
    println!(
        r#"  [provider]
  provider_type = "{}"
  model = "{}"
  api_key = "your-api-key-here""#,
        provider_type,
        provider_type.default_model()
    );
    println!("  {}", style("─".repeat(50)).dim());
    println!();
    println!("For more help: {}", style("orderly --help").cyan());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_override_resets_model() {
        let cli = Cli::parse_from(["orderly", "--provider", "anthropic", "tools"]);
        let mut config = Config::default();
        apply_overrides(&mut config, &cli).unwrap();

        assert_eq!(config.provider.provider_type, "anthropic");
        assert_eq!(config.provider.model_or_default().unwrap(), ProviderType::Anthropic.default_model());
        assert_eq!(config.provider.api_key_env.as_deref(), Some("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_mcp_url_override() {
        let cli = Cli::parse_from(["orderly", "--mcp-url", "http://kb:9000/sse", "tools"]);
        let mut config = Config::default();
        config.mcp.transport = McpTransportKind::Stdio;
        apply_overrides(&mut config, &cli).unwrap();

        assert_eq!(config.mcp.transport, McpTransportKind::Sse);
        assert_eq!(config.mcp.url, "http://kb:9000/sse");
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::parse_from(["orderly", "run", "--mode", "stream", "two brake pads"]);
        match cli.command {
            Some(Commands::Run { request, mode, .. }) => {
                assert_eq!(request.as_deref(), Some("two brake pads"));
                assert_eq!(mode, RunMode::Stream);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_log_level_comes_from_config() {
        let mut config = Config::default();
        assert_eq!(default_filter(false, &config), "warn");

        config.general.log_level = "debug".to_string();
        assert_eq!(default_filter(false, &config), "debug");
        assert_eq!(default_filter(true, &config), "info,orderly_core=debug,orderly_mcp=debug");
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let cli = Cli::parse_from(["orderly", "--provider", "nope", "tools"]);
        assert!(apply_overrides(&mut Config::default(), &cli).is_err());
    }
}
