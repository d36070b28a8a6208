// Supabase MCP Gateway - Main Entry Point
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// CLI and MCP stdio server. All tool calls route through this gateway.
// Usage:
//   supabase-mcp-gateway serve                       # Run MCP server (stdio)
//   supabase-mcp-gateway capabilities                # Print the tool surface
//   supabase-mcp-gateway invoke <tool> <args-json>   # One-shot invocation
//   supabase-mcp-gateway status                      # Show gateway status
//   supabase-mcp-gateway init-config [--force]       # Write a config template

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use supabase_mcp_gateway::{
    audit::AuditLog, config::GatewayConfig, gateway::Gateway, mcp, paths, registry::Capability,
    supabase::SupabaseClient, tools,
};

#[derive(Parser)]
#[command(name = "supabase-mcp-gateway")]
#[command(version)]
#[command(about = "Supabase MCP Gateway - bounded tool surface over the Supabase Management API")]
struct Cli {
    /// Config file (JSON). SUPABASE_* env vars override its values.
    #[arg(short, long, default_value_os_t = paths::default_config_path())]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run MCP server (stdio JSON-RPC)
    Serve,

    /// Print the registered tools and their argument shapes
    Capabilities {
        /// Emit MCP tool definitions as JSON
        #[arg(long)]
        json: bool,
    },

    /// One-shot invocation through the gateway; prints the envelope
    Invoke {
        /// Tool name (list_tables, execute_sql, ...)
        tool: String,

        /// Arguments as JSON object
        #[arg(default_value = "{}")]
        args: String,
    },

    /// Show gateway status
    Status,

    /// Write a config template to the config path
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn build_gateway(config: &GatewayConfig) -> Result<Gateway> {
    config.validate().context("Invalid gateway config")?;
    let registry = tools::build_registry(config.read_only)
        .context("Failed to build capability registry")?;
    let backend = SupabaseClient::new(config).context("Failed to create Supabase client")?;
    Ok(Gateway::new(registry, Arc::new(backend)))
}

fn print_capability(cap: &Capability) {
    println!("{}", cap.name());
    println!("  {}", cap.description());
    for spec in cap.input_shape() {
        let requirement = if spec.required {
            "required".to_string()
        } else if let Some(default) = &spec.default {
            format!("default {}", default)
        } else {
            "optional".to_string()
        };
        println!("    {}: {} ({})", spec.name, spec.kind, requirement);
    }
}

fn main() -> Result<()> {
    // Initialize logging (safe if already init). stderr only; stdout is JSON-RPC.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .try_init();

    let cli = Cli::parse();

    let config = GatewayConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    match &cli.command {
        Commands::Serve => {
            let gateway = build_gateway(&config)?;
            let audit = AuditLog::new(config.audit_log.clone());
            mcp::run(Arc::new(gateway), audit);
        }

        Commands::Capabilities { json } => {
            let registry = tools::build_registry(config.read_only)
                .context("Failed to build capability registry")?;
            if *json {
                let defs: Vec<serde_json::Value> = registry
                    .list()
                    .iter()
                    .map(|cap| serde_json::json!({
                        "name": cap.name(),
                        "description": cap.description(),
                        "inputSchema": cap.input_schema(),
                    }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&defs)?);
            } else {
                for cap in registry.list() {
                    print_capability(cap);
                }
            }
        }

        Commands::Invoke { tool, args } => {
            let args: serde_json::Value = serde_json::from_str(args)
                .with_context(|| format!("Invalid args JSON: {}", args))?;

            let gateway = build_gateway(&config)?;
            let audit = AuditLog::new(config.audit_log.clone());

            audit.record_call(tool, &args);
            let envelope = gateway.handle(tool, &args);
            audit.record_outcome(tool, &envelope);

            println!("{}", serde_json::to_string_pretty(&envelope)?);

            if !envelope.is_success() {
                std::process::exit(1);
            }
        }

        Commands::Status => {
            println!("{} v{}", mcp::SERVER_NAME, mcp::SERVER_VERSION);
            println!("Config:      {:?}", cli.config);
            println!("API:         {}", config.api_url);
            println!(
                "Project:     {}",
                if config.project_ref.is_empty() { "(not set)" } else { config.project_ref.as_str() }
            );
            println!("Token:       {}", config.masked_token());
            println!("Timeout:     {}s", config.timeout_secs);
            println!("Read-only:   {}", config.read_only);
            match &config.audit_log {
                Some(path) => println!("Audit log:   {:?}", path),
                None => println!("Audit log:   disabled"),
            }
            if !config.fallback_tables.is_empty() {
                println!("Fallback:    DEGRADED probing of {} table name(s)", config.fallback_tables.len());
            }
            println!();
            match config.validate() {
                Ok(()) => println!("Config OK"),
                Err(e) => println!("Config incomplete: {}", e),
            }
            let registry = tools::build_registry(config.read_only)
                .context("Failed to build capability registry")?;
            println!();
            println!("Tools ({}):", registry.len());
            for cap in registry.list() {
                println!("  {}", cap.name());
            }
        }

        Commands::InitConfig { force } => {
            if cli.config.exists() && !force {
                anyhow::bail!("{:?} already exists (use --force to overwrite)", cli.config);
            }
            let template = GatewayConfig::default();
            template
                .save(&cli.config)
                .with_context(|| format!("Failed to write config to {:?}", cli.config))?;
            println!("Config template written to {:?}", cli.config);
            println!("Set project_ref and access_token, or export SUPABASE_PROJECT_REF / SUPABASE_ACCESS_TOKEN.");
        }
    }

    Ok(())
}
