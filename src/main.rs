use agent_forge::cli::{Args, Commands};
use agent_forge::config::CandidateStatus;
use agent_forge::env;
use agent_forge::synthesis::ImplementationShape;
use agent_forge::worker::LogLevel;
use agent_forge::{
    AssignmentOrchestrator, ConfigDiscovery, ForgeConfig, ResourceRequirement, ResourceStore, ResourceSynthesizer, Task,
    TaskAnalyzer, TaskKind, WorkerTemplate,
};
use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, config_path) = load_config(args.config.as_deref())?;
    init_logging(&config);
    info!("Starting agent-forge {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Using configuration from {:?}", path);
    }

    match args.command {
        Commands::Analyze {
            title,
            description,
            kind,
        } => analyze(Task::new(title, description, kind)),
        Commands::Synthesize {
            name,
            category,
            kind,
            params,
            export,
        } => {
            let mut requirement = ResourceRequirement::new(name, category, kind);
            for (key, value) in params {
                requirement = requirement.with_parameter(key, value);
            }
            synthesize(requirement, export.as_deref()).await
        }
        Commands::Run {
            title,
            description,
            kind,
            command,
        } => run(config, Task::new(title, description, kind), command, args.verbose).await,
        Commands::ShowConfig => {
            show_config(&config, config_path.as_deref());
            Ok(())
        }
        Commands::InitConfig => {
            let path = ConfigDiscovery::from_environment().create_default_user_config()?;
            println!("Configuration file: {}", path.display());
            Ok(())
        }
    }
}

fn load_config(override_path: Option<&Path>) -> Result<(ForgeConfig, Option<PathBuf>)> {
    if let Some(path) = override_path {
        let config = ForgeConfig::from_toml_file(path)
            .with_context(|| format!("failed to load configuration override {}", path.display()))?;
        return Ok((config, Some(path.to_path_buf())));
    }
    Ok(ConfigDiscovery::from_environment().discover_config()?)
}

/// RUST_LOG wins over the configured filter
fn init_logging(config: &ForgeConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn analyze(task: Task) -> Result<()> {
    let analyzer = TaskAnalyzer::new();
    let analysis = analyzer.analyze(&task)?;
    let requirements = analyzer.required_resources(&analysis);

    let output = json!({
        "analysis": analysis,
        "requirements": requirements,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn synthesize(requirement: ResourceRequirement, export: Option<&Path>) -> Result<()> {
    let resource = ResourceSynthesizer::new().synthesize(&requirement)?;
    println!("{}", serde_json::to_string_pretty(&resource)?);

    if let Some(target) = export {
        let script = matches!(
            resource.shape,
            ImplementationShape::CommandWrapper | ImplementationShape::ApiWrapper
        );
        let path = if target.is_dir() {
            env::exported_resource_path(target, &resource.name, script)
        } else {
            target.to_path_buf()
        };
        let store = ResourceStore::new();
        let stored = store.insert(resource);
        let written = store.export(&stored.id, &path).await?;
        println!("Exported {} to {}", stored.name, written.display());
    }
    Ok(())
}

fn shell_template(command: String) -> WorkerTemplate {
    WorkerTemplate::from_fn("shell", "Shell command worker", move |task, ctx| {
        let command = command.clone();
        async move {
            ctx.log(LogLevel::Info, &format!("running: {}", command));
            let result = ctx.utils.run_command("sh", &["-c", command.as_str()]).await?;
            if !result.success() {
                anyhow::bail!(
                    "command exited with {} for task {}: {}",
                    result.exit_code,
                    task.id,
                    result.stderr.trim()
                );
            }
            Ok(json!({
                "exit_code": result.exit_code,
                "stdout": result.stdout,
                "stderr": result.stderr,
            }))
        }
    })
    .with_kinds(TaskKind::ALL)
}

async fn run(config: ForgeConfig, task: Task, command: String, verbose: bool) -> Result<()> {
    let orchestrator = AssignmentOrchestrator::from_config(config)?;
    orchestrator.registry().register_template(shell_template(command)).await;

    match orchestrator.assign(&task).await {
        Ok(report) => {
            if verbose {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if let Some(stdout) = report.output.get("stdout").and_then(Value::as_str) {
                print!("{}", stdout);
            }
            Ok(())
        }
        Err(e) => {
            error!("Assignment failed: {}", e);
            eprintln!("{}", serde_json::to_string_pretty(&e)?);
            std::process::exit(1);
        }
    }
}

fn show_config(config: &ForgeConfig, loaded_from: Option<&Path>) {
    println!("Configuration discovery (highest priority first):");
    for (path, status) in ConfigDiscovery::from_environment().report() {
        let label = match status {
            CandidateStatus::Found => "found",
            CandidateStatus::NotAFile => "not a file",
            CandidateStatus::Missing => "missing",
        };
        println!("  [{}] {}", label, path.display());
    }
    match loaded_from {
        Some(path) => println!("\nActive configuration: {}", path.display()),
        None => println!("\nActive configuration: built-in defaults"),
    }
    match config.to_toml_string() {
        Ok(rendered) => println!("\n{}", rendered),
        Err(e) => eprintln!("Could not render configuration: {}", e),
    }
}

