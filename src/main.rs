#![allow(missing_docs)]

//! Straylight CLI -- run the pipeline, check the guard, drive the swarm,
//! serve the brain MCP tools, and verify saved evidence.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use straylight::config::StraylightConfig;
use straylight::guard::GuardPipeline;
use straylight::mcp::BrainMcpServer;
use straylight::memory::TieredMemoryService;
use straylight::orchestrator::Orchestrator;
use straylight::providers::ProviderFactory;
use straylight::swarm::SwarmEngine;
use straylight::{logging, EvidencePack};

/// Exit code for an interrupt (SIGINT).
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "straylight", version, about = "Cognitive control plane runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a task through the seven-phase pipeline.
    Run {
        /// The task text.
        task: String,
        /// Compile the session into a token-budgeted working context first.
        #[arg(long)]
        compiled: bool,
        /// Token budget for the compiled context.
        #[arg(long, default_value_t = 2048)]
        budget: usize,
        /// Use the configured provider instead of the deterministic path.
        #[arg(long)]
        with_provider: bool,
        /// Save the evidence pack to the configured evidence directory.
        #[arg(long)]
        save_evidence: bool,
    },
    /// Evaluate text against the guard pipeline. Exits non-zero on block.
    Guard {
        /// Text to evaluate.
        text: String,
    },
    /// Analyze and execute a task through the swarm engine.
    Swarm {
        /// The task text.
        task: String,
        /// Only print the analysis, do not execute.
        #[arg(long)]
        analyze_only: bool,
    },
    /// Serve the brain tools over stdio JSON-RPC.
    McpServe,
    /// Load a saved evidence pack, verify it, and print the Merkle root.
    Evidence {
        /// Path to an `evidence_<session>.jsonl` file.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let interrupted = tokio::signal::ctrl_c();
    let work = execute(cli);
    tokio::select! {
        result = work => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{e:#}");
                ExitCode::FAILURE
            }
        },
        _ = interrupted => {
            info!("interrupted");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let config = match &cli.command {
        Command::McpServe => {
            let config = StraylightConfig::load()?;
            let _guard = logging::init_serve(&config.paths.logs_dir)?;
            return serve(config).await;
        }
        _ => {
            logging::init_cli();
            StraylightConfig::load()?
        }
    };

    match cli.command {
        Command::Run {
            task,
            compiled,
            budget,
            with_provider,
            save_evidence,
        } => run_task(&config, &task, compiled, budget, with_provider, save_evidence).await,
        Command::Guard { text } => guard_check(&text),
        Command::Swarm { task, analyze_only } => swarm_task(&task, analyze_only).await,
        Command::Evidence { path } => verify_evidence(&path),
        Command::McpServe => unreachable!("handled above"),
    }
}

async fn run_task(
    config: &StraylightConfig,
    task: &str,
    compiled: bool,
    budget: usize,
    with_provider: bool,
    save_evidence: bool,
) -> Result<()> {
    let mut orchestrator = Orchestrator::new();
    if with_provider {
        let provider = ProviderFactory::create(true)?;
        info!(provider = %ProviderFactory::describe(provider.as_ref()), "provider selected");
        orchestrator = orchestrator.with_provider(provider);
    }

    let (result, session_id, blocked) = if compiled {
        let outcome = orchestrator.run_compiled(task, budget, None, None)?;
        info!(
            budget_used = outcome.budget_used,
            within_budget = outcome.within_budget,
            "context compiled"
        );
        (outcome.result, outcome.session_id, outcome.blocked)
    } else if with_provider {
        let outcome = orchestrator.run_async(task).await?;
        (outcome.result, outcome.session_id, outcome.blocked)
    } else {
        let outcome = orchestrator.run(task)?;
        (outcome.result, outcome.session_id, outcome.blocked)
    };

    if save_evidence {
        let path = orchestrator.evidence.save(&config.paths.evidence_dir)?;
        info!(path = %path.display(), "evidence saved");
    }

    println!("{result}");
    if blocked {
        anyhow::bail!("input blocked by guard (session {session_id})");
    }
    info!(%session_id, "pipeline complete");
    Ok(())
}

fn guard_check(text: &str) -> Result<()> {
    let verdict = GuardPipeline::new().evaluate(text);
    println!(
        "{}",
        serde_json::json!({
            "allowed": verdict.allowed,
            "threat_level": verdict.threat_level.as_str(),
            "score": verdict.score,
            "reason": verdict.reason,
        })
    );
    if !verdict.allowed {
        anyhow::bail!("blocked: {}", verdict.reason);
    }
    Ok(())
}

async fn swarm_task(task: &str, analyze_only: bool) -> Result<()> {
    let engine = SwarmEngine::new();
    if analyze_only {
        let analysis = engine.analyze(task);
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }
    let result = engine.run(task);
    println!("{}", result.output);
    info!(mode = result.mode.as_str(), "swarm run complete");
    Ok(())
}

async fn serve(_config: StraylightConfig) -> Result<()> {
    info!("brain MCP server starting on stdio");
    let guard = Arc::new(GuardPipeline::new());
    let memory = Arc::new(TieredMemoryService::default());
    let mut server = BrainMcpServer::new(guard, memory);
    server.run_stdio().await?;
    info!("stdin closed, shutting down");
    Ok(())
}

fn verify_evidence(path: &PathBuf) -> Result<()> {
    let pack = EvidencePack::load(path)?;
    let verified = pack.verify();
    println!(
        "{}",
        serde_json::json!({
            "session_id": pack.session_id,
            "entries": pack.len(),
            "verified": verified,
            "merkle_root": pack.merkle_root_hash(),
        })
    );
    if !verified {
        anyhow::bail!("evidence pack failed verification");
    }
    Ok(())
}
