mod demo;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use agentflow_core::config::AppConfig;
use agentflow_core::{EventBus, FlowEventKind};
use agentflow_engine::Workflow;

#[derive(Parser)]
#[command(name = "agentflow", version, about = "Compose agents into sequences, loops, and conditionals")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "agentflow.toml")]
    config: PathBuf,

    /// Print engine events to stderr as they happen
    #[arg(long, global = true)]
    events: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a story: draft, adapt to the audience, then apply a style
    Story {
        /// Story topic (omit to see the missing-argument failure)
        #[arg(long)]
        topic: Option<String>,
        #[arg(long, default_value = "fantasy")]
        style: String,
        #[arg(long, default_value = "young adults")]
        audience: String,
        /// Recover a missing topic with a default instead of failing
        #[arg(long)]
        recover: bool,
    },
    /// Draft a story, then revise it until its style score passes
    Review {
        #[arg(long)]
        topic: String,
        #[arg(long, default_value = "comedy")]
        style: String,
        /// Print the final scope
        #[arg(long)]
        show_scope: bool,
    },
    /// Route a request to a medical, technical, or legal expert
    Ask {
        /// The request text
        #[arg(trailing_var_arg = true, required = true)]
        request: Vec<String>,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config
    let (config, config_found) = if cli.config.exists() {
        (AppConfig::load(&cli.config)?, true)
    } else {
        (AppConfig::default(), false)
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_target(config.log.with_target)
        .init();

    if config_found {
        info!(path = %cli.config.display(), "Loaded config");
    } else {
        warn!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    let event_bus = cli
        .events
        .then(|| Arc::new(EventBus::new(config.engine.event_capacity)));
    let printer = event_bus.as_ref().map(spawn_event_printer);
    let engine = &config.engine;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Story {
            topic,
            style,
            audience,
            recover,
        } => {
            let workflow = if recover {
                demo::story_creator_with_recovery(engine, event_bus.clone())?
            } else {
                demo::story_creator(engine, event_bus.clone())?
            };
            let mut args = vec![
                ("style", Value::from(style)),
                ("audience", Value::from(audience)),
            ];
            if let Some(topic) = topic {
                args.push(("topic", Value::from(topic)));
            }
            run_story(&workflow, args).await?;
        }
        Commands::Review {
            topic,
            style,
            show_scope,
        } => {
            let workflow = demo::story_with_review(engine, event_bus.clone())?;
            let result = workflow
                .invoke_with_scope([("topic", topic), ("style", style)])
                .await?;
            println!("{}", demo::render(result.result()));
            println!(
                "\nstyle score: {:.1}",
                result.scope().read_as_or("score", 0.0_f64)
            );
            if show_scope {
                println!("{}", serde_json::to_string_pretty(result.scope())?);
            }
        }
        Commands::Ask { request } => {
            let workflow = demo::expert_router(engine, event_bus.clone())?;
            let result = workflow
                .invoke_with_scope([("request", request.join(" "))])
                .await?;
            let category = result.scope().read_or("category", "UNKNOWN");
            println!("[{}]", demo::render(&category));
            match result.result() {
                Value::Null => println!("No expert is available for this request."),
                response => println!("{}", demo::render(response)),
            }
        }
    }

    // Let the printer drain before exit
    drop(event_bus);
    if let Some(handle) = printer {
        handle.await.ok();
    }

    Ok(())
}

async fn run_story(workflow: &Workflow, args: Vec<(&str, Value)>) -> anyhow::Result<()> {
    match workflow.invoke(args).await {
        Ok(story) => {
            println!("{}", demo::render(&story));
            Ok(())
        }
        Err(e) if demo::is_missing_input(&e) => {
            eprintln!("Hint: pass --topic, or --recover to fall back to a default topic.");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn spawn_event_printer(bus: &Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match &event.kind {
                FlowEventKind::AgentStarted { agent, attempt } if *attempt > 0 => {
                    eprintln!("[retry {}: {}]", attempt, agent);
                }
                FlowEventKind::AgentStarted { agent, .. } => eprintln!("[agent: {}]", agent),
                FlowEventKind::AgentFailed { agent, error, .. } => {
                    eprintln!("[{}: ERROR] {}", agent, error);
                }
                FlowEventKind::LoopIteration {
                    iteration,
                    max_iterations,
                } => eprintln!("[loop {}/{}]", iteration, max_iterations),
                _ => {
                    if let Ok(line) = serde_json::to_string(&event.kind) {
                        eprintln!("[event] {}", line);
                    }
                }
            }
        }
    })
}
