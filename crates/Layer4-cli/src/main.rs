//! plugrun CLI - Main entry point

mod demo;

use anyhow::Context;
use clap::{Parser, Subcommand};
use plugrun_core::{Engine, StaticPluginLoader};
use plugrun_foundation::{Event, PluginType, RuntimeConfig};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// plugrun - plugin runtime engine
#[derive(Parser, Debug)]
#[command(name = "plugrun")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (.toml or .json); defaults to ~/.plugrun/runtime.toml merged with ./plugrun.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the engine with the demo plugins, run one task per plugin and print a report
    Run {
        /// Plugin types to load (default: all)
        #[arg(short, long, value_delimiter = ',')]
        types: Vec<PluginType>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => RuntimeConfig::load().context("failed to load runtime config")?,
    };

    let log_level = if args.debug {
        "debug"
    } else {
        config.engine.log_level.as_str()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match args.command {
        Command::Run { types } => run(config, types).await,
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn run(config: RuntimeConfig, types: Vec<PluginType>) -> anyhow::Result<()> {
    let types = if types.is_empty() {
        PluginType::all().to_vec()
    } else {
        types
    };

    let loader = Arc::new(StaticPluginLoader::new());
    demo::register_all(&loader);

    let shutdown_timeout = config.engine.shutdown_timeout;
    let engine = Engine::new(config, loader)?;
    engine.start().await?;

    // 데이터 플러그인이 의존하므로 custom을 먼저 로드
    let mut ordered: Vec<PluginType> = Vec::new();
    for plugin_type in types {
        if !ordered.contains(&plugin_type) {
            ordered.push(plugin_type);
        }
    }
    if ordered.contains(&PluginType::Data) && !ordered.contains(&PluginType::Custom) {
        ordered.push(PluginType::Custom);
    }
    ordered.sort_by_key(|t| *t != PluginType::Custom);

    let mut loaded = Vec::new();
    for plugin_type in ordered {
        let path = format!("static://{}", demo::loader_name(plugin_type));
        let id = engine.load_plugin(&path).await?;
        if let Err(e) = engine.start_plugin(&id).await {
            warn!(plugin_id = %id, error = %e, "Demo plugin did not start");
            continue;
        }
        loaded.push((id, plugin_type));
    }

    let mut results = Vec::new();
    for (id, plugin_type) in &loaded {
        let result = engine.execute(demo::sample_task(id, *plugin_type)).await?;
        info!(plugin_id = %id, status = %result.status, "Demo task finished");
        results.push(result);
    }

    engine
        .publish(Event::new("demo.ping", "cli", json!({ "from": "plugrun run" })))
        .await?;
    engine.monitor().collect_metrics().await;

    let report = engine.report().await;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "results": results, "report": report }))?
    );

    engine.stop(shutdown_timeout).await?;
    Ok(())
}
