//! CLI entrypoint for chorus
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, bail};
use chorus_application::{
    EventSink, NoCheckpoints, SessionCoordinator,
};
use chorus_domain::{PromptTemplate, QualityScorer, RoundSpec, VoiceSpec};
use chorus_infrastructure::{
    AdapterRegistry, ConfigLoader, FanoutSink, FileConfig, JsonCheckpointStore, JsonlEventSink,
    LengthHeuristicScorer, StaticVoiceFactory, TracingEventSink,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chorus", about = "Resilient multi-voice dialogue orchestration", version)]
struct Cli {
    /// Dialogue topic, available to round prompts as {{topic}}
    topic: Option<String>,

    /// Session identifier (generated when omitted)
    #[arg(long)]
    session_id: Option<String>,

    /// Resume the named session from its latest checkpoint
    #[arg(long, requires = "session_id")]
    resume: bool,

    /// Explicit config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip config file discovery, use built-in defaults
    #[arg(long)]
    no_config: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print the full session result as JSON
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(cli: &Cli) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    };

    match &cli.log_file {
        Some(path) => {
            let file = tracing_appender::rolling::never(
                path.parent().unwrap_or_else(|| std::path::Path::new(".")),
                path.file_name().unwrap_or_else(|| "chorus.log".as_ref()),
            );
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

fn build_registry(config: &FileConfig) -> Result<AdapterRegistry> {
    let mut registry = AdapterRegistry::new();
    for (name, provider) in &config.providers {
        if !provider.static_replies.is_empty() {
            registry = registry.register(
                name.clone(),
                Arc::new(StaticVoiceFactory::new(provider.static_replies.clone())),
            );
            continue;
        }

        #[cfg(feature = "http-voice")]
        {
            if provider.base_url.is_empty() {
                bail!("provider '{name}' has neither base_url nor static_replies");
            }
            let api_key = match &provider.api_key_env {
                Some(var) => Some(std::env::var(var).with_context(|| {
                    format!("provider '{name}': environment variable {var} is not set")
                })?),
                None => None,
            };
            registry = registry.register(
                name.clone(),
                Arc::new(chorus_infrastructure::HttpVoiceFactory::new(
                    provider.base_url.clone(),
                    api_key,
                )),
            );
        }
        #[cfg(not(feature = "http-voice"))]
        bail!("provider '{name}' needs HTTP support; rebuild with the http-voice feature");
    }
    Ok(registry)
}

fn validate_roster(specs: &[VoiceSpec], resume: bool) -> Result<()> {
    if !resume && specs.is_empty() {
        bail!("no voices configured; add [[voices]] entries to chorus.toml");
    }
    Ok(())
}

fn default_rounds() -> Vec<RoundSpec> {
    vec![
        RoundSpec::new(
            "opening",
            PromptTemplate::new("Give your independent perspective on: {{topic}}"),
        ),
        RoundSpec::new(
            "challenge",
            PromptTemplate::new(
                "Challenge the strongest claims made so far about {{topic}}. \
                 Be specific about what you disagree with and why.",
            ),
        ),
        RoundSpec::new(
            "synthesis",
            PromptTemplate::new(
                "Given the discussion so far, state your final position on {{topic}}.",
            ),
        ),
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(&cli);

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_ref()).map_err(|e| anyhow::anyhow!(e))?
    };

    let specs = config.voice_specs().context("invalid voice roster")?;
    // A resumed session gathers from the specs stored in its
    // checkpoint, so an empty config roster is only fatal for new runs.
    validate_roster(&specs, cli.resume)?;

    // === Dependency injection ===
    let registry = Arc::new(build_registry(&config)?);
    let scorer: Arc<dyn QualityScorer> = Arc::new(LengthHeuristicScorer);

    let events: Arc<dyn EventSink> = match &config.event_log {
        Some(path) => match JsonlEventSink::new(path) {
            Some(jsonl) => Arc::new(FanoutSink::new(vec![
                Arc::new(TracingEventSink),
                Arc::new(jsonl),
            ])),
            None => {
                warn!("event log unavailable, falling back to tracing only");
                Arc::new(TracingEventSink)
            }
        },
        None => Arc::new(TracingEventSink),
    };

    let checkpoints: Arc<dyn chorus_application::CheckpointStore> = match &config.checkpoint_dir {
        Some(dir) => Arc::new(JsonCheckpointStore::new(dir)),
        None => Arc::new(NoCheckpoints),
    };

    let policy = config.session_policy();
    let coordinator =
        SessionCoordinator::new(registry, scorer, events, checkpoints, policy);

    // Ctrl-C aborts the session; in-flight rounds finish as cancelled
    // and cleanup still runs.
    let cancel = coordinator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling session");
            cancel.cancel();
        }
    });

    let session_id = cli.session_id.clone().unwrap_or_else(|| {
        format!("session-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S"))
    });

    let mut context = serde_json::Map::new();
    if let Some(topic) = &cli.topic {
        context.insert("topic".to_string(), serde_json::Value::String(topic.clone()));
    }

    let result = if cli.resume {
        info!(session_id, "resuming session");
        coordinator.resume_by_id(&session_id, &context).await?
    } else {
        let topic = cli
            .topic
            .as_deref()
            .map(str::to_owned)
            .unwrap_or_default();
        if topic.is_empty() {
            bail!("a topic is required unless resuming with --resume");
        }
        let rounds = if config.rounds.is_empty() {
            default_rounds()
        } else {
            config.rounds.clone()
        };
        info!(session_id, rounds = rounds.len(), voices = specs.len(), "starting session");
        coordinator.run(&session_id, &specs, &rounds, &context).await?
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("session:   {}", result.session_id);
    println!("rounds:    {}", result.rounds_completed);
    println!("aggregate: {:.3}", result.aggregate_score);
    println!("consensus: {}", if result.consensus { "yes" } else { "no" });
    if result.degraded {
        println!("degraded:  yes");
        for (identity, reason) in &result.failed_voices {
            println!("  {identity}: {reason}");
        }
    }
    if let Some(error) = &result.error {
        println!("error:     {error}");
    }
    for round in &result.rounds {
        println!();
        println!("== {} (score {:.3}) ==", round.kind, round.aggregate_score);
        for (identity, outcome) in &round.outcomes {
            match outcome {
                chorus_domain::VoiceOutcome::Response { text, quality, .. } => {
                    println!("[{identity}] (q {quality:.2})");
                    println!("{text}");
                }
                chorus_domain::VoiceOutcome::Absent { reason } => {
                    println!("[{identity}] absent: {reason}");
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_roster_only_fatal_for_new_runs() {
        assert!(validate_roster(&[], true).is_ok());
        assert!(validate_roster(&[], false).is_err());
    }
}
