use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use parley_agent::{HttpDecisionClient, SessionHandle, SessionManager};
use parley_browser::{ActionSurface, HttpBridgeSurface, NoopActionSurface};
use parley_core::config::{AppConfig, LoadOptions, SurfaceMode};
use parley_core::{
    ApprovalId, EventSink, NegotiationBrief, Sender, UiEvent, UiEventKind,
};

pub fn run(
    url: String,
    objective: String,
    constraints: Vec<String>,
    notes: Option<String>,
    config_path: Option<PathBuf>,
) -> ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to start async runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_session(url, objective, constraints, notes, config_path)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("session failed: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &AppConfig) {
    use parley_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

/// Prints session events to the terminal as they arrive.
struct TerminalEventSink;

impl EventSink for TerminalEventSink {
    fn publish(&self, event: UiEvent) {
        match event.kind {
            UiEventKind::ConversationUpdated { messages } => {
                if let Some(message) = messages.last() {
                    let who = match message.sender {
                        Sender::RemoteParty => "remote",
                        Sender::Agent => "agent ",
                        Sender::System => "system",
                    };
                    println!("[{who}] {}", message.text);
                }
            }
            UiEventKind::ApprovalRequired { request } => {
                println!();
                println!("=== APPROVAL REQUIRED ===");
                println!("  offer: {}", request.remote_offer_text);
                println!("  description: {}", request.description);
                println!("  recommendation: {:?}", request.recommendation);
                println!("  reasoning: {}", request.reasoning);
                if let Some(counter) = &request.counter_suggestion {
                    println!("  counter suggestion: {counter}");
                }
                println!("  resolve with: approve {0}  |  reject {0} [directive]", request.id.0);
                println!();
            }
            UiEventKind::ThinkingStatus { thinking, detail } => {
                if thinking {
                    println!("... {}", detail.unwrap_or_else(|| "thinking".to_owned()));
                }
            }
            UiEventKind::PhaseChanged { from, to } => {
                println!("--- phase: {from:?} -> {to:?}");
            }
            UiEventKind::ResearchResult { query, findings } => {
                println!("research results for \"{query}\":");
                for finding in findings {
                    println!("  {} {} - {}", finding.amount, finding.currency, finding.label);
                }
            }
            UiEventKind::Error { class, message } => {
                eprintln!("!!! [{class}] {message}");
            }
        }
    }
}

async fn run_session(
    url: String,
    objective: String,
    constraints: Vec<String>,
    notes: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = AppConfig::load(LoadOptions {
        config_path,
        ..LoadOptions::default()
    })?;
    init_logging(&config);

    let client = Arc::new(HttpDecisionClient::new(config.llm.clone())?);
    let surface: Arc<dyn ActionSurface> = match config.surface.mode {
        SurfaceMode::Noop => {
            tracing::info!(
                event_name = "system.run.surface_mode",
                surface_mode = "noop",
                "no automation bridge configured; running in dry-run mode"
            );
            Arc::new(NoopActionSurface)
        }
        SurfaceMode::HttpBridge => {
            let bridge_url = config
                .surface
                .bridge_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("http_bridge mode requires surface.bridge_url"))?;
            tracing::info!(
                event_name = "system.run.surface_mode",
                surface_mode = "http_bridge",
                bridge_url = %bridge_url,
                "automation bridge configured"
            );
            Arc::new(HttpBridgeSurface::new(bridge_url, Duration::from_secs(30))?)
        }
    };
    // Research gets its own bridge context so it never navigates the chat
    // page away.
    let research_surface: Arc<dyn ActionSurface> = match config.surface.mode {
        SurfaceMode::Noop => Arc::new(NoopActionSurface),
        SurfaceMode::HttpBridge => surface.clone(),
    };

    let brief = NegotiationBrief {
        objective,
        constraints,
        notes,
        ..NegotiationBrief::default()
    };

    let mut manager = SessionManager::new(config, client, surface, Arc::new(TerminalEventSink))
        .with_research_surface(research_surface);
    let handle = manager.create_session(url, brief);
    handle.start().await?;

    println!("session started; operator commands:");
    println!("  approve <id> | reject <id> [directive] | pause | resume");
    println!("  say <text> (send as the agent) | tell <text> (instruct the agent)");
    println!("  typing | research <query> | name <display name> | stop");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("interrupted; stopping session");
                break;
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !dispatch_operator_line(&handle, line.trim()).await? {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}

/// Routes one operator input line to the session. Returns false when the
/// session should stop.
async fn dispatch_operator_line(handle: &SessionHandle, line: &str) -> Result<bool> {
    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "stop" | "quit" | "exit" => return Ok(false),
        "pause" => handle.pause().await?,
        "resume" => handle.resume().await?,
        "typing" => handle.user_typing_signal().await?,
        "approve" if !rest.is_empty() => {
            handle.approve(ApprovalId(rest.to_owned())).await?;
        }
        "reject" if !rest.is_empty() => {
            let (id, directive) = match rest.split_once(' ') {
                Some((id, directive)) => (id, Some(directive.trim().to_owned())),
                None => (rest, None),
            };
            handle.reject(ApprovalId(id.to_owned()), directive).await?;
        }
        "say" if !rest.is_empty() => handle.user_override(rest).await?,
        "tell" if !rest.is_empty() => handle.user_directive(rest).await?,
        "research" if !rest.is_empty() => handle.research(rest).await?,
        "name" if !rest.is_empty() => handle.set_display_name(rest).await?,
        other => println!("unrecognized command: {other}"),
    }

    Ok(true)
}
