//! Connect command - establish a persistent connection and stream events.

use std::sync::Arc;

use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};

use tm_core::config::{AppConfig, ConfigHandle};
use tm_core::error::{TmError, TmResult};
use tm_core::lifecycle::AppLifecycle;
use tm_core::session::{Credential, CredentialRefresher, MemorySession, SessionProvider};
use tm_socket::{ConnectionManager, ConnectionStatus, EventDispatcher, WsTransport};

/// Event types printed to the terminal as they arrive.
const STREAMED_TYPES: &[&str] = &["chat", "match", "match_removed", "profile", "profile_response"];

/// Run the connect command.
pub async fn run(
    config: ConfigHandle,
    url: Option<String>,
    token: String,
    save_config: bool,
) -> TmResult<()> {
    if let Some(url) = url {
        config.write().await.server.ws_url = url;
    }
    let server = config.read().await.server.clone();
    if server.ws_url.is_empty() {
        return Err(TmError::MissingConfig("server.ws_url".into()));
    }

    if save_config {
        let path = AppConfig::default_path()?;
        config.read().await.save_to_file(&path)?;
        println!(
            "  {} Config saved to {}",
            style("OK").green(),
            path.display()
        );
    }

    // The CLI has no refresh endpoint; an invalid session falls back to
    // the normal backoff path and ultimately exhausts.
    let session = Arc::new(MemorySession::new());
    session.set(Credential {
        session_token: token,
        refresh_token: String::new(),
        user_id: 0,
    });

    let policy = config.read().await.socket.clone();
    let dispatcher = EventDispatcher::new();
    for message_type in STREAMED_TYPES {
        let label = message_type.to_string();
        dispatcher.subscribe(message_type, move |payload| {
            println!("  {} {payload}", style(format!("[{label}]")).cyan());
        });
    }

    let manager = ConnectionManager::new(
        server.clone(),
        policy,
        Arc::new(WsTransport),
        Arc::clone(&session) as Arc<dyn SessionProvider>,
        Arc::clone(&session) as Arc<dyn CredentialRefresher>,
        Arc::new(AppLifecycle::new()),
        dispatcher,
    );

    println!(
        "{} Connecting to {}...",
        style("[*]").bold().dim(),
        server.ws_url
    );
    let mut status_rx = manager.status_receiver();
    manager.connect().await;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                match status {
                    ConnectionStatus::Connected => {
                        println!(
                            "  {} Connected. Listening for events... (Ctrl+C to stop)",
                            style("OK").green().bold()
                        );
                    }
                    ConnectionStatus::Connecting => {
                        println!("  {} Connecting...", style("..").dim());
                    }
                    ConnectionStatus::Disconnected => {
                        if manager.retries_exhausted().await {
                            println!(
                                "  {} Reconnect attempts exhausted. Press Enter to retry.",
                                style("FAIL").red().bold()
                            );
                        } else {
                            println!("  {} Disconnected.", style("--").yellow());
                        }
                    }
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(_)) => {
                        if manager.retries_exhausted().await {
                            println!("  {} Retrying...", style("..").dim());
                            manager.manual_retry().await;
                        }
                    }
                    // stdin closed; stop polling it.
                    _ => stdin_open = false,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n  Disconnecting...");
                manager.disconnect().await;
                break;
            }
        }
    }

    Ok(())
}
