// src/cli.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::app_log;
use crate::auth::{load_token_file, SessionStore, SessionToken};
use crate::config::SyncConfig;
use crate::messaging::{self, HttpMessagesApi, MessageSnapshot, MessagesApi};
use crate::utils::badge_label;

#[derive(Parser)]
#[command(name = "portal-sync")]
#[command(about = "Follow unread message counts and typing indicators for a portal account")]
pub struct SyncCli {
    #[command(subcommand)]
    pub command: SyncCommand,

    /// File holding the session token written by the login flow
    #[arg(long, env = "PORTAL_TOKEN_FILE", default_value = ".portal-token")]
    pub token_file: PathBuf,

    /// Override the portal API base URL
    #[arg(long, env = "PORTAL_API_BASE_URL")]
    pub api_base_url: Option<String>,
}

#[derive(Subcommand)]
pub enum SyncCommand {
    /// Stream unread counts and typing indicators until interrupted
    Watch {
        /// Conversation currently open (its events never count as unread)
        #[arg(long)]
        active: Option<String>,
        /// User rooms to join once the channel is up
        #[arg(long = "join")]
        rooms: Vec<String>,
    },
    /// Fetch the unread-count snapshot once
    Unread,
    /// Mark every message from a peer as read
    MarkRead { peer: String },
    /// Show who the stored token belongs to
    Whoami,
}

pub async fn handle_sync_command(cli: SyncCli) -> Result<()> {
    let mut config = SyncConfig::load()?;
    if let Some(url) = &cli.api_base_url {
        config.api_base_url = url.trim_end_matches('/').to_string();
    }

    let token = load_token_file(&cli.token_file).await?;

    match cli.command {
        SyncCommand::Whoami => match token {
            Some(token) => {
                let claims = token.claims()?;
                println!("User:    {}", claims.user_id().unwrap_or("<unknown>"));
                println!("Role:    {}", claims.role.as_deref().unwrap_or("<none>"));
                println!("Landing: {}", claims.landing_route());
                if token.is_expired_at(chrono::Utc::now().timestamp()) {
                    println!("Token has expired");
                }
            }
            None => println!("Not signed in ({} not found)", cli.token_file.display()),
        },

        SyncCommand::Unread => {
            let token = require_token(token)?;
            let api = HttpMessagesApi::new(&config)?;
            let counts = api.unread_counts(&token).await?;
            print_snapshot(&MessageSnapshot {
                unread_counts: counts,
                ..MessageSnapshot::default()
            });
        }

        SyncCommand::MarkRead { peer } => {
            let token = require_token(token)?;
            let api = HttpMessagesApi::new(&config)?;
            api.mark_read(&token, &peer)
                .await
                .with_context(|| format!("Failed to mark messages from {} as read", peer))?;
            println!("✓ Messages from {} marked as read", peer);
        }

        SyncCommand::Watch { active, rooms } => {
            let session = SessionStore::new();
            if let Some(token) = token {
                session.sign_in(token);
            }
            if session.current().is_none() {
                println!("Not signed in; nothing to watch");
                return Ok(());
            }

            let handle = messaging::connect(&config, session)?;
            handle.set_active_conversation(active.as_deref()).await;

            let mut updates = handle.subscribe();
            let mut was_connected = false;
            loop {
                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = updates.borrow_and_update().clone();
                        if snapshot.connected && !was_connected {
                            app_log!(info, "Channel up, joining {} room(s)", rooms.len());
                            for room in &rooms {
                                handle.join_user_room(room).await;
                            }
                        }
                        was_connected = snapshot.connected;
                        print_snapshot(&snapshot);
                    }
                    _ = tokio::signal::ctrl_c() => {
                        app_log!(info, "Interrupted, shutting down");
                        break;
                    }
                }
            }
            handle.shutdown().await;
        }
    }

    Ok(())
}

fn require_token(token: Option<SessionToken>) -> Result<SessionToken> {
    token.ok_or_else(|| anyhow::anyhow!("Not signed in: no session token found"))
}

fn print_snapshot(snapshot: &MessageSnapshot) {
    let mut peers: Vec<_> = snapshot.unread_counts.iter().collect();
    peers.sort();

    println!(
        "── {} conversation(s) with unread messages{}",
        snapshot.peers_with_unread(),
        if snapshot.unread_loading { " (loading)" } else { "" }
    );
    for (peer, count) in peers {
        if let Some(badge) = badge_label(*count) {
            let typing = if snapshot.is_typing(peer) { "  ✎ typing" } else { "" };
            println!("   {:<24} {:>3}{}", peer, badge, typing);
        }
    }
    for (peer, typing) in &snapshot.typing_users {
        if *typing && snapshot.unread_for(peer) == 0 {
            println!("   {:<24}   -  ✎ typing", peer);
        }
    }
}
