//! Client orchestrator: resolves the session to open, wires the controller,
//! and runs the terminal event loop.

use std::sync::Arc;

use quoridor_client::api::{HttpSessionClient, SessionApi};
use quoridor_client::chat::{ChatChannelLifecycle, ChatProvider, MemoryChatProvider, RestChatProvider};
use quoridor_client::config::ClientConfig;
use quoridor_client::controller::{SessionController, SubmitError};
use quoridor_client::push::PushClient;
use quoridor_client::store::SessionSnapshot;
use quoridor_client::sync::SyncEvent;
use quoridor_core::protocol::{CreateSession, MoveKind, ParticipantId, SessionId};
use quoridor_core::turn::Winner;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::warn;

use crate::Cli;
use crate::command::{Command, HELP, parse_command};

type BoxError = Box<dyn std::error::Error>;

/// Start the client: pick the chat backend from `config`, then run.
pub async fn start_client(cli: &Cli, config: ClientConfig) -> Result<(), BoxError> {
    match config.chat_url.clone() {
        Some(url) => run(cli, config, RestChatProvider::new(url)).await,
        None => run(cli, config, MemoryChatProvider::new()).await,
    }
}

async fn run<P: ChatProvider>(cli: &Cli, config: ClientConfig, provider: P) -> Result<(), BoxError> {
    let api = Arc::new(HttpSessionClient::new(&config)?);
    let chat = Arc::new(ChatChannelLifecycle::new(provider));
    let local = ParticipantId::new(cli.player.clone());

    if cli.list {
        for session in api.list_sessions().await? {
            println!(
                "{}  {:<17} created by {}",
                session.id,
                session.status.label(),
                session.creator.display_name()
            );
        }
        return Ok(());
    }

    let session_id = if cli.create {
        let request = CreateSession {
            board_size: cli.board_size,
        };
        let session = SessionController::create_session(&*api, &*chat, request).await?;
        println!("Created session {} (share this ID with your opponent)", session.id);
        session.id
    } else {
        let raw = cli.session.as_deref().ok_or("--session is required unless --create is given")?;
        let id = SessionId::parse(raw)?;
        if cli.join {
            api.join_session(&id).await?;
            println!("Joined session {id}");
        }
        id
    };

    let push = match &config.push_url {
        Some(url) => match PushClient::connect_ws(url, session_id.clone()).await {
            Ok(push) => Some(push),
            Err(e) => {
                warn!(error = %e, "push channel unavailable, polling only");
                None
            }
        },
        None => None,
    };

    let mut ctrl = SessionController::open(
        api,
        chat,
        session_id,
        local,
        config.poll_interval,
        push,
    );
    println!("{HELP}");
    let result = run_event_loop(&mut ctrl).await;
    ctrl.close();
    result
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

async fn run_event_loop<A: SessionApi, P: ChatProvider>(
    ctrl: &mut SessionController<A, P>,
) -> Result<(), BoxError> {
    let mut snapshots = ctrl.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // The first load may land before the subscription; show whatever is there.
    let (view, ended) = latest_view(&mut snapshots, ctrl.local());
    println!("{view}");
    if ended {
        return Ok(());
    }

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let (view, ended) = latest_view(&mut snapshots, ctrl.local());
                println!("{view}");
                if ended {
                    break;
                }
            }

            event = ctrl.next_event() => {
                match event {
                    Some(SyncEvent::SessionGone) => {
                        println!("The session no longer exists.");
                        break;
                    }
                    Some(SyncEvent::Transient(e)) => {
                        warn!(error = %e, "refresh failed, will retry");
                    }
                    Some(SyncEvent::PushLost(reason)) => {
                        warn!(%reason, "push channel lost, polling only");
                    }
                    Some(SyncEvent::Refreshed(_)) => {}
                    None => break,
                }
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(Command::Help) => println!("{HELP}"),
                    Ok(Command::Refresh) => {
                        ctrl.refresh();
                    }
                    Ok(Command::Abort) => {
                        ctrl.abort().await?;
                        println!("Game aborted.");
                        break;
                    }
                    Ok(Command::Move(to)) => {
                        let Some(from) = ctrl.snapshot().board.pawn_of(ctrl.local()).map(|p| p.position) else {
                            println!("Your pawn is not on the board yet.");
                            continue;
                        };
                        report(ctrl.submit(MoveKind::MovePawn { from, to }).await);
                    }
                    Ok(Command::Wall(anchor, orientation)) => {
                        report(ctrl.submit(MoveKind::PlaceWall { anchor, orientation }).await);
                    }
                    Err(msg) => println!("{msg}"),
                }
            }
        }
    }

    Ok(())
}

/// Mark the current snapshot seen and render it.
fn latest_view(snapshots: &mut watch::Receiver<SessionSnapshot>, local: &ParticipantId) -> (String, bool) {
    let snapshot = snapshots.borrow_and_update().clone();
    (describe(&snapshot, local), snapshot.is_ended())
}

fn report<T>(result: Result<T, SubmitError>) {
    match result {
        Ok(_) => println!("Move sent."),
        Err(SubmitError::Rejected(reason)) => println!("Not sent: {reason}."),
        Err(SubmitError::Api(e)) => println!("The server refused the move: {e}"),
    }
}

/// One status block for the terminal.
fn describe(snapshot: &SessionSnapshot, local: &ParticipantId) -> String {
    let Some(session) = &snapshot.session else {
        return "Loading session...".to_string();
    };
    let mut out = format!("[{}] {}", session.id, session.status.label());
    if !session.has_participant(local) {
        out.push_str(" (spectating)");
    }

    match snapshot.winner(local) {
        Some(Winner::Local) => out.push_str(" - you won!"),
        Some(Winner::Opponent(id)) => out.push_str(&format!(" - {id} won")),
        Some(Winner::Unknown) => out.push_str(" - winner unknown"),
        None if session.is_running() => {
            if snapshot.is_turn_of(local) {
                out.push_str(" - your turn");
            } else {
                out.push_str(" - waiting for opponent");
            }
        }
        None => {}
    }

    for pawn in &snapshot.board.pawns {
        let who = if pawn.owner == *local { "you" } else { pawn.owner.as_str() };
        out.push_str(&format!("\n  pawn {who} at {}", pawn.position));
    }
    out.push_str(&format!(
        "\n  walls placed: {}, you have {} left",
        snapshot.board.walls.len(),
        snapshot.walls_remaining(local)
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoridor_client::store::GameSessionStore;
    use quoridor_core::protocol::{Coord, Participant, Pawn, Session, SessionStatus};

    fn snapshot(status: SessionStatus, turn: &str) -> SessionSnapshot {
        let store = GameSessionStore::new();
        store.replace(
            Session {
                id: SessionId::parse("g1").unwrap(),
                status,
                creator: Participant::new("1"),
                current_turn: Some(Participant::new(turn)),
                players: vec![Participant::new("1"), Participant::new("2")],
                board_size: 9,
                winner: None,
            },
            vec![Pawn {
                owner: "1".into(),
                position: Coord::new(0, 8),
                color: "red".into(),
            }],
            Vec::new(),
        );
        store.snapshot()
    }

    #[test]
    fn describes_turn_and_board() {
        let text = describe(&snapshot(SessionStatus::Running, "1"), &"1".into());
        assert!(text.contains("your turn"));
        assert!(text.contains("pawn you at (0, 8)"));
        assert!(text.contains("you have 10 left"));

        let text = describe(&snapshot(SessionStatus::Running, "1"), &"2".into());
        assert!(text.contains("waiting for opponent"));
    }

    #[test]
    fn describes_the_outcome() {
        let text = describe(&snapshot(SessionStatus::Ended, "2"), &"1".into());
        assert!(text.contains("you won"));
        let text = describe(&snapshot(SessionStatus::Ended, "2"), &"2".into());
        assert!(text.contains("1 won"));
    }

    #[test]
    fn outsiders_are_spectating() {
        let text = describe(&snapshot(SessionStatus::Running, "1"), &"7".into());
        assert!(text.contains("(spectating)"));
        let text = describe(&snapshot(SessionStatus::Running, "1"), &"2".into());
        assert!(!text.contains("spectating"));
    }

    #[test]
    fn late_subscriber_still_sees_the_loaded_session() {
        let store = GameSessionStore::new();
        let loaded = snapshot(SessionStatus::Running, "1");
        let session = loaded.session.clone().unwrap();
        store.replace(session, loaded.board.pawns.clone(), Vec::new());

        // Subscribed after the load: no change is pending, but the view is current.
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());
        let (view, ended) = latest_view(&mut rx, &"1".into());
        assert!(view.contains("your turn"));
        assert!(!ended);
    }

    #[test]
    fn empty_store_is_loading() {
        let text = describe(&SessionSnapshot::default(), &"1".into());
        assert_eq!(text, "Loading session...");
    }
}
