//! The session event loop.
//!
//! A single task owns the room and the [`SessionState`]; it multiplexes
//! application commands and room events and runs each to completion before
//! taking the next.
use tokio::sync::{mpsc, oneshot};
use tome_transport::{Room, RoomEvent};

use super::effect::SessionEffect;
use super::executor::execute_effects;
use super::state::SessionState;
use super::SessionCommand;

pub(super) async fn session_loop<R: Room>(
    mut room: R,
    mut state: SessionState,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
) {
    loop {
        tokio::select! {
            biased;

            // ── 1. Commands from the application ──────────────────
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    tracing::debug!(local = %state.local_id(), "all handles dropped, leaving");
                    close(&mut room, &mut state).await;
                    break;
                };
                match handle_command(&mut state, cmd) {
                    Step::Effects(effects) => execute_effects(effects, &room).await,
                    Step::Quit(reply) => {
                        let abandoned = close(&mut room, &mut state).await;
                        let _ = reply.send(abandoned);
                        break;
                    }
                }
            }

            // ── 2. Room events ────────────────────────────────────
            event = room.next_event() => {
                let effects = match event {
                    Ok(RoomEvent::PeerJoin(peer)) => state.handle_peer_join(peer),
                    Ok(RoomEvent::PeerLeave(peer)) => state.handle_peer_leave(peer),
                    Ok(RoomEvent::Message { from, data }) => state.handle_incoming(from, &data),
                    Err(e) => {
                        tracing::warn!(local = %state.local_id(), "room closed: {e}");
                        state.shutdown();
                        break;
                    }
                };
                execute_effects(effects, &room).await;
            }
        }
    }
    tracing::debug!(local = %state.local_id(), "session loop stopped");
}

/// What the loop does after a command.
enum Step {
    Effects(Vec<SessionEffect>),
    Quit(oneshot::Sender<usize>),
}

fn handle_command(state: &mut SessionState, cmd: SessionCommand) -> Step {
    let effects = match cmd {
        SessionCommand::Send {
            msg_type,
            data,
            addressing,
            reply,
        } => match state.handle_send(&msg_type, data, addressing) {
            Ok(effects) => {
                let _ = reply.send(Ok(()));
                effects
            }
            Err(e) => {
                let _ = reply.send(Err(e));
                Vec::new()
            }
        },
        SessionCommand::Request {
            msg_type,
            data,
            addressing,
            reply,
        } => state.handle_request(&msg_type, data, addressing, reply),
        SessionCommand::Broadcast {
            msg_type,
            data,
            audience,
            reply,
        } => match state.handle_broadcast(&msg_type, data, &audience) {
            Ok(effects) => {
                let _ = reply.send(Ok(()));
                effects
            }
            Err(e) => {
                let _ = reply.send(Err(e));
                Vec::new()
            }
        },
        SessionCommand::Subscribe { msg_type, listener } => {
            state.subscribe(msg_type, listener);
            Vec::new()
        }
        SessionCommand::HubId { reply } => {
            let _ = reply.send(state.membership().hub_id().cloned());
            Vec::new()
        }
        SessionCommand::Members { reply } => {
            let _ = reply.send(state.membership().members().cloned().collect());
            Vec::new()
        }
        SessionCommand::PendingRequests { reply } => {
            let _ = reply.send(state.requests().len());
            Vec::new()
        }
        SessionCommand::Quit { reply } => return Step::Quit(reply),
    };
    Step::Effects(effects)
}

/// Reject what is pending, then leave the room.
async fn close<R: Room>(room: &mut R, state: &mut SessionState) -> usize {
    let abandoned = state.shutdown();
    if let Err(e) = room.leave().await {
        tracing::warn!(local = %state.local_id(), "leave failed: {e}");
    }
    tracing::info!(local = %state.local_id(), abandoned, "session closed");
    abandoned
}
