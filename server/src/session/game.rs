//! A single game session: position, clock, engine lease, and event
//! emission. The state machine runs pending → active → completed; a
//! session is owned by exactly one connection for its whole life.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chess::{Clock, Color, GameOutcome, Position};
use cozy_chess::GameStatus;
use engine::{EnginePool, UciEngine};
use tokio::sync::watch;
use uuid::Uuid;

use crate::events::{Event, EventPayload, EventType, Publisher};
use crate::messages::{EngineMovePayload, GameOverPayload, GameStatePayload, TimeUpPayload};
use crate::session::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Active,
    Completed,
}

struct GameState {
    position: Position,
    status: SessionStatus,
}

pub struct Session {
    id: Uuid,
    connection_id: Uuid,
    player_color: Color,
    engine: Arc<UciEngine>,
    pool: Arc<EnginePool>,
    clock: Clock,
    state: Mutex<GameState>,
    done_tx: watch::Sender<bool>,
    terminated: AtomicBool,
    publisher: Arc<Publisher>,
}

impl Session {
    pub(crate) fn new(
        id: Uuid,
        connection_id: Uuid,
        player_color: Color,
        position: Position,
        clock: Clock,
        engine: Arc<UciEngine>,
        pool: Arc<EnginePool>,
        publisher: Arc<Publisher>,
    ) -> Arc<Self> {
        let (done_tx, _) = watch::channel(false);
        Arc::new(Self {
            id,
            connection_id,
            player_color,
            engine,
            pool,
            clock,
            state: Mutex::new(GameState {
                position,
                status: SessionStatus::Pending,
            }),
            done_tx,
            terminated: AtomicBool::new(false),
            publisher,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn status(&self) -> SessionStatus {
        self.state.lock().unwrap().status
    }

    pub fn fen(&self) -> String {
        self.state.lock().unwrap().position.fen()
    }

    pub fn current_turn(&self) -> Color {
        self.state.lock().unwrap().position.side_to_move()
    }

    pub fn remaining_time(&self) -> (u64, u64) {
        self.clock.remaining()
    }

    /// Whether the engine owns the side currently to move.
    pub fn engine_to_move(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.status != SessionStatus::Completed
            && state.position.side_to_move() != self.player_color
    }

    /// Starts the clock and the two forwarder tasks. Called once when the
    /// session goes live.
    pub fn start(self: &Arc<Self>) {
        self.clock.start();
        self.start_clock_updates();
        self.start_timeout_monitor();
    }

    /// Validates and applies one move, switches the clock, and publishes
    /// the resulting state. The move is recorded in the position before
    /// the clock switches; a rejected move consumes no clock time and does
    /// not advance the turn. A terminal position publishes `GAME_OVER` and
    /// completes the session.
    pub fn process_move(&self, mv: &str) -> Result<(), SessionError> {
        let mut state = self.state.lock().unwrap();
        if state.status == SessionStatus::Completed {
            return Err(SessionError::GameOver);
        }

        state.position.push_uci(mv)?;
        self.clock.switch();
        if state.status == SessionStatus::Pending {
            state.status = SessionStatus::Active;
        }

        let (white_time, black_time) = self.clock.remaining();
        let status = state.position.status();
        let snapshot = GameStatePayload {
            game_id: self.id,
            board_fen: state.position.fen(),
            white_time,
            black_time,
            current_turn: state.position.side_to_move(),
            is_checkmate: status == GameStatus::Won,
            is_draw: status == GameStatus::Drawn,
        };
        let outcome = state.position.outcome();
        if outcome.is_some() {
            state.status = SessionStatus::Completed;
        }
        drop(state);

        tracing::info!(
            game_id = %self.id,
            mv,
            new_turn = %snapshot.current_turn,
            "processed move"
        );
        self.publisher.publish(Event {
            event_type: EventType::MoveProcessed,
            game_id: Some(self.id),
            payload: EventPayload::GameState(snapshot),
        });

        if let Some(outcome) = outcome {
            self.clock.stop();
            self.publish_game_over(outcome_reason(outcome), outcome.score(), outcome_text(outcome));
            self.terminate();
        }
        Ok(())
    }

    /// Asks the engine for its move in the current position and applies
    /// it. The state lock is released before blocking on the bestmove
    /// channel, so client moves and clock flags keep flowing while the
    /// engine thinks; the clock flag is the only bound on thinking time.
    pub async fn process_engine_move(&self) -> Result<(), SessionError> {
        let (fen, half_moves, mover) = {
            let state = self.state.lock().unwrap();
            if state.status == SessionStatus::Completed {
                return Ok(());
            }
            (
                state.position.fen(),
                state.position.move_count(),
                state.position.side_to_move(),
            )
        };
        let (white_ms, black_ms) = self.clock.remaining();

        self.engine.send_command(&format!("position fen {fen}")).await?;

        let movestogo = self
            .clock
            .moves_per_control()
            .saturating_sub((half_moves / 2) as u32)
            .max(1);
        self.engine
            .send_command(&format!(
                "go wtime {white_ms} btime {black_ms} movestogo {movestogo}"
            ))
            .await?;

        let mut done = self.done_tx.subscribe();
        let best = tokio::select! {
            _ = done.wait_for(|d| *d) => return Ok(()),
            best = self.engine.best_move() => best.ok_or(SessionError::EngineStalled)?,
        };

        self.process_move(&best)?;

        self.publisher.publish(Event {
            event_type: EventType::EngineMoved,
            game_id: Some(self.id),
            payload: EventPayload::EngineMove(EngineMovePayload {
                mv: best.clone(),
                color: mover,
            }),
        });
        tracing::info!(game_id = %self.id, mv = %best, "engine move processed");
        Ok(())
    }

    /// Forwards clock ticks onto the bus until the session is done.
    pub fn start_clock_updates(self: &Arc<Self>) {
        let Some(mut tick_rx) = self.clock.take_tick_rx() else {
            return;
        };
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut done = session.done_tx.subscribe();
            loop {
                tokio::select! {
                    _ = done.wait_for(|d| *d) => return,
                    tick = tick_rx.recv() => {
                        let Some(tick) = tick else { return };
                        session.publisher.publish(Event {
                            event_type: EventType::ClockUpdated,
                            game_id: Some(session.id),
                            payload: EventPayload::ClockUpdate(
                                crate::messages::ClockUpdatePayload {
                                    game_id: session.id,
                                    white_time_ms: tick.white_ms,
                                    black_time_ms: tick.black_ms,
                                    active_color: tick.active_color,
                                },
                            ),
                        });
                    }
                }
            }
        });
    }

    /// Waits for the clock flag and turns it into `TIME_UP` plus a
    /// `GAME_OVER`, then terminates the session.
    pub fn start_timeout_monitor(self: &Arc<Self>) {
        let Some(mut timeup_rx) = self.clock.take_timeup_rx() else {
            return;
        };
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut done = session.done_tx.subscribe();
            let color = tokio::select! {
                _ = done.wait_for(|d| *d) => return,
                color = timeup_rx.recv() => {
                    let Some(color) = color else { return };
                    color
                }
            };

            tracing::info!(game_id = %session.id, color = %color, "player time expired");
            session.publisher.publish(Event {
                event_type: EventType::TimeUp,
                game_id: Some(session.id),
                payload: EventPayload::TimeUp(TimeUpPayload { color }),
            });

            let winner = color.opp();
            let (result, description) = match winner {
                Color::White => ("1-0", "White wins on time"),
                Color::Black => ("0-1", "Black wins on time"),
            };
            {
                let mut state = session.state.lock().unwrap();
                state.status = SessionStatus::Completed;
            }
            session.publish_game_over("timeout", result, description);
            session.terminate();
        });
    }

    /// Ends the session: fires the done signal, returns the engine to the
    /// pool, and publishes `GAME_TERMINATED`. Safe to call any number of
    /// times; only the first call acts.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        self.clock.stop();
        let _ = self.done_tx.send(true);
        {
            let mut state = self.state.lock().unwrap();
            state.status = SessionStatus::Completed;
        }
        self.pool.give_back(self.engine.id());

        self.publisher.publish(Event {
            event_type: EventType::GameTerminated,
            game_id: Some(self.id),
            payload: EventPayload::GameTerminated { game_id: self.id },
        });
        tracing::info!(game_id = %self.id, "session terminated");
    }

    fn publish_game_over(&self, reason: &str, result: &str, description: &str) {
        self.publisher.publish(Event {
            event_type: EventType::GameOver,
            game_id: Some(self.id),
            payload: EventPayload::GameOver(GameOverPayload {
                game_id: self.id,
                reason: reason.to_string(),
                result: result.to_string(),
                description: description.to_string(),
            }),
        });
    }
}

fn outcome_reason(outcome: GameOutcome) -> &'static str {
    match outcome {
        GameOutcome::WhiteWins | GameOutcome::BlackWins => "checkmate",
        GameOutcome::Draw => "draw",
    }
}

fn outcome_text(outcome: GameOutcome) -> &'static str {
    match outcome {
        GameOutcome::WhiteWins => "White wins by checkmate",
        GameOutcome::BlackWins => "Black wins by checkmate",
        GameOutcome::Draw => "Draw",
    }
}
