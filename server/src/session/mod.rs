pub mod game;

use std::sync::Arc;

use chess::{Clock, Color, Position, PositionError, TimeControl};
use engine::{EngineError, EnginePool, PoolError};
use uuid::Uuid;

use crate::events::{Event, EventPayload, EventType, Publisher};
use crate::messages::GameCreatedPayload;
use crate::repository::{InMemoryRepository, RepositoryError};
pub use game::{Session, SessionStatus};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("game is already over")]
    GameOver,
    #[error("engine stopped before producing a move")]
    EngineStalled,
}

pub struct CreateSessionParams {
    pub time_control: TimeControl,
    pub player_color: Color,
    pub initial_fen: String,
    pub connection_id: Uuid,
}

/// Creates sessions, tracks them through the repository, and cleans up
/// when their owning connection goes away.
pub struct SessionManager {
    repository: Arc<InMemoryRepository>,
    pool: Arc<EnginePool>,
    publisher: Arc<Publisher>,
}

impl SessionManager {
    pub fn new(
        repository: Arc<InMemoryRepository>,
        pool: Arc<EnginePool>,
        publisher: Arc<Publisher>,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            repository,
            pool,
            publisher,
        });
        manager.setup_event_handlers();
        manager
    }

    fn setup_event_handlers(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.publisher
            .subscribe(EventType::ConnectionClosed, move |event| {
                let weak = weak.clone();
                async move {
                    let Some(manager) = weak.upgrade() else { return };
                    let EventPayload::ConnectionClosed { connection_id } = event.payload else {
                        tracing::error!("unexpected payload on CONNECTION_CLOSED");
                        return;
                    };
                    manager.terminate_sessions_for_connection(connection_id);
                }
            });

        let weak = Arc::downgrade(self);
        self.publisher
            .subscribe(EventType::GameTerminated, move |event| {
                let weak = weak.clone();
                async move {
                    let Some(manager) = weak.upgrade() else { return };
                    let Some(game_id) = event.game_id else { return };
                    manager.repository.remove(game_id);
                    tracing::info!(game_id = %game_id, "removed game session");
                }
            });
    }

    /// Leases an engine (bounded by the pool's checkout timeout), builds
    /// the session, and saves it. The session is returned pending and
    /// stopped; the hub binds it to its connection before `activate`.
    pub async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<Arc<Session>, SessionError> {
        let engine = self.pool.checkout().await?;

        let position = match Position::new(&params.initial_fen) {
            Ok(position) => position,
            Err(e) => {
                // The lease must not leak when the FEN is bad.
                self.pool.give_back(engine.id());
                return Err(e.into());
            }
        };

        let game_id = Uuid::new_v4();
        let clock = Clock::new(params.time_control, position.side_to_move());
        let session = Session::new(
            game_id,
            params.connection_id,
            params.player_color,
            position,
            clock,
            engine,
            Arc::clone(&self.pool),
            Arc::clone(&self.publisher),
        );
        self.repository.save(Arc::clone(&session));

        tracing::info!(
            game_id = %game_id,
            connection_id = %params.connection_id,
            "created new game session"
        );
        Ok(session)
    }

    /// Goes live: starts the clock and forwarders, announces the game, and
    /// kicks the engine when it owns the opening move.
    pub fn activate(&self, session: &Arc<Session>) {
        // Snapshot before the clock starts so the announced times are the
        // configured initial values, not already-ticking ones.
        let (white_time, black_time) = session.remaining_time();
        session.start();
        self.publisher.publish(Event {
            event_type: EventType::GameCreated,
            game_id: Some(session.id()),
            payload: EventPayload::GameCreated(GameCreatedPayload {
                game_id: session.id(),
                initial_fen: session.fen(),
                white_time,
                black_time,
                current_turn: session.current_turn(),
            }),
        });

        if session.engine_to_move() {
            let session = Arc::clone(session);
            tokio::spawn(async move {
                if let Err(e) = session.process_engine_move().await {
                    tracing::error!(game_id = %session.id(), error = %e, "engine opening move failed");
                }
            });
        }
    }

    pub fn get_session(&self, id: Uuid) -> Result<Arc<Session>, RepositoryError> {
        self.repository.get(id)
    }

    /// Terminates every unfinished session owned by a connection.
    pub fn terminate_sessions_for_connection(&self, connection_id: Uuid) {
        tracing::info!(connection_id = %connection_id, "terminating sessions for connection");
        for session in self.repository.list_active() {
            if session.connection_id() == connection_id {
                session.terminate();
            }
        }
    }
}
