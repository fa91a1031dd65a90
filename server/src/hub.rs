//! Process-wide connection registry and inbound dispatcher.
//!
//! One control task owns all structural mutation of the three maps
//! (connections, game → connection, connection → games); event-bus
//! callbacks only read them. Everything routed to one connection goes
//! through that connection's single ordered outbound queue, which is what
//! restores per-client ordering on top of the unordered bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chess::TimeControl;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::connection::ConnectionHandle;
use crate::events::{Event, EventPayload, EventType, Publisher};
use crate::messages::{
    ConnectedPayload, CreateSessionPayload, ErrorPayload, InboundMessage, MakeMovePayload,
    OutboundMessage,
};
use crate::session::{CreateSessionParams, SessionManager};

const CONTROL_BUFFER: usize = 16;
const INBOUND_BUFFER: usize = 64;

/// A decoded client frame tagged with its origin.
pub struct InboundFrame {
    pub connection_id: Uuid,
    pub message: InboundMessage,
}

struct RegisterRequest {
    handle: ConnectionHandle,
    ack: oneshot::Sender<()>,
}

#[derive(Default)]
struct HubMaps {
    connections: HashMap<Uuid, ConnectionHandle>,
    game_connections: HashMap<Uuid, Uuid>,
    conn_games: HashMap<Uuid, Vec<Uuid>>,
}

struct HubChannels {
    register_rx: mpsc::Receiver<RegisterRequest>,
    unregister_rx: mpsc::Receiver<Uuid>,
    inbound_rx: mpsc::Receiver<InboundFrame>,
}

pub struct Hub {
    maps: RwLock<HubMaps>,
    register_tx: mpsc::Sender<RegisterRequest>,
    unregister_tx: mpsc::Sender<Uuid>,
    inbound_tx: mpsc::Sender<InboundFrame>,
    channels: Mutex<Option<HubChannels>>,
    manager: Arc<SessionManager>,
    publisher: Arc<Publisher>,
}

impl Hub {
    pub fn new(manager: Arc<SessionManager>, publisher: Arc<Publisher>) -> Arc<Self> {
        let (register_tx, register_rx) = mpsc::channel(CONTROL_BUFFER);
        let (unregister_tx, unregister_rx) = mpsc::channel(CONTROL_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);

        let hub = Arc::new(Self {
            maps: RwLock::new(HubMaps::default()),
            register_tx,
            unregister_tx,
            inbound_tx,
            channels: Mutex::new(Some(HubChannels {
                register_rx,
                unregister_rx,
                inbound_rx,
            })),
            manager,
            publisher,
        });
        hub.setup_event_handlers();
        hub
    }

    /// The control loop. Spawn exactly once; all structural map mutation
    /// happens here.
    pub async fn run(self: Arc<Self>) {
        let Some(mut channels) = self.channels.lock().unwrap().take() else {
            tracing::error!("hub control loop started twice");
            return;
        };
        loop {
            tokio::select! {
                Some(request) = channels.register_rx.recv() => {
                    self.register_connection(request).await;
                }
                Some(connection_id) = channels.unregister_rx.recv() => {
                    self.unregister_connection(connection_id);
                }
                Some(frame) = channels.inbound_rx.recv() => {
                    self.handle_inbound(frame).await;
                }
                else => break,
            }
        }
    }

    /// Registers a connection and waits until the control task has
    /// processed it, so the `CONNECTED` frame is enqueued before the
    /// caller starts reading client frames.
    pub async fn register(&self, handle: ConnectionHandle) {
        let (ack, acked) = oneshot::channel();
        if self
            .register_tx
            .send(RegisterRequest { handle, ack })
            .await
            .is_ok()
        {
            let _ = acked.await;
        }
    }

    pub async fn unregister(&self, connection_id: Uuid) {
        let _ = self.unregister_tx.send(connection_id).await;
    }

    /// Sender half used by connection readers.
    pub fn inbound_sender(&self) -> mpsc::Sender<InboundFrame> {
        self.inbound_tx.clone()
    }

    async fn register_connection(&self, request: RegisterRequest) {
        let connection_id = request.handle.id();
        let total = {
            let mut maps = self.maps.write().unwrap();
            maps.connections.insert(connection_id, request.handle);
            maps.connections.len()
        };
        tracing::info!(
            connection_id = %connection_id,
            total_connections = total,
            "new connection registered"
        );

        self.send_to_connection(
            connection_id,
            OutboundMessage::Connected(ConnectedPayload { connection_id }),
        )
        .await;
        let _ = request.ack.send(());
    }

    fn unregister_connection(&self, connection_id: Uuid) {
        let total = {
            let mut maps = self.maps.write().unwrap();
            if maps.connections.remove(&connection_id).is_none() {
                return;
            }
            if let Some(games) = maps.conn_games.remove(&connection_id) {
                for game_id in games {
                    maps.game_connections.remove(&game_id);
                    tracing::info!(
                        game_id = %game_id,
                        connection_id = %connection_id,
                        "removed game association"
                    );
                }
            }
            maps.connections.len()
        };
        tracing::info!(
            connection_id = %connection_id,
            total_connections = total,
            "connection unregistered"
        );

        self.publisher.publish(Event {
            event_type: EventType::ConnectionClosed,
            game_id: None,
            payload: EventPayload::ConnectionClosed { connection_id },
        });
    }

    fn associate_game(&self, connection_id: Uuid, game_id: Uuid) {
        let mut maps = self.maps.write().unwrap();
        maps.game_connections.insert(game_id, connection_id);
        maps.conn_games.entry(connection_id).or_default().push(game_id);
        tracing::info!(
            connection_id = %connection_id,
            game_id = %game_id,
            "associated connection with game"
        );
    }

    async fn handle_inbound(&self, frame: InboundFrame) {
        let InboundFrame {
            connection_id,
            message,
        } = frame;
        match message.event.as_str() {
            "CREATE_SESSION" => {
                self.handle_create_session(connection_id, message.payload)
                    .await;
            }
            "MAKE_MOVE" => {
                self.handle_make_move(connection_id, message.payload).await;
            }
            other => {
                tracing::warn!(event = other, "unknown message type");
                self.send_error(connection_id, "Unknown message type").await;
            }
        }
    }

    async fn handle_create_session(&self, connection_id: Uuid, payload: serde_json::Value) {
        let payload: CreateSessionPayload = match serde_json::from_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "invalid CREATE_SESSION payload");
                self.send_error(connection_id, "Invalid CREATE_SESSION payload")
                    .await;
                return;
            }
        };

        let time_control = TimeControl::increment(
            payload.time_control.white_time,
            payload.time_control.black_time,
            payload.time_control.white_increment,
            payload.time_control.black_increment,
        );
        let result = self
            .manager
            .create_session(CreateSessionParams {
                time_control,
                player_color: payload.color,
                initial_fen: payload.initial_fen,
                connection_id,
            })
            .await;

        match result {
            Ok(session) => {
                // Bind before going live so the GAME_CREATED subscriber
                // (and every event after it) can find the connection.
                self.associate_game(connection_id, session.id());
                self.manager.activate(&session);
                tracing::info!(game_id = %session.id(), "game session created");
            }
            Err(e) => {
                tracing::error!(error = %e, "error creating game session");
                self.send_error(connection_id, &e.to_string()).await;
            }
        }
    }

    async fn handle_make_move(&self, connection_id: Uuid, payload: serde_json::Value) {
        let payload: MakeMovePayload = match serde_json::from_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "invalid MAKE_MOVE payload");
                self.send_error(connection_id, "Invalid MAKE_MOVE payload")
                    .await;
                return;
            }
        };

        let session = match self.manager.get_session(payload.game_id) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(game_id = %payload.game_id, "move for unknown game");
                self.send_error(connection_id, &e.to_string()).await;
                return;
            }
        };

        if let Err(e) = session.process_move(&payload.mv) {
            tracing::warn!(game_id = %session.id(), error = %e, "could not process move");
            self.send_error(connection_id, &e.to_string()).await;
            return;
        }

        // The engine reply runs on its own task so the hub stays
        // responsive while the engine thinks.
        tokio::spawn(async move {
            if let Err(e) = session.process_engine_move().await {
                tracing::error!(game_id = %session.id(), error = %e, "engine move failed");
            }
        });
    }

    fn setup_event_handlers(self: &Arc<Self>) {
        for event_type in [
            EventType::GameCreated,
            EventType::EngineMoved,
            EventType::ClockUpdated,
            EventType::TimeUp,
            EventType::GameOver,
        ] {
            self.forward_to_owner(event_type);
        }
    }

    /// Subscribes a bus topic whose events are relayed to the connection
    /// owning the event's game. A missing association is logged and the
    /// event dropped; the connection may simply have closed already.
    fn forward_to_owner(self: &Arc<Self>, event_type: EventType) {
        let weak = Arc::downgrade(self);
        self.publisher.subscribe(event_type, move |event| {
            let weak = weak.clone();
            async move {
                let Some(hub) = weak.upgrade() else { return };
                let Some(game_id) = event.game_id else {
                    tracing::error!(event_type = ?event.event_type, "event missing game id");
                    return;
                };
                let Some(message) = outbound_for(event.payload) else {
                    tracing::error!(event_type = ?event.event_type, "unexpected event payload");
                    return;
                };
                hub.send_to_game(game_id, message).await;
            }
        });
    }

    async fn send_to_game(&self, game_id: Uuid, message: OutboundMessage) {
        let connection_id = {
            self.maps
                .read()
                .unwrap()
                .game_connections
                .get(&game_id)
                .copied()
        };
        let Some(connection_id) = connection_id else {
            tracing::debug!(game_id = %game_id, "no connection for game, dropping event");
            return;
        };
        self.send_to_connection(connection_id, message).await;
    }

    async fn send_to_connection(&self, connection_id: Uuid, message: OutboundMessage) {
        let handle = {
            self.maps
                .read()
                .unwrap()
                .connections
                .get(&connection_id)
                .cloned()
        };
        let Some(handle) = handle else {
            tracing::debug!(connection_id = %connection_id, "connection gone, dropping frame");
            return;
        };
        if !handle.send_json(&message).await {
            // Sustained backpressure: give up on the client. try_send
            // keeps this safe to call from the control task itself.
            tracing::warn!(connection_id = %connection_id, "outbound queue full, dropping connection");
            let _ = self.unregister_tx.try_send(connection_id);
        }
    }

    async fn send_error(&self, connection_id: Uuid, message: &str) {
        self.send_to_connection(
            connection_id,
            OutboundMessage::Error(ErrorPayload {
                message: message.to_string(),
            }),
        )
        .await;
    }
}

fn outbound_for(payload: EventPayload) -> Option<OutboundMessage> {
    match payload {
        EventPayload::GameCreated(p) => Some(OutboundMessage::GameCreated(p)),
        EventPayload::EngineMove(p) => Some(OutboundMessage::EngineMove(p)),
        EventPayload::ClockUpdate(p) => Some(OutboundMessage::ClockUpdate(p)),
        EventPayload::TimeUp(p) => Some(OutboundMessage::TimeUp(p)),
        EventPayload::GameOver(p) => Some(OutboundMessage::GameOver(p)),
        _ => None,
    }
}
