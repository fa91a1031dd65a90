//! Messages sent to clients, wrapped in the `{"event", "payload"}`
//! envelope. Field casing below is the wire contract; colors are always
//! the single characters `w` / `b`.

use chess::Color;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum OutboundMessage {
    #[serde(rename = "CONNECTED")]
    Connected(ConnectedPayload),
    #[serde(rename = "GAME_CREATED")]
    GameCreated(GameCreatedPayload),
    #[serde(rename = "ENGINE_MOVE")]
    EngineMove(EngineMovePayload),
    #[serde(rename = "CLOCK_UPDATE")]
    ClockUpdate(ClockUpdatePayload),
    #[serde(rename = "TIME_UP")]
    TimeUp(TimeUpPayload),
    #[serde(rename = "GAME_OVER")]
    GameOver(GameOverPayload),
    #[serde(rename = "ERROR")]
    Error(ErrorPayload),
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectedPayload {
    pub connection_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameCreatedPayload {
    pub game_id: Uuid,
    pub initial_fen: String,
    pub white_time: u64,
    pub black_time: u64,
    pub current_turn: Color,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineMovePayload {
    #[serde(rename = "move")]
    pub mv: String,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockUpdatePayload {
    pub game_id: Uuid,
    pub white_time_ms: u64,
    pub black_time_ms: u64,
    pub active_color: Color,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeUpPayload {
    pub color: Color,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameOverPayload {
    #[serde(rename = "gameId")]
    pub game_id: Uuid,
    pub reason: String,
    pub result: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Full game-state snapshot published after each processed move. Internal
/// to the event bus today; no outbound frame carries it.
#[derive(Debug, Clone, Serialize)]
pub struct GameStatePayload {
    pub game_id: Uuid,
    pub board_fen: String,
    pub white_time: u64,
    pub black_time: u64,
    pub current_turn: Color,
    pub is_checkmate: bool,
    pub is_draw: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let msg = OutboundMessage::Connected(ConnectedPayload {
            connection_id: Uuid::nil(),
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], "CONNECTED");
        assert_eq!(
            value["payload"]["connection_id"],
            "00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_clock_update_field_casing() {
        let msg = OutboundMessage::ClockUpdate(ClockUpdatePayload {
            game_id: Uuid::nil(),
            white_time_ms: 1_500,
            black_time_ms: 900,
            active_color: Color::Black,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], "CLOCK_UPDATE");
        let payload = &value["payload"];
        assert_eq!(payload["whiteTimeMs"], 1_500);
        assert_eq!(payload["blackTimeMs"], 900);
        assert_eq!(payload["activeColor"], "b");
        assert!(payload["gameId"].is_string());
    }

    #[test]
    fn test_engine_move_uses_move_key() {
        let msg = OutboundMessage::EngineMove(EngineMovePayload {
            mv: "e7e5".into(),
            color: Color::White,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["payload"]["move"], "e7e5");
        assert_eq!(value["payload"]["color"], "w");
    }

    #[test]
    fn test_game_over_payload() {
        let msg = OutboundMessage::GameOver(GameOverPayload {
            game_id: Uuid::nil(),
            reason: "timeout".into(),
            result: "0-1".into(),
            description: "Black wins on time".into(),
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["payload"]["gameId"].as_str().unwrap().len(), 36);
        assert_eq!(value["payload"]["result"], "0-1");
    }
}
