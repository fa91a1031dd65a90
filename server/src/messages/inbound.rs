//! Messages arriving from clients.

use chess::Color;
use serde::Deserialize;
use uuid::Uuid;

/// Generic envelope for client frames. The `event` field selects the
/// action; `payload` is decoded further by the hub per event.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Payload of `CREATE_SESSION`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionPayload {
    pub time_control: TimeControlPayload,
    pub color: Color,
    #[serde(default)]
    pub initial_fen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeControlPayload {
    pub white_time: u64,
    pub black_time: u64,
    #[serde(default)]
    pub white_increment: u64,
    #[serde(default)]
    pub black_increment: u64,
}

/// Payload of `MAKE_MOVE`.
#[derive(Debug, Clone, Deserialize)]
pub struct MakeMovePayload {
    pub game_id: Uuid,
    #[serde(rename = "move")]
    pub mv: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_create_session() {
        let frame = r#"{"event":"CREATE_SESSION","payload":{
            "time_control":{"white_time":300000,"black_time":300000,
                            "white_increment":2000,"black_increment":2000},
            "color":"w","initial_fen":""}}"#;
        let msg: InboundMessage = serde_json::from_str(frame).unwrap();
        assert_eq!(msg.event, "CREATE_SESSION");

        let payload: CreateSessionPayload = serde_json::from_value(msg.payload).unwrap();
        assert_eq!(payload.time_control.white_time, 300_000);
        assert_eq!(payload.time_control.black_increment, 2_000);
        assert_eq!(payload.color, Color::White);
        assert_eq!(payload.initial_fen, "");
    }

    #[test]
    fn test_decode_make_move() {
        let frame = r#"{"event":"MAKE_MOVE","payload":{
            "game_id":"00000000-0000-0000-0000-000000000000","move":"e2e4"}}"#;
        let msg: InboundMessage = serde_json::from_str(frame).unwrap();
        let payload: MakeMovePayload = serde_json::from_value(msg.payload).unwrap();
        assert_eq!(payload.mv, "e2e4");
        assert!(payload.game_id.is_nil());
    }

    #[test]
    fn test_envelope_with_non_object_payload_still_parses() {
        // The outer envelope accepts any payload; per-event decoding is
        // where a string instead of an object gets rejected.
        let msg: InboundMessage =
            serde_json::from_str(r#"{"event":"CREATE_SESSION","payload":"not-an-object"}"#)
                .unwrap();
        assert!(serde_json::from_value::<CreateSessionPayload>(msg.payload).is_err());
    }

    #[test]
    fn test_missing_payload_defaults_to_null() {
        let msg: InboundMessage = serde_json::from_str(r#"{"event":"PING"}"#).unwrap();
        assert!(msg.payload.is_null());
    }
}
