pub mod inbound;
pub mod outbound;

pub use inbound::{CreateSessionPayload, InboundMessage, MakeMovePayload, TimeControlPayload};
pub use outbound::{
    ClockUpdatePayload, ConnectedPayload, EngineMovePayload, ErrorPayload, GameCreatedPayload,
    GameOverPayload, GameStatePayload, OutboundMessage, TimeUpPayload,
};
