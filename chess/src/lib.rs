pub mod clock;
pub mod color;
pub mod position;
pub mod uci;

pub use clock::{format_clock_time, Clock, ClockTick, TimeControl, TimingMethod};
pub use color::Color;
pub use position::{GameOutcome, Position, PositionError};
pub use uci::{convert_castling, format_uci_move, parse_uci_move};
