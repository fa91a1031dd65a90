//! Dual-player chess clock.
//!
//! Time accounting is monotonic (`tokio::time::Instant`), never wall time.
//! A background ticker publishes a lossy snapshot stream every 100 ms while
//! the clock runs; when the active side's remaining time reaches zero the
//! clock stops itself and delivers the flagged color exactly once on a
//! single-slot channel.

use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};

use crate::Color;

const TICK_INTERVAL: Duration = Duration::from_millis(100);
const TICK_BUFFER: usize = 10;

/// How elapsed time and bonuses are accounted per move.
///
/// Only `Increment` is fully implemented; `Delay` and `Bronstein` are
/// accepted in configuration but currently behave like `Increment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimingMethod {
    #[default]
    Increment,
    Delay,
    Bronstein,
}

/// Time settings carried into a game session.
#[derive(Debug, Clone)]
pub struct TimeControl {
    pub white_time_ms: u64,
    pub black_time_ms: u64,
    pub white_increment_ms: u64,
    pub black_increment_ms: u64,
    pub moves_per_control: u32,
    pub timing_method: TimingMethod,
}

impl TimeControl {
    /// Standard increment control, 40 moves per control period.
    pub fn increment(
        white_time_ms: u64,
        black_time_ms: u64,
        white_increment_ms: u64,
        black_increment_ms: u64,
    ) -> Self {
        Self {
            white_time_ms,
            black_time_ms,
            white_increment_ms,
            black_increment_ms,
            moves_per_control: 40,
            timing_method: TimingMethod::Increment,
        }
    }
}

/// Snapshot of both clocks, emitted on the tick channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    pub white_ms: u64,
    pub black_ms: u64,
    pub active_color: Color,
}

struct ClockState {
    white_ms: i64,
    black_ms: i64,
    white_increment_ms: i64,
    black_increment_ms: i64,
    active_color: Color,
    timing_method: TimingMethod,
    moves_per_control: u32,
    move_count: u32,
    /// When the active side's countdown began; `None` while stopped.
    started_at: Option<Instant>,
    flagged: bool,
}

impl ClockState {
    /// Non-mutating snapshot of both remaining times, clamped at zero.
    fn remaining_pair(&self, now: Instant) -> (u64, u64) {
        let mut white = self.white_ms;
        let mut black = self.black_ms;
        if let Some(started) = self.started_at {
            let elapsed = now.duration_since(started).as_millis() as i64;
            match self.active_color {
                Color::White => white -= elapsed,
                Color::Black => black -= elapsed,
            }
        }
        (white.max(0) as u64, black.max(0) as u64)
    }

    /// Folds the elapsed time into the active side's stored remaining and
    /// restarts the countdown base. When the active side runs out, clamps to
    /// zero, stops the clock, and returns the flagged color (once only).
    fn settle(&mut self, now: Instant) -> Option<Color> {
        let Some(started) = self.started_at else {
            return None;
        };
        let elapsed = now.duration_since(started).as_millis() as i64;
        let stored = match self.active_color {
            Color::White => &mut self.white_ms,
            Color::Black => &mut self.black_ms,
        };
        *stored -= elapsed;
        self.started_at = Some(now);

        if *stored <= 0 {
            *stored = 0;
            self.started_at = None;
            if !self.flagged {
                self.flagged = true;
                return Some(self.active_color);
            }
        }
        None
    }
}

struct Shared {
    state: RwLock<ClockState>,
    tick_tx: mpsc::Sender<ClockTick>,
    timeup_tx: mpsc::Sender<Color>,
}

enum TickStep {
    Tick(ClockTick),
    Flag(Color),
    Stopped,
}

impl Shared {
    fn tick_once(&self, now: Instant) -> TickStep {
        let mut state = self.state.write().unwrap();
        if state.started_at.is_none() {
            return TickStep::Stopped;
        }
        let (white_ms, black_ms) = state.remaining_pair(now);
        let active_ms = match state.active_color {
            Color::White => white_ms,
            Color::Black => black_ms,
        };
        if active_ms == 0 {
            return match state.settle(now) {
                Some(color) => TickStep::Flag(color),
                None => TickStep::Stopped,
            };
        }
        TickStep::Tick(ClockTick {
            white_ms,
            black_ms,
            active_color: state.active_color,
        })
    }
}

/// Per-game clock for both players.
pub struct Clock {
    shared: Arc<Shared>,
    tick_rx: Mutex<Option<mpsc::Receiver<ClockTick>>>,
    timeup_rx: Mutex<Option<mpsc::Receiver<Color>>>,
}

impl Clock {
    /// Creates a stopped clock with `active` to move first.
    pub fn new(tc: TimeControl, active: Color) -> Self {
        let (tick_tx, tick_rx) = mpsc::channel(TICK_BUFFER);
        let (timeup_tx, timeup_rx) = mpsc::channel(1);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(ClockState {
                    white_ms: tc.white_time_ms as i64,
                    black_ms: tc.black_time_ms as i64,
                    white_increment_ms: tc.white_increment_ms as i64,
                    black_increment_ms: tc.black_increment_ms as i64,
                    active_color: active,
                    timing_method: tc.timing_method,
                    moves_per_control: tc.moves_per_control,
                    move_count: 0,
                    started_at: None,
                    flagged: false,
                }),
                tick_tx,
                timeup_tx,
            }),
            tick_rx: Mutex::new(Some(tick_rx)),
            timeup_rx: Mutex::new(Some(timeup_rx)),
        }
    }

    /// Starts the countdown for the active side and spawns the ticker.
    /// Idempotent on a running clock; a flagged clock never restarts.
    pub fn start(&self) {
        {
            let mut state = self.shared.state.write().unwrap();
            if state.started_at.is_some() || state.flagged {
                return;
            }
            state.started_at = Some(Instant::now());
        }
        self.spawn_ticker();
    }

    /// Settles elapsed time into the active side and stops the countdown.
    pub fn stop(&self) {
        let flagged = {
            let mut state = self.shared.state.write().unwrap();
            let flagged = state.settle(Instant::now());
            state.started_at = None;
            flagged
        };
        if let Some(color) = flagged {
            let _ = self.shared.timeup_tx.try_send(color);
        }
    }

    /// Settles elapsed time, credits the mover's increment, and flips the
    /// active color. The increment goes to the side that just moved, i.e.
    /// the active side before the flip. Restarts the countdown base when
    /// the clock is still running.
    pub fn switch(&self) {
        let flagged = {
            let mut state = self.shared.state.write().unwrap();
            let flagged = state.settle(Instant::now());

            match state.timing_method {
                // Delay and Bronstein degrade to increment accounting for now.
                TimingMethod::Increment | TimingMethod::Delay | TimingMethod::Bronstein => {
                    match state.active_color {
                        Color::White => state.white_ms += state.white_increment_ms,
                        Color::Black => state.black_ms += state.black_increment_ms,
                    }
                }
            }

            state.active_color = state.active_color.opp();
            if state.active_color == Color::White {
                state.move_count += 1;
            }
            flagged
        };
        if let Some(color) = flagged {
            let _ = self.shared.timeup_tx.try_send(color);
        }
    }

    /// Current remaining `(white_ms, black_ms)` without mutating state.
    pub fn remaining(&self) -> (u64, u64) {
        self.shared
            .state
            .read()
            .unwrap()
            .remaining_pair(Instant::now())
    }

    /// Whether the stored remaining for `color` has reached zero.
    pub fn is_time_up(&self, color: Color) -> bool {
        let state = self.shared.state.read().unwrap();
        match color {
            Color::White => state.white_ms <= 0,
            Color::Black => state.black_ms <= 0,
        }
    }

    pub fn active_color(&self) -> Color {
        self.shared.state.read().unwrap().active_color
    }

    pub fn move_count(&self) -> u32 {
        self.shared.state.read().unwrap().move_count
    }

    pub fn moves_per_control(&self) -> u32 {
        self.shared.state.read().unwrap().moves_per_control
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.read().unwrap().started_at.is_some()
    }

    /// Takes the tick stream. Single consumer; returns `None` after the
    /// first call.
    pub fn take_tick_rx(&self) -> Option<mpsc::Receiver<ClockTick>> {
        self.tick_rx.lock().unwrap().take()
    }

    /// Takes the single-slot flag stream. Single consumer; at most one
    /// color is ever delivered per clock.
    pub fn take_timeup_rx(&self) -> Option<mpsc::Receiver<Color>> {
        self.timeup_rx.lock().unwrap().take()
    }

    fn spawn_ticker(&self) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match shared.tick_once(Instant::now()) {
                    TickStep::Tick(tick) => {
                        // Lossy: a slow consumer drops ticks, never queues them.
                        let _ = shared.tick_tx.try_send(tick);
                    }
                    TickStep::Flag(color) => {
                        let _ = shared.timeup_tx.try_send(color);
                        return;
                    }
                    TickStep::Stopped => return,
                }
            }
        });
    }
}

/// Formats milliseconds for display: `"4:05"`, or `"7.3"` under ten seconds.
pub fn format_clock_time(time_ms: i64) -> String {
    let time_ms = time_ms.max(0);
    let total_seconds = time_ms / 1000;

    if time_ms < 10_000 {
        let tenths = (time_ms % 1000) / 100;
        return format!("{total_seconds}.{tenths}");
    }

    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(white_ms: u64, black_ms: u64, inc_ms: u64) -> TimeControl {
        TimeControl::increment(white_ms, black_ms, inc_ms, inc_ms)
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_tracks_elapsed_for_active_side_only() {
        let clock = Clock::new(control(300_000, 300_000, 0), Color::White);
        clock.start();

        time::advance(Duration::from_millis(1_250)).await;

        let (white, black) = clock.remaining();
        assert_eq!(white, 298_750);
        assert_eq!(black, 300_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_credits_increment_to_the_mover() {
        let clock = Clock::new(control(60_000, 60_000, 2_000), Color::White);
        clock.start();

        time::advance(Duration::from_millis(500)).await;
        clock.switch();

        // White spent 500 ms and earned the 2 s increment; black untouched.
        let (white, black) = clock.remaining();
        assert_eq!(white, 61_500);
        assert_eq!(black, 60_000);
        assert_eq!(clock.active_color(), Color::Black);
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_count_increments_when_white_is_back_on_move() {
        let clock = Clock::new(control(60_000, 60_000, 0), Color::White);
        clock.start();
        assert_eq!(clock.move_count(), 0);

        clock.switch();
        assert_eq!(clock.move_count(), 0);
        clock.switch();
        assert_eq!(clock.move_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_never_negative() {
        let clock = Clock::new(control(100, 100, 0), Color::White);
        clock.start();

        time::advance(Duration::from_millis(10_000)).await;

        let (white, black) = clock.remaining();
        assert_eq!(white, 0);
        assert_eq!(black, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flag_is_delivered_exactly_once() {
        let clock = Clock::new(control(100, 100, 0), Color::White);
        let mut timeup_rx = clock.take_timeup_rx().unwrap();
        clock.start();

        time::advance(Duration::from_millis(250)).await;

        assert_eq!(timeup_rx.recv().await, Some(Color::White));
        assert!(clock.is_time_up(Color::White));
        assert!(!clock.is_running());

        // Further stops/switches must not produce a second event.
        clock.stop();
        clock.switch();
        assert!(timeup_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_emits_snapshots_and_halts_on_stop() {
        let clock = Clock::new(control(60_000, 60_000, 0), Color::White);
        let mut tick_rx = clock.take_tick_rx().unwrap();
        clock.start();

        time::advance(Duration::from_millis(350)).await;

        let tick = tick_rx.recv().await.unwrap();
        assert_eq!(tick.active_color, Color::White);
        assert!(tick.white_ms < 60_000);
        assert_eq!(tick.black_ms, 60_000);

        clock.stop();
        // Drain anything buffered before the stop took effect.
        while tick_rx.try_recv().is_ok() {}
        time::advance(Duration::from_millis(500)).await;
        assert!(tick_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let clock = Clock::new(control(60_000, 60_000, 0), Color::White);
        clock.start();
        time::advance(Duration::from_millis(100)).await;
        clock.start();

        let (white, _) = clock.remaining();
        assert_eq!(white, 59_900);
        assert!(clock.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_settles_and_freezes() {
        let clock = Clock::new(control(60_000, 60_000, 0), Color::White);
        clock.start();
        time::advance(Duration::from_millis(700)).await;
        clock.stop();

        assert!(!clock.is_running());
        let before = clock.remaining();
        time::advance(Duration::from_millis(700)).await;
        assert_eq!(clock.remaining(), before);
        assert_eq!(before.0, 59_300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_while_stopped_still_flips_turn() {
        let clock = Clock::new(control(60_000, 60_000, 1_000), Color::White);
        clock.switch();

        let (white, black) = clock.remaining();
        assert_eq!(white, 61_000);
        assert_eq!(black, 60_000);
        assert_eq!(clock.active_color(), Color::Black);
        assert!(!clock.is_running());
    }

    #[test]
    fn test_format_clock_time() {
        assert_eq!(format_clock_time(245_000), "4:05");
        assert_eq!(format_clock_time(9_300), "9.3");
        assert_eq!(format_clock_time(-50), "0.0");
    }
}
