use chrono::{DateTime, Utc};
use futures_timer::Delay;
use std::time::Duration;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Question,
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Ignored,
    Running(i64),
    Expired,
}

/// One `idle -> running -> expired` countdown.
///
/// Expiry is reported exactly once: the tick (or arm) that reaches zero
/// returns `Expired`, every later tick is `Ignored` until it is rearmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    state: TimerState,
    remaining: i64,
}

impl Default for Countdown {
    fn default() -> Self {
        Countdown {
            state: TimerState::Idle,
            remaining: 0,
        }
    }
}

impl Countdown {
    pub fn arm(&mut self, seconds: i64) -> TickOutcome {
        self.remaining = seconds;
        if seconds <= 0 {
            self.state = TimerState::Expired;
            return TickOutcome::Expired;
        }
        self.state = TimerState::Running;
        TickOutcome::Running(seconds)
    }

    pub fn cancel(&mut self) {
        self.state = TimerState::Idle;
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.state != TimerState::Running {
            return TickOutcome::Ignored;
        }

        self.remaining -= 1;
        if self.remaining <= 0 {
            self.state = TimerState::Expired;
            return TickOutcome::Expired;
        }
        TickOutcome::Running(self.remaining)
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn is_expired(&self) -> bool {
        self.state == TimerState::Expired
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }
}

/// The per-question and whole-session countdowns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerEngine {
    pub question: Countdown,
    pub session: Countdown,
}

impl TimerEngine {
    pub fn countdown_mut(&mut self, kind: TimerKind) -> &mut Countdown {
        match kind {
            TimerKind::Question => &mut self.question,
            TimerKind::Session => &mut self.session,
        }
    }

    pub fn tick(&mut self, kind: TimerKind) -> TickOutcome {
        self.countdown_mut(kind).tick()
    }

    pub fn cancel_all(&mut self) {
        self.question.cancel();
        self.session.cancel();
    }

    /// Remaining question seconds while armed or expired, `None` when idle.
    pub fn question_left(&self) -> Option<i64> {
        match self.question.state() {
            TimerState::Idle => None,
            _ => Some(self.question.remaining()),
        }
    }

    pub fn session_left(&self) -> Option<i64> {
        match self.session.state() {
            TimerState::Idle => None,
            _ => Some(self.session.remaining()),
        }
    }
}

/// Whole seconds from `now` until `end_time`; negative once it has passed.
pub fn seconds_until(end_time: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (end_time - now).num_seconds()
}

/// Fires once per real second after being armed.
///
/// The pending delay lives in the ticker, so dropping a `tick` future midway
/// (e.g. because another `select!` branch won) does not shift the cadence.
pub struct Ticker {
    delay: Delay,
}

impl Ticker {
    pub fn start() -> Self {
        Ticker {
            delay: Delay::new(TICK),
        }
    }

    pub async fn tick(&mut self) {
        (&mut self.delay).await;
        self.delay.reset(TICK);
    }
}

/// Awaits the next tick of an armed ticker, or never resolves when disarmed.
pub async fn next_tick(ticker: &mut Option<Ticker>) {
    match ticker {
        Some(ticker) => ticker.tick().await,
        None => futures_util::future::pending::<()>().await,
    }
}
