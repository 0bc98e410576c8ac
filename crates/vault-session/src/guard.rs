//! Inactivity guard
//!
//! Only runs while there is something to protect: a key held in memory
//! that also has an encrypted copy the user can unlock again. Without a
//! saved copy, locking would just throw the key away.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use vault_core::Timer;

/// User activity that keeps a session alive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityEvent {
    PointerDown,
    KeyDown,
    Scroll,
    TouchStart,
}

impl ActivityEvent {
    pub const ALL: [ActivityEvent; 4] = [
        ActivityEvent::PointerDown,
        ActivityEvent::KeyDown,
        ActivityEvent::Scroll,
        ActivityEvent::TouchStart,
    ];

    /// Map a DOM event name to an activity signal. Anything outside the
    /// fixed set (mousemove, focus, ...) does not count as activity.
    pub fn from_dom_name(name: &str) -> Option<Self> {
        match name {
            "mousedown" => Some(ActivityEvent::PointerDown),
            "keydown" => Some(ActivityEvent::KeyDown),
            "scroll" => Some(ActivityEvent::Scroll),
            "touchstart" => Some(ActivityEvent::TouchStart),
            _ => None,
        }
    }

    pub fn dom_name(self) -> &'static str {
        match self {
            ActivityEvent::PointerDown => "mousedown",
            ActivityEvent::KeyDown => "keydown",
            ActivityEvent::Scroll => "scroll",
            ActivityEvent::TouchStart => "touchstart",
        }
    }
}

/// Single inactivity timer that is only armed while active
#[derive(Debug)]
pub struct SessionGuard {
    timeout: Duration,
    timer: Timer,
    active: bool,
}

impl SessionGuard {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            timer: Timer::new(),
            active: false,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Activate when a key is exposed, tear down when it is not.
    /// An already-active guard keeps its current deadline.
    pub fn sync(&mut self, exposed: bool, now: Instant) {
        match (self.active, exposed) {
            (false, true) => {
                debug!("Session guard armed for {:?}", self.timeout);
                self.active = true;
                self.timer.arm(now, self.timeout);
            }
            (true, false) => {
                debug!("Session guard torn down");
                self.active = false;
                self.timer.cancel();
            }
            _ => {}
        }
    }

    /// Restart the countdown. Ignored while inactive.
    pub fn record_activity(&mut self, _event: ActivityEvent, now: Instant) -> bool {
        if !self.active {
            return false;
        }
        self.timer.arm(now, self.timeout);
        true
    }

    /// True once when the countdown has run out; the guard is then inactive
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.active && self.timer.fire_if_due(now) {
            self.active = false;
            return true;
        }
        false
    }
}
