//! Simulation clock, timed tasks and race time formatting

use crate::results::DID_NOT_FINISH;

/// Format seconds as `MM:SS:CC` (minutes, seconds, hundredths)
pub fn format_time(seconds: f32) -> String {
    let t = seconds.max(0.0);
    let minutes = (t / 60.0).floor() as u32;
    let secs = (t % 60.0).floor() as u32;
    let hundredths = ((t * 100.0) % 100.0).floor() as u32;
    format!("{minutes:02}:{secs:02}:{hundredths:02}")
}

/// Same as [`format_time`] but renders the DNF sentinel as text
pub fn format_leaderboard_time(seconds: f32) -> String {
    if seconds == DID_NOT_FINISH {
        "DID NOT FINISH".to_string()
    } else {
        format_time(seconds)
    }
}

/// Fixed-step simulation clock. Every timed behaviour reads `now()` from here,
/// never from the wall clock, so a session replays identically.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    elapsed: f64,
    tick: u64,
}

impl SimClock {
    pub fn advance(&mut self, dt: f32) {
        self.elapsed += dt as f64;
        self.tick += 1;
    }

    /// Seconds since the session was created
    pub fn now(&self) -> f32 {
        self.elapsed as f32
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }
}

// ---------------------------------------------------------
// Timeline: resumable tasks keyed by a deadline on the clock
// ---------------------------------------------------------

#[derive(Debug, Clone)]
struct Scheduled<T> {
    due: f32,
    seq: u64,
    task: T,
}

/// Queue of tasks that become runnable once the clock passes their deadline.
/// Tasks with equal deadlines come out in scheduling order.
#[derive(Debug, Clone)]
pub struct Timeline<T> {
    pending: Vec<Scheduled<T>>,
    next_seq: u64,
}

impl<T> Default for Timeline<T> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            next_seq: 0,
        }
    }
}

impl<T> Timeline<T> {
    pub fn schedule(&mut self, due: f32, task: T) {
        self.pending.push(Scheduled {
            due,
            seq: self.next_seq,
            task,
        });
        self.next_seq += 1;
    }

    /// Remove and return every task whose deadline is `<= now`, earliest first
    pub fn drain_due(&mut self, now: f32) -> Vec<T> {
        let (mut due, rest): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|s| s.due <= now);
        self.pending = rest;

        due.sort_by(|a, b| a.due.total_cmp(&b.due).then(a.seq.cmp(&b.seq)));
        due.into_iter().map(|s| s.task).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
