//! Recognition submission gating.
//!
//! Consolidates the frame counter, interval timer, and in-flight flag into
//! one value object the pipeline queries before each detection pass. All
//! enabled gates must agree before a submission is allowed.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    /// Act only on every Nth frame. `None` disables the frame-count gate.
    pub every_nth_frame: Option<u64>,
    /// Minimum spacing between submissions. `None` disables the timer gate.
    pub min_interval: Option<Duration>,
    /// At most one outstanding recognition request.
    pub single_flight: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            every_nth_frame: None,
            min_interval: Some(Duration::from_millis(300)),
            single_flight: true,
        }
    }
}

#[derive(Debug)]
pub struct SubmissionGate {
    config: GateConfig,
    last_submit: Option<Instant>,
    in_flight: bool,
}

impl SubmissionGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            last_submit: None,
            in_flight: false,
        }
    }

    pub fn should_submit(&self, now: Instant, frame_index: u64) -> bool {
        if self.config.single_flight && self.in_flight {
            return false;
        }
        if let Some(n) = self.config.every_nth_frame
            && n > 1
            && frame_index % n != 0
        {
            return false;
        }
        if let Some(interval) = self.config.min_interval
            && let Some(last) = self.last_submit
            && now.duration_since(last) < interval
        {
            return false;
        }
        true
    }

    pub fn on_submitted(&mut self, now: Instant) {
        self.last_submit = Some(now);
        self.in_flight = true;
    }

    pub fn on_result(&mut self) {
        self.in_flight = false;
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(config: GateConfig) -> SubmissionGate {
        SubmissionGate::new(config)
    }

    #[test]
    fn in_flight_blocks_until_result_arrives() {
        let mut gate = gate(GateConfig {
            every_nth_frame: None,
            min_interval: None,
            single_flight: true,
        });
        let now = Instant::now();
        assert!(gate.should_submit(now, 0));
        gate.on_submitted(now);
        // next frame arrives before the callback
        assert!(!gate.should_submit(now + Duration::from_millis(1), 1));
        gate.on_result();
        assert!(gate.should_submit(now + Duration::from_millis(2), 2));
    }

    #[test]
    fn interval_gate_enforces_spacing() {
        let mut gate = gate(GateConfig {
            every_nth_frame: None,
            min_interval: Some(Duration::from_millis(300)),
            single_flight: false,
        });
        let now = Instant::now();
        assert!(gate.should_submit(now, 0));
        gate.on_submitted(now);
        assert!(!gate.should_submit(now + Duration::from_millis(299), 1));
        assert!(gate.should_submit(now + Duration::from_millis(300), 2));
    }

    #[test]
    fn frame_count_gate_picks_every_nth() {
        let gate = gate(GateConfig {
            every_nth_frame: Some(5),
            min_interval: None,
            single_flight: false,
        });
        let now = Instant::now();
        assert!(gate.should_submit(now, 0));
        assert!(!gate.should_submit(now, 1));
        assert!(!gate.should_submit(now, 4));
        assert!(gate.should_submit(now, 5));
    }

    #[test]
    fn combined_gates_are_conjunctive() {
        let mut gate = gate(GateConfig {
            every_nth_frame: Some(2),
            min_interval: Some(Duration::from_millis(100)),
            single_flight: true,
        });
        let now = Instant::now();
        assert!(gate.should_submit(now, 0));
        gate.on_submitted(now);
        gate.on_result();
        // right frame parity, but the timer has not elapsed
        assert!(!gate.should_submit(now + Duration::from_millis(50), 2));
        // timer elapsed, but wrong parity
        assert!(!gate.should_submit(now + Duration::from_millis(150), 3));
        assert!(gate.should_submit(now + Duration::from_millis(150), 4));
    }
}
