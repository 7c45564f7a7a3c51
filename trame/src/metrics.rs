//! Per-frame counters and phase timings, compiled into debug builds only.
//!
//! The JSON report uses sorted counter keys and insertion-ordered phases so
//! two identical runs produce structurally identical reports (timing values
//! aside).

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::render::RenderCommand;

#[derive(Debug, Default)]
pub struct PerfMetrics {
    counters: BTreeMap<String, u64>,
    phases: Vec<(String, Duration)>,
}

impl PerfMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&mut self, key: &str) {
        self.count_by(key, 1);
    }

    pub fn count_by(&mut self, key: &str, n: u64) {
        *self.counters.entry(key.to_string()).or_insert(0) += n;
    }

    pub fn counter(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    /// Times a closure and records it as a named phase.
    pub fn phase<T>(&mut self, name: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.phases.push((name.to_string(), start.elapsed()));
        result
    }

    /// Bumps one counter per command kind (`cmd.drawImage`, ...).
    pub fn count_commands(&mut self, commands: &[RenderCommand]) {
        for command in commands {
            self.count_by(&format!("cmd.{}", command.kind_name()), 1);
        }
    }

    pub fn report(&self) -> Value {
        json!({
            "counters": self.counters,
            "phases": self
                .phases
                .iter()
                .map(|(name, elapsed)| {
                    json!({"name": name, "micros": elapsed.as_micros() as u64})
                })
                .collect::<Vec<_>>(),
        })
    }
}
