//! Stage timing.

use std::time::{Duration, Instant};

/// Measures one build stage and reports its duration when finished.
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Print the elapsed time, in minutes once past a minute.
    pub fn finish(self) {
        println!("  {}", format_elapsed(&self.name, self.elapsed()));
    }
}

fn format_elapsed(name: &str, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs >= 60.0 {
        format!("[{:.1}m] {}", secs / 60.0, name)
    } else {
        format!("[{:.1}s] {}", secs, name)
    }
}
