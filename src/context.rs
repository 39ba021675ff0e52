use chrono::{DateTime, Datelike, Local};

/// Values fixed at process start and passed explicitly to whatever needs
/// "now": the month-range computation and the run log. Nothing else in the
/// crate reads the clock.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub started: DateTime<Local>,
    pub command_line: Vec<String>,
}

impl RunContext {
    pub fn capture() -> Self {
        RunContext {
            started: Local::now(),
            command_line: std::env::args().collect(),
        }
    }

    pub fn new(started: DateTime<Local>, command_line: Vec<String>) -> Self {
        RunContext {
            started,
            command_line,
        }
    }

    pub fn current_year(&self) -> i32 {
        self.started.year()
    }

    pub fn current_month(&self) -> u32 {
        self.started.month()
    }
}
