//! SimulatedHandler - 長時間の作業を模した handler
//!
//! 一定間隔で進捗（`.`）を書き出し、最後に ` done` を出力します。

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::app::runtime::{HandlerError, TaskHandler};
use crate::domain::TaskName;

type SharedWriter = Arc<Mutex<dyn Write + Send>>;

pub struct SimulatedHandler {
    steps: u32,
    step_interval: Duration,
    out: SharedWriter,
}

impl SimulatedHandler {
    pub const DEFAULT_STEPS: u32 = 10;
    pub const DEFAULT_STEP_INTERVAL: Duration = Duration::from_secs(1);

    /// Ten one-second steps, progress on stdout.
    pub fn new() -> Self {
        Self::with_writer(Arc::new(Mutex::new(io::stdout())))
    }

    pub fn with_writer(out: SharedWriter) -> Self {
        Self {
            steps: Self::DEFAULT_STEPS,
            step_interval: Self::DEFAULT_STEP_INTERVAL,
            out,
        }
    }

    pub fn steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn step_interval(mut self, step_interval: Duration) -> Self {
        self.step_interval = step_interval;
        self
    }

    fn emit(&self, text: &str) -> Result<(), HandlerError> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| HandlerError::new("progress writer poisoned"))?;
        out.write_all(text.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|e| HandlerError::new(format!("writing progress: {e}")))
    }
}

impl Default for SimulatedHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskHandler for SimulatedHandler {
    async fn execute(&self, task: &TaskName) -> Result<(), HandlerError> {
        self.emit(&format!(
            "Executing {} for product {} on process {} ",
            task.nature(),
            task.product(),
            task.process()
        ))?;
        for _ in 0..self.steps {
            tokio::time::sleep(self.step_interval).await;
            self.emit(".")?;
        }
        self.emit(" done\n")
    }
}
