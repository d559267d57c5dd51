//! Runs execution jobs, potentially in parallel.
//! Unaware of the build graph; jobs are opaque closures that report a value.

use crate::graph::CommandId;
use crate::process::{self, CommandLine, Termination};
use crate::value::BuildValue;
use anyhow::anyhow;
use std::sync::{mpsc, Arc};
use std::time::Instant;

/// The result of executing a command.
#[derive(Debug)]
pub struct TaskResult {
    pub value: BuildValue,
    /// Prerequisites read from the command's dependency file, if it has one.
    pub discovered_deps: Option<Vec<String>>,
}

/// What a running job may use from its environment.
pub trait JobContext: Send + Sync {
    /// Run a process, returning how it ended and its stdout+stderr.
    /// Returns an Err() if we failed outside of the process itself.
    fn run_process(&self, cmdline: &CommandLine) -> anyhow::Result<(Termination, Vec<u8>)>;
}

/// Runs real subprocesses.
pub struct ProcessContext;

impl JobContext for ProcessContext {
    fn run_process(&self, cmdline: &CommandLine) -> anyhow::Result<(Termination, Vec<u8>)> {
        process::run_command(cmdline)
    }
}

type JobBody = Box<dyn FnOnce(&dyn JobContext) -> TaskResult + Send>;

/// A unit of work submitted by a command.
pub struct Job {
    body: JobBody,
}

impl Job {
    pub fn new(body: impl FnOnce(&dyn JobContext) -> TaskResult + Send + 'static) -> Self {
        Job {
            body: Box::new(body),
        }
    }

    pub fn run(self, context: &dyn JobContext) -> TaskResult {
        (self.body)(context)
    }
}

pub struct FinishedTask {
    pub id: CommandId,
    pub span: (Instant, Instant),
    pub result: TaskResult,
}

pub struct Runner {
    finished_send: mpsc::Sender<FinishedTask>,
    finished_recv: mpsc::Receiver<FinishedTask>,
    pool: rayon::ThreadPool,
    context: Arc<dyn JobContext>,
    running: usize,
}

impl Runner {
    pub fn new(parallelism: usize) -> anyhow::Result<Self> {
        Runner::with_context(parallelism, Arc::new(ProcessContext))
    }

    pub fn with_context(parallelism: usize, context: Arc<dyn JobContext>) -> anyhow::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism.max(1))
            .thread_name(|i| format!("job-{}", i))
            .build()?;
        let (tx, rx) = mpsc::channel();
        Ok(Runner {
            finished_send: tx,
            finished_recv: rx,
            pool,
            context,
            running: 0,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running > 0
    }

    pub fn start(&mut self, id: CommandId, job: Job) {
        let tx = self.finished_send.clone();
        let context = self.context.clone();
        self.pool.spawn(move || {
            let start = Instant::now();
            let result = job.run(context.as_ref());
            let finish = Instant::now();

            let task = FinishedTask {
                id,
                span: (start, finish),
                result,
            };
            // The send will only fail if the receiver disappeared, e.g. due to shutting down.
            let _ = tx.send(task);
        });
        self.running += 1;
    }

    /// Wait for a job to complete.
    pub fn wait(&mut self) -> anyhow::Result<FinishedTask> {
        let task = self
            .finished_recv
            .recv()
            .map_err(|_| anyhow!("job runner channel closed"))?;
        self.running -= 1;
        Ok(task)
    }
}
