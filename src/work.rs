//! Build runner, choosing and executing commands.

use crate::db::{Db, Entry};
use crate::delegate::Delegate;
use crate::external::{CommandTask, TaskInterface};
use crate::fs::{FileInfo, FileSystem};
use crate::graph::{CommandId, Graph, Node};
use crate::task::{FinishedTask, Job, Runner};
use crate::value::BuildValue;
use anyhow::bail;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

pub struct Options {
    pub parallelism: usize,
}

/// Counts of what happened to the wanted commands.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    /// Commands whose process was run.
    pub ran: usize,
    /// Commands whose prior result was reused as-is.
    pub up_to_date: usize,
    /// Commands that failed, couldn't run due to a failed input, or were
    /// cancelled.
    pub failed: usize,
}

/// The scheduler side of a single command's state machine, collecting what
/// the command asked for during one call into it.
struct Handle<'a> {
    delegate: &'a Arc<dyn Delegate>,
    fs: &'a Arc<dyn FileSystem>,
    requests: Vec<(Arc<Node>, usize)>,
    job: Option<Job>,
    completed: Option<BuildValue>,
}

impl<'a> Handle<'a> {
    fn new(delegate: &'a Arc<dyn Delegate>, fs: &'a Arc<dyn FileSystem>) -> Self {
        Handle {
            delegate,
            fs,
            requests: Vec::new(),
            job: None,
            completed: None,
        }
    }
}

impl<'a> TaskInterface for Handle<'a> {
    fn delegate(&self) -> &Arc<dyn Delegate> {
        self.delegate
    }

    fn file_system(&self) -> &Arc<dyn FileSystem> {
        self.fs
    }

    fn request_input(&mut self, node: &Arc<Node>, input_id: usize) {
        self.requests.push((node.clone(), input_id));
    }

    fn submit_job(&mut self, job: Job) {
        self.job = Some(job);
    }

    fn complete(&mut self, value: BuildValue) {
        self.completed = Some(value);
    }
}

/// A command whose job is running.
struct Running {
    task: CommandTask,
    inputs: Vec<BuildValue>,
}

pub struct Work<'a> {
    graph: &'a Graph,
    db: &'a mut Db,
    delegate: Arc<dyn Delegate>,
    fs: Arc<dyn FileSystem>,
    runner: Runner,

    /// Wanted commands, dependencies before dependents.
    order: Vec<CommandId>,
    wanted: FxHashSet<CommandId>,
    running: FxHashMap<CommandId, Running>,
    /// Values of the commands that completed in this build.
    values: FxHashMap<CommandId, BuildValue>,
    summary: BuildSummary,
}

impl<'a> Work<'a> {
    pub fn new(
        graph: &'a Graph,
        db: &'a mut Db,
        delegate: Arc<dyn Delegate>,
        fs: Arc<dyn FileSystem>,
        options: Options,
    ) -> anyhow::Result<Self> {
        let runner = Runner::new(options.parallelism)?;
        Ok(Work::with_runner(graph, db, delegate, fs, runner))
    }

    /// Like `new`, but running jobs on the given runner.
    pub fn with_runner(
        graph: &'a Graph,
        db: &'a mut Db,
        delegate: Arc<dyn Delegate>,
        fs: Arc<dyn FileSystem>,
        runner: Runner,
    ) -> Self {
        Work {
            graph,
            db,
            delegate,
            fs,
            runner,
            order: Vec::new(),
            wanted: FxHashSet::default(),
            running: FxHashMap::default(),
            values: FxHashMap::default(),
            summary: BuildSummary::default(),
        }
    }

    /// Request that the node named `name` be brought up to date, along with
    /// everything it depends on.
    pub fn want_node(&mut self, name: &str) -> anyhow::Result<()> {
        let node = match self.graph.node_id(name) {
            Some(node) => node,
            None => bail!("unknown node {:?}", name),
        };
        match self.graph.node_producer(node) {
            Some(id) => self.want_command(id, &mut Vec::new()),
            None => bail!("no command produces {:?}", name),
        }
    }

    /// Post-order visit of the commands `id` depends on.  `stack` holds the
    /// commands being visited, to detect cycles.
    fn want_command(&mut self, id: CommandId, stack: &mut Vec<CommandId>) -> anyhow::Result<()> {
        if self.wanted.contains(&id) {
            return Ok(());
        }
        if let Some(pos) = stack.iter().position(|&other| other == id) {
            let mut names: Vec<&str> = stack[pos..]
                .iter()
                .map(|&cid| self.graph.command(cid).name())
                .collect();
            names.push(self.graph.command(id).name());
            bail!("dependency cycle: {}", names.join(" -> "));
        }
        stack.push(id);
        let command = self.graph.command(id).clone();
        for input in command.inputs() {
            if let Some(producer) = self.graph.producer(input) {
                self.want_command(producer, stack)?;
            }
        }
        stack.pop();
        self.wanted.insert(id);
        self.order.push(id);
        Ok(())
    }

    /// The value a consumer sees for a node.
    fn node_value(&self, node: &Node) -> BuildValue {
        if let Some(producer) = self.graph.producer(node) {
            let value = &self.values[&producer];
            return self.graph.command(producer).result_for_output(node, value);
        }
        if node.is_virtual() {
            return BuildValue::VirtualInput;
        }
        match node.file_info(self.fs.as_ref()) {
            FileInfo::Missing => BuildValue::MissingInput,
            info => BuildValue::ExistingInput(info),
        }
    }

    /// Whether all producers of a command's inputs have completed.
    fn is_ready(&self, id: CommandId) -> bool {
        self.graph
            .command(id)
            .inputs()
            .iter()
            .filter_map(|input| self.graph.producer(input))
            .all(|producer| self.values.contains_key(&producer))
    }

    /// The prior value of a command, if it still stands given the command's
    /// current input values.
    fn up_to_date_value(&self, id: CommandId, inputs: &[BuildValue]) -> Option<BuildValue> {
        let command = self.graph.command(id);
        let entry = self.db.get(command.name())?;
        if !command.is_result_valid(self.fs.as_ref(), &entry.value) {
            return None;
        }
        if entry.inputs != inputs {
            tracing::debug!("{}: inputs changed", command.name());
            return None;
        }
        for (path, info) in &entry.discovered {
            if self.fs.file_info(path) != *info {
                tracing::debug!("{}: discovered dependency {} changed", command.name(), path);
                return None;
            }
        }
        Some(entry.value.clone())
    }

    /// Evaluate a command whose inputs are all known: reuse its prior result,
    /// or drive it through its state machine.
    fn start_command(&mut self, id: CommandId) {
        let command = self.graph.command(id).clone();
        let inputs: Vec<BuildValue> = command
            .inputs()
            .iter()
            .map(|node| self.node_value(node))
            .collect();

        if let Some(value) = self.up_to_date_value(id, &inputs) {
            tracing::debug!("{}: up to date", command.name());
            self.summary.up_to_date += 1;
            self.values.insert(id, value);
            return;
        }

        let mut task = CommandTask::new(command.clone());
        if let Some(entry) = self.db.get(command.name()) {
            task.provide_prior_value(&entry.value);
        }
        let mut handle = Handle::new(&self.delegate, &self.fs);
        task.start(&mut handle);
        for (node, input_id) in std::mem::take(&mut handle.requests) {
            debug_assert_eq!(node.name(), command.inputs()[input_id].name());
            task.provide_value(&mut handle, input_id, &inputs[input_id]);
        }
        task.inputs_available(&mut handle);

        let Handle { job, completed, .. } = handle;
        if let Some(value) = completed {
            self.finish(id, value, inputs, None);
        } else if let Some(job) = job {
            self.runner.start(id, job);
            self.running.insert(id, Running { task, inputs });
        } else {
            panic!("{} neither completed nor submitted a job", command.name());
        }
    }

    fn job_finished(&mut self, finished: FinishedTask) {
        let FinishedTask { id, span, result } = finished;
        let Running { mut task, inputs } = match self.running.remove(&id) {
            Some(running) => running,
            None => panic!("unknown job finished"),
        };
        tracing::debug!(
            "{}: ran in {:?}",
            task.command().name(),
            span.1.duration_since(span.0)
        );
        self.summary.ran += 1;

        let mut handle = Handle::new(&self.delegate, &self.fs);
        task.job_finished(&mut handle, result.value);
        let value = match handle.completed {
            Some(value) => value,
            None => panic!("{} didn't complete", task.command().name()),
        };
        self.finish(id, value, inputs, result.discovered_deps);
    }

    /// Record a command's final value for this build.
    fn finish(
        &mut self,
        id: CommandId,
        value: BuildValue,
        inputs: Vec<BuildValue>,
        discovered_deps: Option<Vec<String>>,
    ) {
        if value.is_failure() {
            self.summary.failed += 1;
        }
        let discovered = discovered_deps
            .unwrap_or_default()
            .into_iter()
            .map(|path| {
                let info = self.fs.file_info(&path);
                (path, info)
            })
            .collect();
        self.db.insert(
            self.graph.command(id).name(),
            Entry {
                value: value.clone(),
                inputs,
                discovered,
            },
        );
        self.values.insert(id, value);
    }

    /// Run until every wanted command has completed.
    pub fn run(&mut self) -> anyhow::Result<BuildSummary> {
        let mut pending: Vec<CommandId> = self.order.clone();
        loop {
            let (ready, blocked): (Vec<CommandId>, Vec<CommandId>) =
                pending.into_iter().partition(|&id| self.is_ready(id));
            pending = blocked;
            let started = !ready.is_empty();
            for id in ready {
                self.start_command(id);
            }
            if started {
                continue;
            }

            if self.runner.is_running() {
                let finished = self.runner.wait()?;
                self.job_finished(finished);
                continue;
            }

            if !pending.is_empty() {
                bail!("{} commands could not be scheduled", pending.len());
            }
            break;
        }
        Ok(self.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::process::{CommandLine, Termination};
    use crate::task::JobContext;
    use crate::testing::{MemoryFileSystem, RecordingDelegate};

    /// Pretends to run processes: `touch a b` writes its arguments, `fail`
    /// fails.
    struct FakeProcesses {
        fs: Arc<MemoryFileSystem>,
    }

    impl JobContext for FakeProcesses {
        fn run_process(&self, cmdline: &CommandLine) -> anyhow::Result<(Termination, Vec<u8>)> {
            let text = cmdline.display();
            let mut words = text.split(' ');
            match words.next() {
                Some("touch") => {
                    for path in words {
                        self.fs.touch(path);
                    }
                    Ok((Termination::Success, Vec::new()))
                }
                _ => Ok((Termination::Failure, b"nope".to_vec())),
            }
        }
    }

    struct TestBuild {
        graph: Graph,
        db: Db,
        fs: Arc<MemoryFileSystem>,
        delegate: Arc<RecordingDelegate>,
    }

    impl TestBuild {
        fn new() -> Self {
            TestBuild {
                graph: Graph::new(),
                db: Db::new(),
                fs: Arc::new(MemoryFileSystem::new()),
                delegate: Arc::new(RecordingDelegate::default()),
            }
        }

        fn add(&mut self, name: &str, ins: &[&str], outs: &[&str], args: &str) -> CommandId {
            let mut cmd = Command::shell(name);
            cmd.configure_inputs(self.graph.nodes(ins));
            cmd.configure_outputs(self.graph.nodes(outs));
            cmd.configure_attribute("args", args).unwrap();
            self.graph.add_command(cmd).unwrap()
        }

        fn build(&mut self, target: &str) -> anyhow::Result<BuildSummary> {
            let runner = Runner::with_context(
                2,
                Arc::new(FakeProcesses {
                    fs: self.fs.clone(),
                }),
            )?;
            let mut work = Work::with_runner(
                &self.graph,
                &mut self.db,
                self.delegate.clone(),
                self.fs.clone(),
                runner,
            );
            work.want_node(target)?;
            work.run()
        }
    }

    #[test]
    fn builds_chain_then_nothing() -> anyhow::Result<()> {
        let mut b = TestBuild::new();
        b.fs.touch("in");
        b.add("mid", &["in"], &["mid"], "touch mid");
        b.add("out", &["mid"], &["out"], "touch out");

        let summary = b.build("out")?;
        assert_eq!(summary.ran, 2);
        assert_eq!(summary.failed, 0);
        assert!(!b.fs.file_info("out").is_missing());

        let summary = b.build("out")?;
        assert_eq!(
            summary,
            BuildSummary {
                ran: 0,
                up_to_date: 2,
                failed: 0
            }
        );
        Ok(())
    }

    #[test]
    fn source_change_reruns_dependents() -> anyhow::Result<()> {
        let mut b = TestBuild::new();
        b.fs.touch("in");
        b.add("mid", &["in"], &["mid"], "touch mid");
        b.add("out", &["mid"], &["out"], "touch out");
        b.build("out")?;

        b.fs.touch("in");
        assert_eq!(b.build("out")?.ran, 2);
        Ok(())
    }

    #[test]
    fn failure_propagates() -> anyhow::Result<()> {
        let mut b = TestBuild::new();
        b.fs.touch("in");
        let mid = b.add("mid", &["in"], &["mid"], "fail");
        b.add("out", &["mid"], &["out"], "touch out");
        let summary = b.build("out")?;
        assert_eq!(summary.ran, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(b.delegate.failure_count(), 1);
        assert_eq!(
            b.db.get("out").map(|e| &e.value),
            Some(&BuildValue::PropagatedFailureCommand)
        );
        assert_eq!(b.db.get(b.graph.command(mid).name()).map(|e| &e.value), Some(&BuildValue::FailedCommand));
        Ok(())
    }

    #[test]
    fn missing_source() -> anyhow::Result<()> {
        let mut b = TestBuild::new();
        b.add("out", &["nothere"], &["out"], "touch out");
        let summary = b.build("out")?;
        assert_eq!(summary.ran, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            b.delegate.errors(),
            vec![
                "missing input 'nothere' and no rule to build it",
                "cannot build 'out' due to missing input",
            ]
        );
        Ok(())
    }

    #[test]
    fn cycle_is_an_error() {
        let mut b = TestBuild::new();
        b.add("a", &["b"], &["a"], "touch a");
        b.add("b", &["a"], &["b"], "touch b");
        let err = b.build("a").unwrap_err();
        assert!(err.to_string().contains("dependency cycle"), "{}", err);
    }

    #[test]
    fn unknown_target() {
        let mut b = TestBuild::new();
        b.graph.node("src");
        assert!(b.build("nope").is_err());
        assert!(b.build("src").is_err());
    }

    #[test]
    fn always_out_of_date_reruns() -> anyhow::Result<()> {
        let mut b = TestBuild::new();
        let mut cmd = Command::shell("stamp");
        cmd.configure_outputs(b.graph.nodes(&["stamp"]));
        cmd.configure_attribute("args", "touch stamp")?;
        cmd.configure_attribute("always-out-of-date", "true")?;
        b.graph.add_command(cmd)?;
        assert_eq!(b.build("stamp")?.ran, 1);
        assert_eq!(b.build("stamp")?.ran, 1);
        Ok(())
    }

    #[test]
    fn duplicate_name_is_rejected() -> anyhow::Result<()> {
        let mut b = TestBuild::new();
        b.add("touch", &[], &["a"], "touch a");
        let mut cmd = Command::shell("touch");
        cmd.configure_outputs(b.graph.nodes(&["b"]));
        cmd.configure_attribute("args", "touch b")?;
        assert!(b.graph.add_command(cmd).is_err());

        // With one result per name, the second build has nothing to do.
        assert_eq!(b.build("a")?.ran, 1);
        let summary = b.build("a")?;
        assert_eq!(summary.ran, 0);
        assert_eq!(summary.up_to_date, 1);
        Ok(())
    }
}
