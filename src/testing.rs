//! In-memory collaborators for unit tests.

use crate::command::Command;
use crate::delegate::Delegate;
use crate::fs::{FileInfo, FileStat, FileSystem, FileTimestamp};
use crate::graph::{CommandId, Graph};
use crate::process::Termination;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

struct MemFile {
    contents: Vec<u8>,
    stat: FileStat,
}

/// A file system where every write bumps the modification time of the file,
/// so identities always change.
#[derive(Default)]
pub struct MemoryFileSystem {
    files: Mutex<FxHashMap<String, MemFile>>,
    dirs: Mutex<Vec<String>>,
    clock: AtomicUsize,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        MemoryFileSystem::default()
    }

    pub fn write(&self, path: &str, contents: &[u8]) {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        let mut files = self.files.lock().unwrap();
        let inode = files.len() as u64 + 1;
        let inode = files.get(path).map(|f| f.stat.inode).unwrap_or(inode);
        files.insert(
            path.to_string(),
            MemFile {
                contents: contents.to_vec(),
                stat: FileStat {
                    device: 1,
                    inode,
                    mode: 0o644,
                    size: contents.len() as u64,
                    mtime: FileTimestamp {
                        seconds: tick,
                        nanoseconds: 0,
                    },
                },
            },
        );
    }

    pub fn touch(&self, path: &str) {
        let contents = match self.files.lock().unwrap().get(path) {
            Some(file) => file.contents.clone(),
            None => Vec::new(),
        };
        self.write(path, &contents);
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }

    pub fn created_dirs(&self) -> Vec<String> {
        self.dirs.lock().unwrap().clone()
    }
}

impl FileSystem for MemoryFileSystem {
    fn read(&self, path: &str) -> std::io::Result<Vec<u8>> {
        match self.files.lock().unwrap().get(path) {
            Some(file) => Ok(file.contents.clone()),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: not found", path),
            )),
        }
    }

    fn file_info(&self, path: &str) -> FileInfo {
        match self.files.lock().unwrap().get(path) {
            Some(file) => FileInfo::Present(file.stat),
            None => FileInfo::Missing,
        }
    }

    fn create_dir_all(&self, path: &str) -> std::io::Result<()> {
        self.dirs.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

/// A delegate recording every event as a line of text.
#[derive(Default)]
pub struct RecordingDelegate {
    events: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    failures: AtomicUsize,
    cancelled: AtomicBool,
}

impl RecordingDelegate {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl Delegate for RecordingDelegate {
    fn command_preparing(&self, command: &Command) {
        self.record(format!("preparing {}", command.name()));
    }

    fn command_started(&self, command: &Command) {
        self.record(format!("started {}", command.name()));
    }

    fn command_finished(&self, command: &Command, termination: Termination, _output: &[u8]) {
        self.record(format!("finished {} {:?}", command.name(), termination));
    }

    fn had_command_failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Ids of `count` phony commands in a throwaway graph.
pub fn graph_with_commands(count: usize) -> Vec<CommandId> {
    let mut graph = Graph::new();
    (0..count)
        .map(|i| {
            let name = format!("out{}", i);
            let mut cmd = Command::phony(name.clone());
            cmd.configure_outputs(vec![graph.node(&name)]);
            graph.add_command(cmd).unwrap()
        })
        .collect()
}
