//! Stores the results of previous builds, for determining which commands are
//! up to date.

use crate::fs::FileInfo;
use crate::value::BuildValue;
use rustc_hash::FxHashMap;

/// What was known about a command when it last completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: BuildValue,
    /// The values of the command's inputs it was computed against, in input
    /// order.
    pub inputs: Vec<BuildValue>,
    /// Dependencies read from the command's depfile, with their identity at
    /// the time.
    pub discovered: Vec<(String, FileInfo)>,
}

/// Prior results keyed by command name.
#[derive(Debug, Default)]
pub struct Db {
    entries: FxHashMap<String, Entry>,
}

impl Db {
    pub fn new() -> Self {
        Db::default()
    }

    pub fn get(&self, command: &str) -> Option<&Entry> {
        self.entries.get(command)
    }

    pub fn insert(&mut self, command: &str, entry: Entry) {
        self.entries.insert(command.to_owned(), entry);
    }
}
