//! A single hash over a command's identity-relevant configuration is recorded
//! with each successful result and compared on the next build to tell whether
//! the rule itself changed.

use rustc_hash::FxHasher;
use std::hash::Hasher;

/// Hash value identifying a command's configuration; compared to verify
/// whether a prior result was produced by the same rule.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Signature(pub u64);

const UNIT_SEPARATOR: u8 = 0x1F;

/// Accumulates the parts of a command signature.  FxHasher is unkeyed, so the
/// same configuration hashes the same in every process.
#[derive(Default)]
pub struct SignatureHasher(FxHasher);

impl SignatureHasher {
    pub fn write_str(&mut self, string: &str) {
        self.0.write(string.as_bytes());
        self.0.write_u8(0);
    }

    pub fn write_names<'a>(&mut self, names: impl Iterator<Item = &'a str>) {
        for name in names {
            self.write_str(name);
        }
        self.write_separator();
    }

    pub fn write_bool(&mut self, value: bool) {
        self.0.write_u8(value as u8);
    }

    pub fn write_separator(&mut self) {
        self.0.write_u8(UNIT_SEPARATOR);
    }

    pub fn finish(&self) -> Signature {
        Signature(self.0.finish())
    }
}
