pub mod command;
pub mod db;
pub mod delegate;
pub mod depfile;
pub mod external;
pub mod fs;
pub mod graph;
pub mod hash;
pub mod process;
pub mod run;
pub mod scanner;
pub mod signal;
pub mod task;
pub mod value;
pub mod work;

#[cfg(test)]
mod testing;

#[cfg(not(any(windows, target_arch = "wasm32")))]
use jemallocator::Jemalloc;

#[cfg(not(any(windows, target_arch = "wasm32")))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;
