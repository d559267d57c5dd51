//! The `lathe` command line.

use crate::command::Command;
use crate::db::Db;
use crate::delegate::ConsoleDelegate;
use crate::depfile;
use crate::fs::{FileSystem, RealFileSystem};
use crate::graph::Graph;
use crate::scanner::Scanner;
use crate::signal;
use crate::work::{Options, Work};
use anyhow::{anyhow, bail};
use argh::FromArgs;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(FromArgs)]
/// external command runner with Makefile-style dependency discovery
struct Args {
    /// print command lines and log internal decisions
    #[argh(switch, short = 'v')]
    verbose: bool,

    #[argh(subcommand)]
    cmd: Subcommand,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Subcommand {
    Deps(DepsArgs),
    Run(RunArgs),
}

#[derive(FromArgs)]
/// print the rules of a dependency file
#[argh(subcommand, name = "deps")]
struct DepsArgs {
    /// the dependency file to parse
    #[argh(positional)]
    file: String,

    /// stop after the first rule
    #[argh(switch)]
    first_rule_only: bool,
}

#[derive(FromArgs)]
/// run a command once its inputs exist, recording its outputs
#[argh(subcommand, name = "run")]
struct RunArgs {
    /// parallelism [default from system]
    #[argh(option, short = 'j')]
    jobs: Option<usize>,

    /// an input file of the command (repeatable)
    #[argh(option, short = 'i')]
    input: Vec<String>,

    /// an output file of the command (repeatable)
    #[argh(option, short = 'o')]
    output: Vec<String>,

    /// a dependency file the command writes
    #[argh(option)]
    deps: Option<String>,

    /// description printed instead of the command line
    #[argh(option)]
    description: Option<String>,

    /// accept outputs that were modified, as long as they exist
    #[argh(switch)]
    allow_modified_outputs: bool,

    /// the command line; a single argument is run through the shell
    #[argh(positional)]
    command: Vec<String>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "lathe=debug" } else { "lathe=warn" };
    let filter = EnvFilter::try_from_env("LATHE_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_deps(args: &DepsArgs) -> anyhow::Result<i32> {
    let fs = RealFileSystem::new();
    let data = fs
        .read(&args.file)
        .map_err(|err| anyhow!("read {}: {}", args.file, err))?;
    let collected = depfile::collect(&data, args.first_rule_only);
    for rule in &collected.rules {
        println!("{}:", rule.target);
        for dep in &rule.deps {
            println!("  {}", dep);
        }
    }
    if collected.errors.is_empty() {
        return Ok(0);
    }
    let scanner = Scanner::new(&data);
    for err in &collected.errors {
        eprint!("{}", scanner.format_parse_error(Path::new(&args.file), err));
    }
    Ok(1)
}

fn run_command(args: RunArgs, verbose: bool) -> anyhow::Result<i32> {
    let parallelism = match args.jobs {
        Some(n) => n,
        None => usize::from(std::thread::available_parallelism()?),
    };
    if args.output.is_empty() {
        bail!("no outputs given; use -o");
    }

    let mut graph = Graph::new();
    let mut command = Command::shell(args.output[0].clone());
    let inputs: Vec<&str> = args.input.iter().map(String::as_str).collect();
    let outputs: Vec<&str> = args.output.iter().map(String::as_str).collect();
    command.configure_inputs(graph.nodes(&inputs));
    command.configure_outputs(graph.nodes(&outputs));
    match args.command.as_slice() {
        [] => bail!("no command given"),
        [cmdline] => command.configure_attribute("args", cmdline)?,
        argv => {
            let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
            command.configure_list_attribute("args", &argv)?
        }
    }
    if let Some(deps) = &args.deps {
        command.configure_attribute("deps", deps)?;
    }
    if let Some(description) = &args.description {
        command.configure_description(description.as_str());
    }
    if args.allow_modified_outputs {
        command.configure_attribute("allow-modified-outputs", "true")?;
    }
    graph.add_command(command)?;

    let delegate = Arc::new(ConsoleDelegate::new(verbose));
    let mut db = Db::new();
    let mut work = Work::new(
        &graph,
        &mut db,
        delegate.clone(),
        Arc::new(RealFileSystem::new()),
        Options { parallelism },
    )?;
    work.want_node(&args.output[0])?;
    let summary = work.run()?;
    drop(work);

    if summary.failed > 0 || delegate.failure_count() > 0 {
        // Don't print any summary, the failing command is enough info.
        return Ok(1);
    }
    if let Some(entry) = db.get(&args.output[0]) {
        for (path, _) in &entry.discovered {
            tracing::debug!("discovered dependency {}", path);
        }
    }
    println!("lathe: ran {} commands", summary.ran);
    Ok(0)
}

pub fn run() -> anyhow::Result<i32> {
    let args: Args = argh::from_env();
    init_logging(args.verbose);
    signal::register_sigint();
    match args.cmd {
        Subcommand::Deps(deps) => print_deps(&deps),
        Subcommand::Run(run) => run_command(run, args.verbose),
    }
}
