//! Runs external processes, capturing their output.

use anyhow::bail;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Termination {
    Success,
    Interrupted,
    Failure,
}

/// How a shell command's process is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Passed to `/bin/sh -c`.
    Shell(String),
    /// Executed directly; the first element is the program.
    Argv(Vec<String>),
}

impl CommandLine {
    /// A human-readable rendering, for logs and verbose descriptions.
    pub fn display(&self) -> String {
        match self {
            CommandLine::Shell(cmdline) => cmdline.clone(),
            CommandLine::Argv(args) => args
                .iter()
                .map(|arg| {
                    if arg.contains(' ') {
                        format!("\"{}\"", arg)
                    } else {
                        arg.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

fn build_command(cmdline: &CommandLine) -> anyhow::Result<std::process::Command> {
    Ok(match cmdline {
        CommandLine::Shell(cmdline) => {
            let mut cmd = if cfg!(windows) {
                let mut cmd = std::process::Command::new("cmd");
                cmd.arg("/c");
                cmd
            } else {
                let mut cmd = std::process::Command::new("/bin/sh");
                cmd.arg("-c");
                cmd
            };
            cmd.arg(cmdline);
            cmd
        }
        CommandLine::Argv(args) => {
            let (program, rest) = match args.split_first() {
                Some(split) => split,
                None => bail!("empty argument list"),
            };
            let mut cmd = std::process::Command::new(program);
            cmd.args(rest);
            cmd
        }
    })
}

#[cfg(unix)]
fn signal_termination(status: &std::process::ExitStatus, output: &mut Vec<u8>) -> Termination {
    use std::io::Write;
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(libc::SIGINT) => {
            let _ = write!(output, "interrupted");
            Termination::Interrupted
        }
        Some(sig) => {
            let _ = write!(output, "signal {}", sig);
            Termination::Failure
        }
        None => Termination::Failure,
    }
}

#[cfg(not(unix))]
fn signal_termination(_status: &std::process::ExitStatus, _output: &mut Vec<u8>) -> Termination {
    Termination::Failure
}

/// Create a pipe whose ends are not inherited by other children we spawn.
#[cfg(unix)]
fn output_pipe() -> anyhow::Result<(std::fs::File, std::fs::File)> {
    use std::os::unix::io::FromRawFd;
    let mut fds: [libc::c_int; 2] = [0; 2];
    // Safety: on success pipe() hands us two fresh fds, which the Files own.
    let (read, write) = unsafe {
        if libc::pipe(fds.as_mut_ptr()) < 0 {
            bail!("pipe: {}", std::io::Error::last_os_error());
        }
        (
            std::fs::File::from_raw_fd(fds[0]),
            std::fs::File::from_raw_fd(fds[1]),
        )
    };
    for fd in fds {
        // Safety: fd is open and owned by one of the Files above.
        if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
            bail!("fcntl: {}", std::io::Error::last_os_error());
        }
    }
    Ok((read, write))
}

/// Run a process to completion, returning how it ended along with its
/// stdout and stderr, interleaved as the process wrote them.
/// Returns an Err() if we failed outside of the process itself.
#[cfg(unix)]
pub fn run_command(cmdline: &CommandLine) -> anyhow::Result<(Termination, Vec<u8>)> {
    use std::io::Read;
    use std::process::Stdio;

    let (mut read, write) = output_pipe()?;
    let mut cmd = build_command(cmdline)?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(write.try_clone()?))
        .stderr(Stdio::from(write));
    let mut child = cmd.spawn()?;
    // Closes our copies of the write end, so the read below sees EOF once the
    // child (and anything it forked) exits.
    drop(cmd);

    let mut output = Vec::new();
    read.read_to_end(&mut output)?;
    let status = child.wait()?;

    let termination = if status.success() {
        Termination::Success
    } else {
        signal_termination(&status, &mut output)
    };
    Ok((termination, output))
}

/// Run a process to completion, returning how it ended along with its
/// stdout and stderr, concatenated.
/// Returns an Err() if we failed outside of the process itself.
#[cfg(not(unix))]
pub fn run_command(cmdline: &CommandLine) -> anyhow::Result<(Termination, Vec<u8>)> {
    let mut cmd = build_command(cmdline)?.output()?;
    let mut output = Vec::new();
    output.append(&mut cmd.stdout);
    output.append(&mut cmd.stderr);

    let termination = if cmd.status.success() {
        Termination::Success
    } else {
        signal_termination(&cmd.status, &mut output)
    };
    Ok((termination, output))
}
