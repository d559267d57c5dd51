use crate::e2e::*;

#[cfg(unix)]
#[test]
fn runs_command() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("in", "hello")?;
    let out = space.run_expect(&mut lathe_command(vec![
        "run",
        "-i",
        "in",
        "-o",
        "sub/out",
        "--description",
        "COPY sub/out",
        "cp in sub/out",
    ]))?;
    assert_output_contains(&out, "COPY sub/out");
    assert_output_contains(&out, "lathe: ran 1 commands");
    assert_eq!(space.read("sub/out")?, b"hello");
    Ok(())
}

#[cfg(unix)]
#[test]
fn argv_command() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    let out = space.run_expect(&mut lathe_command(vec![
        "-v", "run", "-o", "out", "--", "touch", "out",
    ]))?;
    assert_output_contains(&out, "touch out");
    assert!(space.read("out").is_ok());
    Ok(())
}

#[cfg(unix)]
#[test]
fn failing_command() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    let out = space.run(&mut lathe_command(vec![
        "run",
        "-o",
        "out",
        "echo oops; exit 1",
    ]))?;
    assert!(!out.status.success());
    assert_output_contains(&out, "failed: echo oops; exit 1");
    assert_output_contains(&out, "oops");
    Ok(())
}

#[test]
fn missing_input() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    let out = space.run(&mut lathe_command(vec![
        "run", "-i", "nothere", "-o", "out", "true",
    ]))?;
    assert!(!out.status.success());
    assert_stderr_contains(&out, "missing input 'nothere' and no rule to build it");
    assert_stderr_contains(&out, "cannot build 'out' due to missing input");
    Ok(())
}

#[cfg(unix)]
#[test]
fn bad_depfile_fails() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    let out = space.run(&mut lathe_command(vec![
        "run",
        "-o",
        "out",
        "--deps",
        "out.d",
        "echo garbage text > out.d && touch out",
    ]))?;
    assert!(!out.status.success());
    assert_stderr_contains(
        &out,
        "error reading dependency file 'out.d' (missing ':' following rule)",
    );
    Ok(())
}
