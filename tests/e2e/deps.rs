use crate::e2e::*;

#[test]
fn prints_rules() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("out.d", "out.o: src/a.c \\\n  inc/b\\ c.h\nother: x.h\n")?;
    let out = space.run_expect(&mut lathe_command(vec!["deps", "out.d"]))?;
    assert_eq!(
        String::from_utf8_lossy(&out.stdout),
        "out.o:\n  src/a.c\n  inc/b c.h\nother:\n  x.h\n"
    );
    Ok(())
}

#[test]
fn first_rule_only() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("out.d", "out.o: a.h\nout.o: b.h\n")?;
    let out = space.run_expect(&mut lathe_command(vec![
        "deps",
        "out.d",
        "--first-rule-only",
    ]))?;
    assert_eq!(String::from_utf8_lossy(&out.stdout), "out.o:\n  a.h\n");
    Ok(())
}

#[test]
fn reports_parse_errors() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("bad.d", "out.o a.h\nok: b.h\n")?;
    let out = space.run(&mut lathe_command(vec!["deps", "bad.d"]))?;
    assert!(!out.status.success());
    // The good rule after the bad line is still reported.
    assert_output_contains(&out, "ok:\n  b.h\n");
    assert_stderr_contains(&out, "parse error: missing ':' following rule");
    assert_stderr_contains(&out, "bad.d:1: out.o a.h");
    Ok(())
}

#[test]
fn missing_file() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    let out = space.run(&mut lathe_command(vec!["deps", "nope.d"]))?;
    assert!(!out.status.success());
    assert_output_contains(&out, "lathe: error: read nope.d");
    Ok(())
}
