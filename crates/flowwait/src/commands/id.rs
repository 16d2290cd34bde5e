use anyhow::Context;
use flowwait_core::identity;

pub fn handle_join(fields: &[String], separator: char) -> anyhow::Result<()> {
    let id = identity::join(fields, separator).context("複合IDを組み立てられません")?;
    println!("{id}");
    Ok(())
}

pub fn handle_split(id: &str, expected: usize, separator: char) -> anyhow::Result<()> {
    let fields = identity::split(id, expected, separator)
        .with_context(|| format!("複合IDを分解できません: {id}"))?;
    for field in fields {
        println!("{field}");
    }
    Ok(())
}
