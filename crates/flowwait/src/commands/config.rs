use anyhow::Context;
use colored::Colorize;
use std::path::Path;

pub fn handle_show(explicit: Option<&Path>) -> anyhow::Result<()> {
    let loaded = flowwait_config::load_config(explicit).context("設定の読み込みに失敗しました")?;

    // 変換できない設定はここでエラーにする
    loaded.config.engine_config()?;

    match &loaded.source {
        Some(path) => println!("# 設定ファイル: {}", path.display().to_string().cyan()),
        None => println!("# {}", "設定ファイルなし（デフォルト値）".yellow()),
    }
    print!("{}", loaded.config.to_yaml()?);
    Ok(())
}
