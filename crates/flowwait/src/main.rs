mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowwait")]
#[command(about = "クラウド操作を、終わるまで見届ける。", long_about = None)]
struct Cli {
    /// 設定ファイルのパス（省略時は自動検出）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// デバッグログを表示
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// タスク/フローが終了するまで待つ
    Wait(commands::wait::WaitArgs),
    /// 複合IDの組み立て・分解
    #[command(subcommand)]
    Id(IdCommands),
    /// 設定の確認
    #[command(subcommand)]
    Config(ConfigCommands),
    /// バージョン情報を表示
    Version,
}

#[derive(Subcommand)]
enum IdCommands {
    /// フィールドを連結して複合IDを作る
    Join {
        /// IDを構成するフィールド
        #[arg(required = true)]
        fields: Vec<String>,
        /// 区切り文字
        #[arg(short, long, default_value_t = '#')]
        separator: char,
    },
    /// 複合IDをフィールドに分解
    Split {
        /// 複合ID
        id: String,
        /// 期待するフィールド数
        #[arg(short, long)]
        fields: usize,
        /// 区切り文字
        #[arg(short, long, default_value_t = '#')]
        separator: char,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// 有効な設定を表示
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログはstderrに出力（RUST_LOGが優先）
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Version => {
            println!("flowwait {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Id(IdCommands::Join { fields, separator }) => {
            commands::id::handle_join(&fields, separator)?;
        }
        Commands::Id(IdCommands::Split {
            id,
            fields,
            separator,
        }) => {
            commands::id::handle_split(&id, fields, separator)?;
        }
        Commands::Config(ConfigCommands::Show) => {
            commands::config::handle_show(cli.config.as_deref())?;
        }
        Commands::Wait(args) => {
            let code = commands::wait::handle(args, cli.config.as_deref()).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}
