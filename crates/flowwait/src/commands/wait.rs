use anyhow::{Context, bail};
use clap::{Args, ValueEnum};
use colored::Colorize;
use flowwait_config::EndpointSection;
use flowwait_core::{Orchestrator, StatusMap, TaskHandle, TaskId};
use flowwait_http::{Diagnostic, FlowTracker, HttpSettings, HttpTransport};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// --timeout の上限（設定ファイルと同じ30日）
const MAX_TIMEOUT_SECS: u64 = flowwait_core::config::MAX_TIMEOUT.as_secs();

/// 終了コード: 失敗が確定
pub const EXIT_FAILED: i32 = 1;
/// 終了コード: タイムアウト（結果不明）
pub const EXIT_TIMED_OUT: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TaskKind {
    /// 数値のフローID (0 成功 / 1 失敗 / 2 実行中)
    Flow,
    /// 非同期リクエストID (SUCCESS / FAILED / RUNNING ...)
    AsyncRequest,
}

impl TaskKind {
    fn status_action(self) -> (&'static str, &'static str) {
        match self {
            TaskKind::Flow => ("DescribeFlow", "FlowId"),
            TaskKind::AsyncRequest => ("DescribeAsyncRequestInfo", "AsyncRequestId"),
        }
    }

    fn statuses(self) -> StatusMap {
        match self {
            TaskKind::Flow => StatusMap::flow(),
            TaskKind::AsyncRequest => StatusMap::async_request(),
        }
    }
}

#[derive(Debug, Args)]
pub struct WaitArgs {
    /// タスクID（数値ならフローID）
    pub task_id: String,
    /// タスクの種類
    #[arg(short, long, value_enum, default_value_t = TaskKind::Flow)]
    pub kind: TaskKind,
    /// 状態を問い合わせるアクション
    #[arg(long)]
    pub status_action: Option<String>,
    /// 問い合わせ時にIDを入れるフィールド名
    #[arg(long, requires = "status_action")]
    pub id_field: Option<String>,
    /// 失敗理由を調べるアクション
    #[arg(long)]
    pub diagnostic_action: Option<String>,
    /// 失敗理由の検索キー (ErrorKey)
    #[arg(long, requires = "diagnostic_action")]
    pub error_key: Option<String>,
    /// エンドポイントURL（設定ファイルより優先）
    #[arg(short, long)]
    pub endpoint: Option<String>,
    /// リージョン（設定ファイルより優先）
    #[arg(short, long)]
    pub region: Option<String>,
    /// 待機時間の上限（秒）。省略時は書き込み予算
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS))]
    pub timeout: Option<u64>,
}

fn task_id(raw: &str) -> TaskId {
    match raw.parse::<i64>() {
        Ok(n) => TaskId::Number(n),
        Err(_) => TaskId::Text(raw.to_string()),
    }
}

fn transport(args: &WaitArgs, endpoint: Option<&EndpointSection>) -> anyhow::Result<HttpTransport> {
    let url = match (&args.endpoint, endpoint) {
        (Some(url), _) => url.clone(),
        (None, Some(section)) => section.url.clone(),
        (None, None) => bail!("エンドポイントが設定されていません (--endpoint または設定ファイルの endpoint.url)"),
    };

    let mut settings = HttpSettings::new(url);
    let region = args
        .region
        .clone()
        .or_else(|| endpoint.and_then(|s| s.region.clone()));
    if let Some(region) = region {
        settings = settings.with_region(region);
    }
    if let Some(section) = endpoint {
        if let Some(var) = &section.token_env {
            settings = settings.with_token_from_env(var)?;
        }
        if let Some(timeout) = section.request_timeout() {
            settings = settings.with_request_timeout(timeout);
        }
    }

    Ok(HttpTransport::new(settings)?)
}

/// タスクを待ち、終了コードを返す
pub async fn handle(args: WaitArgs, config: Option<&Path>) -> anyhow::Result<i32> {
    let loaded = flowwait_config::load_config(config).context("設定の読み込みに失敗しました")?;
    let engine = loaded.config.engine_config()?;
    let transport = Arc::new(transport(&args, loaded.config.endpoint.as_ref())?);

    let (default_action, default_field) = args.kind.status_action();
    let action = args.status_action.as_deref().unwrap_or(default_action);
    let field = args.id_field.as_deref().unwrap_or(default_field);

    let mut tracker = FlowTracker::new(transport)
        .with_status_action(action, field)
        .with_statuses(args.kind.statuses());
    if let Some(diagnostic_action) = &args.diagnostic_action {
        let mut diagnostic = Diagnostic::new(diagnostic_action.as_str(), field);
        if let Some(key) = &args.error_key {
            diagnostic = diagnostic.with_error_key(key.as_str());
        }
        tracker = tracker.with_diagnostic(diagnostic);
    }

    let orchestrator = Orchestrator::new(engine)?;
    let budget = match args.timeout {
        Some(secs) => Duration::from_secs(secs),
        None => orchestrator.poll_budget(action, 1),
    };
    let handle = TaskHandle::new(task_id(&args.task_id), action);
    let ctx = flowwait_core::OperationContext::new(format!("wait {}", handle.id), budget);

    println!(
        "{} {} ({}, 最大{}秒)",
        "待機中:".blue(),
        handle.id.to_string().cyan(),
        action,
        budget.as_secs()
    );

    match orchestrator.await_task(&ctx, &handle, &tracker).await {
        Ok(report) => {
            println!("{} {}", "✓".green().bold(), format!("タスク {} が完了しました", handle.id).green());
            if let Some(detail) = report.detail {
                println!("  {detail}");
            }
            Ok(0)
        }
        Err(e) if e.is_outcome_unknown() => {
            eprintln!("{} {}", "⏱".yellow().bold(), e.to_string().yellow());
            Ok(EXIT_TIMED_OUT)
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            Ok(EXIT_FAILED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_id_is_flow_number() {
        assert_eq!(task_id("1234"), TaskId::Number(1234));
        assert_eq!(task_id("deal-7"), TaskId::Text("deal-7".to_string()));
    }

    #[test]
    fn test_kind_defaults() {
        assert_eq!(TaskKind::Flow.status_action(), ("DescribeFlow", "FlowId"));
        assert_eq!(
            TaskKind::AsyncRequest.statuses().resolve("KILLED"),
            Some(flowwait_core::TaskStatus::Failed)
        );
    }
}
