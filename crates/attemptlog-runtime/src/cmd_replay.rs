//! `attemptlog replay` / `attemptlog todos`: feed a recorded patch log through
//! the same adapter channel a live stream would use.

use std::path::Path;

use anyhow::{Context, bail};
use tracing::info;

use attemptlog_core::config::FeedConfig;
use attemptlog_projection::AttemptFeed;
use attemptlog_source::{ChannelPatchSource, DecodedLog, PatchSource, read_log};

use crate::display;

/// Load the config file if one was given, defaults otherwise.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<FeedConfig> {
    match path {
        Some(path) => FeedConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(FeedConfig::default()),
    }
}

/// Replay every batch of `log` for `session` into a fresh feed.
pub async fn replay_log(
    config: &FeedConfig,
    log: DecodedLog,
    session: Option<&str>,
) -> anyhow::Result<AttemptFeed> {
    let Some(session_id) = session.or_else(|| log.first_session()).map(str::to_owned) else {
        bail!("patch log contains no batches and no --session was given");
    };

    let source = ChannelPatchSource::default();
    let mut rx = source.subscribe(&session_id);
    let mut feed = AttemptFeed::new(config);
    feed.switch_session(Some(session_id.clone()));

    let DecodedLog { batches, skipped } = log;
    let total = batches.len();
    let producer = async {
        for batch in batches {
            source.publish(batch).await;
        }
        source.unsubscribe(&session_id);
    };
    let ((), applied) = tokio::join!(producer, feed.pump(&mut rx));

    info!(
        %session_id,
        applied,
        ignored = total - applied,
        skipped_lines = skipped,
        entries = feed.entries().len(),
        "replay finished"
    );
    Ok(feed)
}

async fn load_feed(
    file: &Path,
    session: Option<&str>,
    config: &FeedConfig,
) -> anyhow::Result<AttemptFeed> {
    let log = read_log(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    replay_log(config, log, session).await
}

pub async fn cmd_replay(
    file: &Path,
    session: Option<&str>,
    json: bool,
    config: &FeedConfig,
) -> anyhow::Result<()> {
    let feed = load_feed(file, session, config).await?;
    let entries = feed.entries();

    if json {
        println!("{}", serde_json::to_string_pretty(&*entries)?);
    } else {
        for entry in entries.iter() {
            println!("{}", display::format_entry(entry));
        }
    }
    Ok(())
}

pub async fn cmd_todos(
    file: &Path,
    session: Option<&str>,
    config: &FeedConfig,
) -> anyhow::Result<()> {
    let feed = load_feed(file, session, config).await?;
    println!("{}", serde_json::to_string_pretty(&feed.todos())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use attemptlog_source::decode_log;

    const LOG: &str = r#"{"sessionId":"a","mode":"initial","loading":true,"patches":[{"type":"STDOUT","content":"one","patchKey":"k1","executionProcessId":"p1","ts":10}]}
{"sessionId":"b","mode":"initial","patches":[{"type":"STDOUT","content":"elsewhere","patchKey":"k1","executionProcessId":"p2","ts":1}]}
{"sessionId":"a","mode":"running","patches":[{"type":"NORMALIZED_ENTRY","content":{"entry_type":{"type":"tool_use","action_type":{"action":"todo_management","todos":[{"content":"ship it","status":"pending"}]}},"content":"","timestamp":null},"patchKey":"k2","executionProcessId":"p1","ts":20}]}
"#;

    #[tokio::test]
    async fn replay_follows_first_session_by_default() {
        let feed = replay_log(&FeedConfig::default(), decode_log(LOG), None)
            .await
            .expect("replay");

        assert_eq!(feed.session_id(), Some("a"));
        assert_eq!(feed.entries().len(), 2);
        assert_eq!(feed.todos().todos[0].content, "ship it");
    }

    #[tokio::test]
    async fn replay_can_pick_another_session() {
        let feed = replay_log(&FeedConfig::default(), decode_log(LOG), Some("b"))
            .await
            .expect("replay");

        let entries = feed.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].process_id, "p2");
    }

    #[tokio::test]
    async fn empty_log_without_session_fails() {
        let err = replay_log(&FeedConfig::default(), DecodedLog::default(), None)
            .await
            .expect_err("nothing to follow");
        assert!(err.to_string().contains("no batches"));
    }

    #[tokio::test]
    async fn demo_log_replays_with_demo_config() {
        let config = FeedConfig::from_toml_str(include_str!("../../../demos/feed.toml"))
            .expect("demo config");
        let log = decode_log(include_str!("../../../demos/attempt.jsonl"));
        assert_eq!(log.skipped, 0);

        let feed = replay_log(&config, log, None).await.expect("replay");

        let entries = feed.entries();
        assert_eq!(entries.len(), 7);
        assert_eq!(entries[0].process_name, "Setup Script");
        assert_eq!(entries[6].process_name, "Coding Agent");
        assert!(entries.iter().all(|e| e.process_id != "agent-9"));

        let pinned = feed.todos();
        assert_eq!(pinned.todos[0].status, "completed");
        assert_eq!(pinned.last_updated.as_deref(), Some("2026-02-25T12:00:06Z"));
    }

    #[test]
    fn missing_config_path_uses_defaults() {
        let config = load_config(None).expect("defaults");
        assert_eq!(config.todo.rules.len(), 1);
    }
}
