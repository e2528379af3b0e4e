mod common;

use common::test_state;
use myrvm::cli::Confirm;
use myrvm::cli::cache::{self, CacheAction};
use myrvm::cli::session::{self, ManageAction, ManageOptions};
use myrvm_cache::Ttl;
use myrvm_cache::keys::no_params;
use myrvm_core::{RvmId, UserId};
use myrvm_session::NewSession;
use serde_json::json;

struct Answer(bool);

impl Confirm for Answer {
    fn confirm(&self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(self.0)
    }
}

fn text(out: Vec<u8>) -> String {
    String::from_utf8(out).unwrap()
}

#[test]
fn test_unknown_actions_list_alternatives() {
    let err = "purge".parse::<CacheAction>().unwrap_err();
    assert!(err.contains("warm, clear, stats, clear-prefix"));
    let err = "purge".parse::<ManageAction>().unwrap_err();
    assert!(err.contains("cleanup, stats, list, clear"));
}

#[tokio::test]
async fn test_cache_warm_reports_each_warmer() {
    let state = test_state();
    let mut out = Vec::new();

    cache::run(&state.cache, CacheAction::Warm, None, &mut out)
        .await
        .unwrap();

    let text = text(out);
    assert!(text.contains("  - config: Success"));
    assert!(text.contains("  - session_stats: Success"));
}

#[tokio::test]
async fn test_cache_clear_prefix_requires_prefix() {
    let state = test_state();
    let mut out = Vec::new();

    let err = cache::run(&state.cache, CacheAction::ClearPrefix, None, &mut out)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Prefix is required"));

    state
        .cache
        .put("rvm", "list", &no_params(), &json!([1]), Ttl::Medium)
        .await
        .unwrap();
    let mut out = Vec::new();
    cache::run(&state.cache, CacheAction::ClearPrefix, Some("rvm"), &mut out)
        .await
        .unwrap();
    assert!(text(out).contains("(1 keys removed)"));
}

#[tokio::test]
async fn test_cache_stats_prints_table() {
    let state = test_state();
    let mut out = Vec::new();

    cache::run(&state.cache, CacheAction::Stats, None, &mut out)
        .await
        .unwrap();

    let text = text(out);
    assert!(text.contains("Used Memory"));
    assert!(text.contains("Hit Rate"));
    assert!(text.contains("0.00%"));
}

#[tokio::test]
async fn test_session_cleanup_dry_run_deletes_nothing() {
    let state = test_state();
    state
        .sessions
        .create_session(NewSession::for_rvm(RvmId::new(7)))
        .await
        .unwrap();
    let mut out = Vec::new();

    session::cleanup(&state.sessions, true, false, &Answer(true), &mut out)
        .await
        .unwrap();

    let text = text(out);
    assert!(text.contains("DRY RUN"));
    assert!(text.contains("Expired sessions that would be removed: 0"));
    assert_eq!(state.sessions.list_sessions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_session_clear_respects_confirmation() {
    let state = test_state();
    state
        .sessions
        .create_session(NewSession::for_rvm(RvmId::new(7)))
        .await
        .unwrap();
    let options = ManageOptions::default();

    let mut out = Vec::new();
    session::manage(&state.sessions, ManageAction::Clear, &options, &Answer(false), &mut out)
        .await
        .unwrap();
    assert!(text(out).contains("Operation cancelled."));
    assert_eq!(state.sessions.list_sessions().await.unwrap().len(), 1);

    let mut out = Vec::new();
    session::manage(&state.sessions, ManageAction::Clear, &options, &Answer(true), &mut out)
        .await
        .unwrap();
    assert!(text(out).contains("Cleared 1 sessions."));
    assert!(state.sessions.list_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_session_list_for_user() {
    let state = test_state();
    let created = state
        .sessions
        .create_session(NewSession::for_rvm(RvmId::new(7)))
        .await
        .unwrap();
    state
        .sessions
        .claim_session(&created.id, UserId::new(42))
        .await
        .unwrap();

    let options = ManageOptions {
        user_id: Some(UserId::new(42)),
        ..ManageOptions::default()
    };
    let mut out = Vec::new();
    session::manage(&state.sessions, ManageAction::List, &options, &Answer(false), &mut out)
        .await
        .unwrap();

    let text = text(out);
    assert!(text.contains("Sessions for user 42:"));
    assert!(text.contains(&created.id[..8]));
    assert!(text.contains("authorized"));

    let options = ManageOptions {
        user_id: Some(UserId::new(99)),
        ..ManageOptions::default()
    };
    let mut out = Vec::new();
    session::manage(&state.sessions, ManageAction::List, &options, &Answer(false), &mut out)
        .await
        .unwrap();
    assert!(String::from_utf8(out).unwrap().contains("No sessions found for user 99"));
}
