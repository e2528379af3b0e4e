use anyhow::{Context, bail};
use myrvm_cache::{CacheStore, ScanPrefix};
use myrvm_core::UserId;
use myrvm_session::{SessionRecord, SessionService, SessionStats};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::cli::{Confirm, format_duration, format_timestamp, new_table, short_id};

/// `session cleanup`.
///
/// With `dry_run` only reports what would be removed.
pub async fn cleanup<S>(
    sessions: &SessionService<S>,
    dry_run: bool,
    force: bool,
    confirm: &impl Confirm,
    out: &mut impl Write,
) -> anyhow::Result<()>
where
    S: CacheStore + ScanPrefix,
{
    writeln!(out, "Starting session cleanup...")?;

    let Some(stats) = sessions.get_session_stats().await else {
        bail!("Failed to get session statistics");
    };
    writeln!(out, "Current session statistics:")?;
    print_stats(&stats, out)?;

    if dry_run {
        let preview = sessions
            .preview_cleanup()
            .await
            .context("Failed to inspect sessions")?;
        writeln!(out, "DRY RUN - No sessions will be deleted")?;
        writeln!(out, "Expired sessions that would be removed: {}", preview.expired.len())?;
        writeln!(
            out,
            "Unreadable sessions that would be removed: {}",
            preview.undecodable.len()
        )?;
        return Ok(());
    }

    if !force && !confirm.confirm("Do you want to proceed with cleanup?")? {
        writeln!(out, "Cleanup cancelled.")?;
        return Ok(());
    }

    let cleaned = sessions
        .cleanup_expired_sessions()
        .await
        .context("Cleanup failed")?;
    writeln!(out, "Cleanup completed! Cleaned {} expired sessions.", cleaned)?;

    if let Some(stats) = sessions.get_session_stats().await {
        writeln!(out, "Updated session statistics:")?;
        print_stats(&stats, out)?;
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManageAction {
    Cleanup,
    Stats,
    List,
    Clear,
}

impl ManageAction {
    pub const AVAILABLE: &'static str = "cleanup, stats, list, clear";
}

impl FromStr for ManageAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cleanup" => Ok(Self::Cleanup),
            "stats" => Ok(Self::Stats),
            "list" => Ok(Self::List),
            "clear" => Ok(Self::Clear),
            other => Err(format!(
                "Unknown action: {}\nAvailable actions: {}",
                other,
                Self::AVAILABLE
            )),
        }
    }
}

impl fmt::Display for ManageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cleanup => "cleanup",
            Self::Stats => "stats",
            Self::List => "list",
            Self::Clear => "clear",
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ManageOptions {
    pub user_id: Option<UserId>,
    pub session_id: Option<String>,
    pub force: bool,
}

/// `session manage <action>`.
pub async fn manage<S>(
    sessions: &SessionService<S>,
    action: ManageAction,
    options: &ManageOptions,
    confirm: &impl Confirm,
    out: &mut impl Write,
) -> anyhow::Result<()>
where
    S: CacheStore + ScanPrefix,
{
    match action {
        ManageAction::Cleanup => {
            let cleaned = sessions
                .cleanup_expired_sessions()
                .await
                .context("Cleanup failed")?;
            writeln!(out, "Cleaned up {} expired sessions.", cleaned)?;
        }
        ManageAction::Stats => {
            let Some(stats) = sessions.get_session_stats().await else {
                bail!("Failed to get session statistics");
            };
            writeln!(out, "Session Statistics:")?;
            print_stats(&stats, out)?;

            if !stats.sessions_by_hour.is_empty() {
                writeln!(out, "Sessions by hour:")?;
                let mut table = new_table(&["Hour", "Sessions"]);
                for (hour, count) in &stats.sessions_by_hour {
                    table.add_row(vec![format!("{}:00", hour), count.to_string()]);
                }
                writeln!(out, "{table}")?;
            }
        }
        ManageAction::List => list(sessions, options, out).await?,
        ManageAction::Clear => clear(sessions, options, confirm, out).await?,
    }

    Ok(())
}

async fn list<S>(
    sessions: &SessionService<S>,
    options: &ManageOptions,
    out: &mut impl Write,
) -> anyhow::Result<()>
where
    S: CacheStore + ScanPrefix,
{
    if let Some(session_id) = options.session_id.as_deref() {
        let record = sessions.get_session(session_id).await?;
        let ttl = sessions.get_session_ttl(session_id).await;
        print_details(&record, ttl, out)?;
        return Ok(());
    }

    let (records, empty_message) = match options.user_id {
        Some(user_id) => {
            writeln!(out, "Sessions for user {}:", user_id)?;
            (
                sessions.get_user_sessions(user_id).await,
                format!("No sessions found for user {}", user_id),
            )
        }
        None => {
            writeln!(out, "All sessions:")?;
            (
                sessions.list_sessions().await.context("Failed to list sessions")?,
                "No sessions found".to_string(),
            )
        }
    };

    if records.is_empty() {
        writeln!(out, "{}", empty_message)?;
        return Ok(());
    }

    let mut table = new_table(&["Session ID", "Status", "User", "RVM", "Created", "Last Activity"]);
    for r in &records {
        table.add_row(vec![
            short_id(&r.id),
            r.status.to_string(),
            r.user_id.map(|u| u.to_string()).unwrap_or_else(|| "Guest".to_string()),
            r.rvm_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
            format_timestamp(r.created_at),
            format_timestamp(r.last_activity),
        ]);
    }
    writeln!(out, "{table}")?;
    Ok(())
}

async fn clear<S>(
    sessions: &SessionService<S>,
    options: &ManageOptions,
    confirm: &impl Confirm,
    out: &mut impl Write,
) -> anyhow::Result<()>
where
    S: CacheStore + ScanPrefix,
{
    if let Some(session_id) = options.session_id.as_deref() {
        if sessions.delete_session(session_id).await? {
            writeln!(out, "Session {} cleared.", session_id)?;
        } else {
            writeln!(out, "Session {} not found.", session_id)?;
        }
        return Ok(());
    }

    if let Some(user_id) = options.user_id {
        let prompt = format!("Clear all sessions for user {}?", user_id);
        if !options.force && !confirm.confirm(&prompt)? {
            writeln!(out, "Operation cancelled.")?;
            return Ok(());
        }
        let removed = sessions.clear_user_sessions(user_id).await?;
        writeln!(out, "Cleared {} sessions for user {}.", removed, user_id)?;
        return Ok(());
    }

    if !options.force
        && !confirm.confirm("Are you sure you want to clear ALL sessions? This cannot be undone.")?
    {
        writeln!(out, "Operation cancelled.")?;
        return Ok(());
    }
    let removed = sessions.clear_all_sessions().await?;
    writeln!(out, "Cleared {} sessions.", removed)?;
    Ok(())
}

fn print_stats(stats: &SessionStats, out: &mut impl Write) -> std::io::Result<()> {
    let mut table = new_table(&["Metric", "Value"]);
    let rows = [
        ("Total Sessions", stats.total_sessions.to_string()),
        ("Active Sessions", stats.active_sessions.to_string()),
        ("Authorized Sessions", stats.authorized_sessions.to_string()),
        ("Guest Active Sessions", stats.guest_active_sessions.to_string()),
        ("Expired Sessions", stats.expired_sessions.to_string()),
        ("Destroyed Sessions", stats.destroyed_sessions.to_string()),
        ("User Sessions", stats.user_sessions.to_string()),
        ("Guest Sessions", stats.guest_sessions.to_string()),
        (
            "Average Duration",
            format_duration(stats.average_session_duration),
        ),
    ];
    for (name, value) in rows {
        table.add_row(vec![name.to_string(), value]);
    }

    writeln!(out, "{table}")
}

fn print_details(record: &SessionRecord, ttl: u64, out: &mut impl Write) -> std::io::Result<()> {
    let optional = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    let mut table = new_table(&["Field", "Value"]);
    let rows = [
        vec!["ID".to_string(), record.id.clone()],
        vec!["Status".to_string(), record.status.to_string()],
        vec![
            "User".to_string(),
            record
                .user_id
                .map(|u| u.to_string())
                .unwrap_or_else(|| "Guest".to_string()),
        ],
        vec!["RVM".to_string(), optional(record.rvm_id.map(|id| id.to_string()))],
        vec!["IP Address".to_string(), optional(record.ip_address.clone())],
        vec!["User Agent".to_string(), optional(record.user_agent.clone())],
        vec!["Created".to_string(), format_timestamp(record.created_at)],
        vec!["Last Activity".to_string(), format_timestamp(record.last_activity)],
        vec!["Expires".to_string(), format_timestamp(record.expires_at)],
        vec!["TTL".to_string(), format_duration(ttl)],
    ];
    for row in rows {
        table.add_row(row);
    }
    writeln!(out, "{table}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manage_actions() {
        assert_eq!("list".parse(), Ok(ManageAction::List));
        assert_eq!("clear".parse(), Ok(ManageAction::Clear));
        let err = "wipe".parse::<ManageAction>().unwrap_err();
        assert!(err.contains("Available actions: cleanup, stats, list, clear"));
    }

    #[test]
    fn test_print_stats_formats_duration() {
        let stats = SessionStats {
            total_sessions: 3,
            average_session_duration: 150,
            ..SessionStats::default()
        };
        let mut out = Vec::new();
        print_stats(&stats, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Total Sessions"));
        assert!(text.contains("3m"));
    }
}
