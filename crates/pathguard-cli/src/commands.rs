//! Subcommand implementations.

use crate::{Command, Preset};
use anyhow::{bail, Context, Result};
use pathguard_policy::{Access, OperationKind, PermissionSet};
use pathguard_runtime::config::GuardConfig;
use pathguard_runtime::{
    AuditFilter, GuardError, GuardedDirectory, GuardedEntry, HttpDirectoryProvider,
    HttpPolicyStore, MemoryPolicyStore, PolicyEngine, PolicyStore, Severity, SyncMode,
};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, warn};

/// Exit code for a denied `check`.
const EXIT_DENIED: u8 = 2;

#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

/// Engine plus the settings a command needs.
pub struct Session {
    engine: Arc<PolicyEngine>,
    agent_url: Option<String>,
    remote: bool,
}

impl Session {
    /// Builds the engine, restores the cached snapshot and, with an admin
    /// server configured, pulls the current rule set.
    pub async fn open(config: &GuardConfig) -> Result<Self> {
        let store: Arc<dyn PolicyStore> = match &config.agent.admin_url {
            Some(url) => {
                let mut store = HttpPolicyStore::new(url);
                if let Some(agent_url) = &config.agent.url {
                    store = store.with_agent_url(agent_url);
                }
                Arc::new(store)
            }
            None => Arc::new(MemoryPolicyStore::new()),
        };
        let engine = Arc::new(config.engine_builder(store).build());

        if engine.restore_cached().await {
            debug!(agent = %engine.agent(), "Using cached policy");
        }

        let session = Self {
            engine,
            agent_url: config.agent.url.clone(),
            remote: config.agent.admin_url.is_some(),
        };
        if session.remote {
            session.pull().await?;
        }
        Ok(session)
    }

    async fn pull(&self) -> Result<SyncMode> {
        let mode = self.engine.refresh().await.map_err(explain_failure)?;
        if mode.is_degraded() {
            warn!(agent = %self.engine.agent(), "Admin server unreachable, using last known policy");
        }
        Ok(mode)
    }

    fn directory(&self) -> Result<GuardedDirectory<HttpDirectoryProvider>> {
        let Some(url) = &self.agent_url else {
            bail!("no agent URL configured (use --agent-url or PATHGUARD_AGENT_URL)");
        };
        Ok(GuardedDirectory::new(
            Arc::clone(&self.engine),
            HttpDirectoryProvider::new(url),
        ))
    }
}

/// Runs one subcommand against `session`.
pub async fn run(session: &Session, command: &Command, out: Output) -> Result<ExitCode> {
    let engine = &session.engine;
    match command {
        Command::Check { path, operation } => {
            let operation = OperationKind::parse(operation);
            let decision = engine.check(path, &operation);
            if out.json {
                println!(
                    "{}",
                    json!({
                        "path": engine.normalizer().normalize(path),
                        "operation": operation.as_str(),
                        "decision": decision,
                    })
                );
            } else {
                println!("{decision}");
            }
            if decision.is_denied() {
                return Ok(ExitCode::from(EXIT_DENIED));
            }
        }

        Command::Explain { path } => {
            let resolution = engine.explain(path);
            if out.json {
                println!(
                    "{}",
                    json!({
                        "path": resolution.path,
                        "source": resolution.source,
                        "inherited": resolution.is_inherited(),
                        "permissions": resolution.permissions,
                    })
                );
            } else if resolution.is_inherited() {
                println!(
                    "{} {} (inherited from {})",
                    resolution.permissions, resolution.path, resolution.source
                );
            } else {
                println!("{} {} (explicit)", resolution.permissions, resolution.path);
            }
        }

        Command::Apply {
            path,
            preset,
            allow,
        } => {
            let perms = grant(*preset, allow)?;
            let change = engine.apply_rule(path, perms).await.map_err(explain_failure)?;
            println!(
                "Rule set: {perms} {} (change {change})",
                engine.normalizer().normalize(path)
            );
        }

        Command::Reset { path } => {
            let change = engine.reset_rule(path).await.map_err(explain_failure)?;
            println!(
                "Rule reset: {} (change {change})",
                engine.normalizer().normalize(path)
            );
        }

        Command::Restricted => {
            let restricted = engine.restricted();
            if out.json {
                let items: Vec<_> = restricted
                    .iter()
                    .map(|(path, perms)| json!({ "path": path, "permissions": perms }))
                    .collect();
                println!("{}", serde_json::Value::Array(items));
            } else if restricted.is_empty() {
                println!("No restricted paths");
            } else {
                for (path, perms) in &restricted {
                    println!("{perms} {path}");
                }
            }
        }

        Command::Pull => {
            if !session.remote {
                bail!("no admin server configured (use --admin-url or PATHGUARD_ADMIN_URL)");
            }
            // Already pulled while opening the session.
            let status = engine.sync_status();
            let rules = engine.snapshot().rule_count();
            if out.json {
                println!("{}", json!({ "status": status, "rules": rules }));
            } else {
                println!("Policy {}: {rules} rule(s)", status.mode);
                if let Some(err) = &status.last_error {
                    println!("Last error: {err}");
                }
            }
        }

        Command::Browse { path } => {
            let items = session.directory()?.list(path).await?;
            print_entries(&items, out)?;
        }

        Command::Search { path, query } => {
            let items = session.directory()?.search(path, query).await?;
            print_entries(&items, out)?;
        }

        Command::Info { path } => {
            let item = session.directory()?.info(path).await?;
            print_entries(std::slice::from_ref(&item), out)?;
        }

        Command::Download {
            path,
            compress,
            output,
        } => {
            let bytes = session.directory()?.download(path, *compress).await?;
            let target = output
                .clone()
                .unwrap_or_else(|| PathBuf::from(download_name(path, *compress)));
            tokio::fs::write(&target, &bytes)
                .await
                .with_context(|| format!("write {}", target.display()))?;
            println!("Downloaded {} byte(s) to {}", bytes.len(), target.display());
        }

        Command::Delete { path } => {
            session.directory()?.delete(path).await?;
            println!("Deleted: {}", engine.normalizer().normalize(path));
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Prints audit entries at or above `min`, oldest first.
pub fn print_audit(session: &Session, min: Severity, out: Output) {
    for entry in session
        .engine
        .audit()
        .query(AuditFilter::new().min_severity(min))
    {
        if out.json {
            match serde_json::to_string(&entry) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to encode audit entry"),
            }
        } else {
            println!(
                "[{}] {} {}: {}",
                entry.severity, entry.seq, entry.path, entry.message
            );
        }
    }
}

fn grant(preset: Option<Preset>, allow: &[String]) -> Result<PermissionSet> {
    if let Some(preset) = preset {
        return Ok(match preset {
            Preset::Default => PermissionSet::console_default(),
            Preset::Blocked => PermissionSet::blocked(),
            Preset::Full => PermissionSet::full_access(),
        });
    }

    let mut access = Access::empty();
    for name in allow.iter().filter(|n| !n.trim().is_empty()) {
        let Some(flag) = OperationKind::parse(name).access() else {
            bail!("unknown capability '{name}' (read, write, download, execute, search, delete)");
        };
        access |= flag;
    }
    Ok(PermissionSet::from_access(access))
}

/// Adds a hint to failures the operator can act on.
fn explain_failure(err: GuardError) -> anyhow::Error {
    let hint = match &err {
        GuardError::PersistenceFailed { .. } => "the rule was not changed",
        GuardError::SyncRejected(_) => "the admin server refused the request",
        GuardError::InvalidPath { .. } | GuardError::InvalidOperation(_) => "nothing was changed",
    };
    anyhow::Error::new(err).context(hint)
}

/// Local file name for a download: the last path segment, `.zip` when
/// compressed.
fn download_name(raw_path: &str, compress: bool) -> String {
    let name = raw_path
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\', ':'])
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("download");
    if compress {
        format!("{name}.zip")
    } else {
        name.to_string()
    }
}

fn print_entries(items: &[GuardedEntry], out: Output) -> Result<()> {
    if out.json {
        let json = serde_json::to_string_pretty(items).context("encode listing")?;
        println!("{json}");
        return Ok(());
    }
    for item in items {
        let kind = if item.entry.is_directory { 'd' } else { '-' };
        let flag = if item.is_restricted() { " [restricted]" } else { "" };
        println!("{kind} {} {}{flag}", item.permissions, item.entry.path);
    }
    Ok(())
}
