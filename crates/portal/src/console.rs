//! Line-oriented command interpreter for the portal console.

use std::sync::Arc;

use anyhow::{bail, Context};

use courseport_client::api::LockTransport as _;
use courseport_client::auth::SessionAuth;
use courseport_client::scheduler::SchedulerHandle;
use courseport_client::store::LockStore;
use courseport_core::locks::LockUpdate;
use courseport_core::navigation::{find_item, lockable_items, ContentItem};

use crate::render::{render_history, render_sidebar, render_status};

pub const DEFAULT_LOCK_REASON: &str = "Locked by administrator";
pub const DEFAULT_UNLOCK_REASON: &str = "Unlocked by administrator";

const HELP: &str = "\
Commands:
  login <email> <password>   sign in
  logout                     sign out and forget cached lock state
  show                       print the sidebar and lock status
  focus                      refresh lock state now
  lock <id> [reason]         lock one content item (admin)
  unlock <id> [reason]       unlock one content item (admin)
  lock-all                   lock every course day (admin)
  unlock-all                 unlock every course day (admin)
  history <id>               show the lock audit trail (admin)
  dismiss                    clear the current error message
  quit                       exit
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: String, password: String },
    Logout,
    Show,
    Focus,
    Lock { content_id: String, reason: Option<String> },
    Unlock { content_id: String, reason: Option<String> },
    LockAll,
    UnlockAll,
    History { content_id: String },
    Dismiss,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> anyhow::Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb {
            "login" => {
                let mut args = rest.split_whitespace();
                match (args.next(), args.next(), args.next()) {
                    (Some(email), Some(password), None) => Command::Login {
                        email: email.to_string(),
                        password: password.to_string(),
                    },
                    _ => bail!("usage: login <email> <password>"),
                }
            }
            "logout" => Command::Logout,
            "show" => Command::Show,
            "focus" => Command::Focus,
            "lock" | "unlock" => {
                let (content_id, reason) = id_and_reason(rest)
                    .with_context(|| format!("usage: {verb} <id> [reason]"))?;
                if verb == "lock" {
                    Command::Lock { content_id, reason }
                } else {
                    Command::Unlock { content_id, reason }
                }
            }
            "lock-all" => Command::LockAll,
            "unlock-all" => Command::UnlockAll,
            "history" => match rest.split_whitespace().next() {
                Some(id) => Command::History {
                    content_id: id.to_string(),
                },
                None => bail!("usage: history <id>"),
            },
            "dismiss" => Command::Dismiss,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => bail!("unknown command '{other}', try 'help'"),
        };
        Ok(Some(command))
    }
}

fn id_and_reason(rest: &str) -> Option<(String, Option<String>)> {
    let (id, reason) = match rest.split_once(char::is_whitespace) {
        Some((id, reason)) => (id, Some(reason.trim())),
        None => (rest, None),
    };
    if id.is_empty() {
        return None;
    }
    let reason = reason.filter(|r| !r.is_empty()).map(str::to_string);
    Some((id.to_string(), reason))
}

/// What the caller should do after a command.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Continue(String),
    Quit,
}

/// Executes commands against the session, the lock store, and the
/// background sync scheduler.
pub struct Console {
    auth: Arc<SessionAuth>,
    store: Arc<LockStore>,
    scheduler: SchedulerHandle,
    tree: Vec<ContentItem>,
}

impl Console {
    pub fn new(
        auth: Arc<SessionAuth>,
        store: Arc<LockStore>,
        scheduler: SchedulerHandle,
        tree: Vec<ContentItem>,
    ) -> Self {
        Self {
            auth,
            store,
            scheduler,
            tree,
        }
    }

    /// The sidebar and status as the current user sees them.
    pub async fn view(&self) -> String {
        let cache = self.store.snapshot().await;
        let mut out = render_sidebar(&self.tree, &cache, self.auth.is_admin());
        out.push('\n');
        out.push_str(&render_status(&cache));
        out
    }

    pub async fn execute(&self, command: Command) -> anyhow::Result<Outcome> {
        let output = match command {
            Command::Login { email, password } => {
                let user = self.auth.login(&email, &password).await?;
                format!("Signed in as {} ({})\n", user.name, user.role)
            }
            Command::Logout => {
                self.auth.logout();
                self.store.reset().await;
                "Signed out\n".to_string()
            }
            Command::Show => self.view().await,
            Command::Focus => {
                self.scheduler.notify_focus();
                "Refreshing lock state\n".to_string()
            }
            Command::Lock { content_id, reason } => {
                self.set_lock(&content_id, true, reason.as_deref().unwrap_or(DEFAULT_LOCK_REASON))
                    .await?
            }
            Command::Unlock { content_id, reason } => {
                self.set_lock(&content_id, false, reason.as_deref().unwrap_or(DEFAULT_UNLOCK_REASON))
                    .await?
            }
            Command::LockAll => self.set_all(true, DEFAULT_LOCK_REASON).await?,
            Command::UnlockAll => self.set_all(false, DEFAULT_UNLOCK_REASON).await?,
            Command::History { content_id } => {
                self.require_admin()?;
                let entries = self.store.transport().fetch_history(&content_id).await?;
                render_history(&content_id, &entries)
            }
            Command::Dismiss => {
                self.store.clear_error().await;
                String::new()
            }
            Command::Help => HELP.to_string(),
            Command::Quit => return Ok(Outcome::Quit),
        };
        Ok(Outcome::Continue(output))
    }

    /// Stop background sync.
    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
    }

    // ---- private helpers ----

    fn require_admin(&self) -> anyhow::Result<()> {
        if !self.auth.is_admin() {
            bail!("administrator role required");
        }
        Ok(())
    }

    async fn set_lock(&self, content_id: &str, locked: bool, reason: &str) -> anyhow::Result<String> {
        self.require_admin()?;
        let item = find_item(&self.tree, content_id)
            .with_context(|| format!("no content item '{content_id}'"))?;

        let record = self.store.update_lock(content_id, locked, Some(reason)).await?;
        let state = if record.is_locked { "locked" } else { "unlocked" };
        Ok(format!("{} is now {state}\n", item.title))
    }

    async fn set_all(&self, locked: bool, reason: &str) -> anyhow::Result<String> {
        self.require_admin()?;
        let updates: Vec<LockUpdate> = lockable_items(&self.tree)
            .into_iter()
            .map(|item| LockUpdate::new(item.id.clone(), locked))
            .collect();

        self.store.batch_update_locks(&updates, Some(reason)).await?;
        let state = if locked { "locked" } else { "unlocked" };
        Ok(format!("{} course days {state}\n", updates.len()))
    }
}
