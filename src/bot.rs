//! # bot — command phase
//!
//! Drains the Telegram update queue once per run:
//!
//! 1. Load the cursor (`telegram_offset.json`) and fetch updates after it.
//! 2. Drop anything not sent by the allowed user.
//! 3. Parse → execute → reply, one message at a time.
//! 4. Persist the cursor so the same update is never applied twice.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::commands::{self, Command};
use crate::config::Config;
use crate::error::AppError;
use crate::registry::PositionRegistry;
use crate::storage::{load_json, save_json};
use crate::telegram::{Notifier, TelegramClient, Update};

// ─── BotCursor ────────────────────────────────────────────────────────────────

/// Highest update id already handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotCursor {
    #[serde(default)]
    pub last_update_id: Option<i64>,
}

impl BotCursor {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        load_json(path, BotCursor::default())
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        save_json(path, self)
    }

    /// Move forward to `update_id`; never backwards.
    pub fn advance(&mut self, update_id: i64) {
        if self.last_update_id.map_or(true, |last| update_id > last) {
            self.last_update_id = Some(update_id);
        }
    }
}

/// Counts for one command phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandReport {
    pub handled:      usize,
    pub unauthorized: usize,
    pub skipped:      usize,
}

// ─── Processing ───────────────────────────────────────────────────────────────

const REGISTRY_UNREADABLE: &str =
    "⚠️ holdings.json could not be read, nothing was changed. Fix the file and send the command again.";

/// Apply `updates` in order. Replies go to the chat the command came from.
///
/// `registry` is `None` when the holdings file exists but does not parse:
/// every command is then answered with an error and nothing is written.
///
/// A failing reply or a failing registry save is logged; the update still
/// counts as consumed so it is not replayed next run.
pub async fn process_updates(
    updates: Vec<Update>,
    allowed_sender: i64,
    mut registry: Option<&mut PositionRegistry>,
    notifier: &dyn Notifier,
    cursor: &mut BotCursor,
) -> CommandReport {
    let mut report = CommandReport::default();

    for update in updates {
        if cursor.last_update_id.is_some_and(|last| update.update_id <= last) {
            debug!(update_id = update.update_id, "Update already handled");
            continue;
        }
        cursor.advance(update.update_id);

        let Some(message) = update.message else {
            report.skipped += 1;
            continue;
        };

        let sender = message.sender_id();
        if sender != allowed_sender {
            debug!(update_id = update.update_id, sender, "Ignoring message from unknown sender");
            report.unauthorized += 1;
            continue;
        }

        let Some(text) = message.text.as_deref() else {
            report.skipped += 1;
            continue;
        };

        let reply = match Command::parse(text) {
            Ok(command) => {
                debug!(?command, "Command received");
                match registry.as_mut() {
                    Some(registry) => match commands::execute(registry, command) {
                        Ok(reply) => reply,
                        Err(e) => {
                            error!(error = %e, "Command failed");
                            "⚠️ Could not save your change, please try again.".to_string()
                        }
                    },
                    None => REGISTRY_UNREADABLE.to_string(),
                }
            }
            Err(e) => {
                info!(error = %e, text, "Rejected command");
                e.reply()
            }
        };
        report.handled += 1;

        let chat_id = message.chat.id.to_string();
        if let Err(e) = notifier.send(&chat_id, &reply).await {
            warn!(error = %e, chat_id = %chat_id, "Reply not delivered");
        }
    }

    report
}

/// One full command phase against the live bot.
pub async fn run_commands(config: &Config, telegram: &TelegramClient) -> Result<CommandReport, AppError> {
    let mut cursor = BotCursor::load(&config.offset_path)?;
    let updates = telegram.get_updates(cursor.last_update_id).await?;
    if updates.is_empty() {
        debug!("No pending Telegram updates");
        return Ok(CommandReport::default());
    }

    let mut registry = match PositionRegistry::load(&config.holdings_path) {
        Ok(registry) => Some(registry),
        Err(e) => {
            error!(path = %config.holdings_path.display(), error = %e, "❌ Holdings file unreadable — commands will not modify it");
            None
        }
    };
    let report = process_updates(updates, config.allowed_user_id, registry.as_mut(), telegram, &mut cursor).await;
    cursor.save(&config.offset_path)?;

    info!(
        handled = report.handled,
        unauthorized = report.unauthorized,
        skipped = report.skipped,
        last_update_id = ?cursor.last_update_id,
        "🤖 Commands processed"
    );
    Ok(report)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
