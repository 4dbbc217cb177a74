use std::{io, sync::Arc};

use anyhow::Result;
use clap::Parser;
use client_core::{
    ErrorKind, InventoryClient, MutationOutcome, NotificationReceiver, NotificationSink, Route,
};
use parking_lot::Mutex;
use shared::domain::{DraftPurpose, Item, ItemDraft, ItemId, SearchPredicate};
use tracing::{info, warn};

use crate::{
    cli::{split_line, Command, ShellLine},
    console::{print_view, read_line, write_pending, StdinConfirm},
};

const LOGGED_OUT_NOTICE: &str = "Logged out successfully";

/// Runs parsed commands against one client. Returns whether the command
/// succeeded; failures have already been reported to the user.
pub struct Dashboard {
    client: InventoryClient,
    confirm: Arc<StdinConfirm>,
    notifications: NotificationSink,
    pending: Mutex<NotificationReceiver>,
}

impl Dashboard {
    pub fn new(
        client: InventoryClient,
        confirm: Arc<StdinConfirm>,
        notifications: NotificationSink,
        pending: NotificationReceiver,
    ) -> Self {
        Self {
            client,
            confirm,
            notifications,
            pending: Mutex::new(pending),
        }
    }

    /// Restores a persisted session and lands on the matching route.
    pub async fn restore_session(&self) -> Result<()> {
        let restored = self.client.session.hydrate().await?;
        let route = Route::Dashboard.guard(restored);
        self.client.session.navigator().navigate(route);
        Ok(())
    }

    pub async fn execute(&self, command: Command) -> Result<bool> {
        let outcome = self.dispatch(command).await;
        self.flush_notifications();
        outcome
    }

    /// Prints queued notifications on the calling task so they keep their
    /// place relative to the list output.
    pub fn flush_notifications(&self) {
        let mut pending = self.pending.lock();
        if let Err(err) = write_pending(&mut pending, &mut io::stdout().lock()) {
            warn!("failed to print notifications: {err}");
        }
    }

    async fn dispatch(&self, command: Command) -> Result<bool> {
        let session = &self.client.session;
        let view = &self.client.view;

        match command {
            Command::Login { username, password } => {
                if Route::Login.guard(session.is_authenticated()) == Route::Dashboard {
                    println!("Already logged in as {}", self.display_name());
                    return Ok(true);
                }
                let password = self.password(&username, password).await?;
                let outcome = session.login(&username, &password).await;
                self.report_auth(outcome.success, &outcome.message);
                if outcome.success {
                    session.navigator().navigate(Route::Dashboard);
                }
                Ok(outcome.success)
            }
            Command::Register { username, password } => {
                if Route::Register.guard(session.is_authenticated()) == Route::Dashboard {
                    println!("Log out before registering a new account");
                    return Ok(false);
                }
                let password = self.password(&username, password).await?;
                let outcome = session.register(&username, &password).await;
                self.report_auth(outcome.success, &outcome.message);
                if outcome.success {
                    session.navigator().navigate(Route::Login);
                }
                Ok(outcome.success)
            }
            Command::Logout => {
                if !session.is_authenticated() {
                    println!("Not logged in");
                    return Ok(true);
                }
                session.logout().await;
                self.notifications.success(LOGGED_OUT_NOTICE);
                Ok(true)
            }
            Command::Whoami => {
                match session.current_user() {
                    Some(user) => {
                        let role = if user.is_admin() { "admin" } else { "user" };
                        println!("{} ({role}, id {})", user.username, user.user_id);
                    }
                    None if session.is_authenticated() => println!("Logged in (identity unknown)"),
                    None => println!("Not logged in"),
                }
                Ok(true)
            }
            Command::List { filter } => {
                if !self.require_session() {
                    return Ok(false);
                }
                let result = match filter {
                    Some(mode) => view.select_filter(mode).await,
                    None => view.refresh_after_mutation().await,
                };
                self.show_after(result.is_ok()).await
            }
            Command::Search(args) => {
                if !self.require_session() {
                    return Ok(false);
                }
                match view.search(&SearchPredicate::from(args)).await {
                    Err(err) if err.kind() == ErrorKind::Validation => {
                        println!("Enter at least one search field");
                        Ok(false)
                    }
                    result => self.show_after(result.is_ok()).await,
                }
            }
            Command::ClearSearch => {
                if !self.require_session() {
                    return Ok(false);
                }
                let result = view.clear_search().await;
                self.show_after(result.is_ok()).await
            }
            Command::Filter { mode } => {
                if !self.require_session() {
                    return Ok(false);
                }
                let result = view.select_filter(mode).await;
                self.show_after(result.is_ok()).await
            }
            Command::Purchase { id, quantity } => {
                if !self.require_session() {
                    return Ok(false);
                }
                let Some(item) = self.visible_item(&id).await else {
                    return Ok(false);
                };
                let outcome = self.client.mutations.purchase(&item.id, quantity).await;
                self.finish(outcome).await
            }
            Command::Restock { id, quantity } => {
                if !self.require_admin() {
                    return Ok(false);
                }
                let outcome = self
                    .client
                    .mutations
                    .restock(&ItemId::from(id.as_str()), quantity)
                    .await;
                self.finish(outcome).await
            }
            Command::Create(args) => {
                if !self.require_admin() {
                    return Ok(false);
                }
                let draft = ItemDraft::from(args);
                if !form_valid(&draft, DraftPurpose::Create) {
                    return Ok(false);
                }
                let outcome = self.client.mutations.create_item(&draft).await;
                self.finish(outcome).await
            }
            Command::Update { id, draft } => {
                if !self.require_admin() {
                    return Ok(false);
                }
                let draft = ItemDraft::from(draft);
                if !form_valid(&draft, DraftPurpose::Update) {
                    return Ok(false);
                }
                let outcome = self
                    .client
                    .mutations
                    .update_item(&ItemId::from(id.as_str()), &draft)
                    .await;
                self.finish(outcome).await
            }
            Command::Delete { id, yes } => {
                if !self.require_admin() {
                    return Ok(false);
                }
                let Some(item) = self.visible_item(&id).await else {
                    return Ok(false);
                };
                self.confirm.assume_yes(yes);
                let outcome = self.client.mutations.delete_item(&item).await;
                self.confirm.assume_yes(false);
                self.finish(outcome).await
            }
            Command::Shell => {
                println!("Already in the shell");
                Ok(true)
            }
        }
    }

    /// Reads commands until `exit` or end of input.
    pub async fn shell(&self) -> Result<bool> {
        println!("Type `help` for commands, `exit` to quit.");
        loop {
            let Some(line) = read_line("dashboard> ".to_string()).await? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if matches!(line, "exit" | "quit") {
                break;
            }

            let words = match split_line(line) {
                Ok(words) => words,
                Err(err) => {
                    println!("{err}");
                    continue;
                }
            };
            match ShellLine::try_parse_from(words) {
                Ok(parsed) => {
                    if let Err(err) = self.execute(parsed.command).await {
                        warn!("shell: command failed: {err:#}");
                        println!("error: {err:#}");
                    }
                }
                Err(err) => {
                    let _ = err.print();
                }
            }
        }
        info!("shell: closed");
        Ok(true)
    }

    fn display_name(&self) -> String {
        self.client
            .session
            .current_user()
            .map(|user| user.username)
            .unwrap_or_else(|| "unknown user".to_string())
    }

    async fn password(&self, username: &str, given: Option<String>) -> Result<String> {
        match given {
            Some(password) => Ok(password),
            None => Ok(read_line(format!("Password for {username}: "))
                .await?
                .unwrap_or_default()),
        }
    }

    fn report_auth(&self, success: bool, message: &str) {
        if success {
            self.notifications.success(message);
        } else {
            self.notifications.error(message);
        }
    }

    fn require_session(&self) -> bool {
        let authenticated = self.client.session.is_authenticated();
        if Route::Dashboard.guard(authenticated) == Route::Dashboard {
            return true;
        }
        self.client.session.navigator().navigate(Route::Login);
        println!("Please log in first");
        false
    }

    fn require_admin(&self) -> bool {
        if !self.require_session() {
            return false;
        }
        if !self.client.session.is_admin() {
            println!("This action requires an admin account");
            return false;
        }
        true
    }

    /// The item as currently displayed, refreshing the list once if it is
    /// not on screen yet.
    async fn visible_item(&self, id: &str) -> Option<Item> {
        let id = ItemId::from(id);
        if let Some(item) = self.client.view.find_item(&id).await {
            return Some(item);
        }
        if self.client.view.refresh_after_mutation().await.is_err() {
            return None;
        }
        let item = self.client.view.find_item(&id).await;
        if item.is_none() {
            println!("No sweet with id {id} in the current list");
        }
        item
    }

    async fn finish(&self, outcome: MutationOutcome) -> Result<bool> {
        match outcome {
            MutationOutcome::Applied => self.show_after(true).await,
            MutationOutcome::Cancelled => {
                println!("Cancelled");
                Ok(true)
            }
            MutationOutcome::Invalid(reason) => {
                println!("{reason}");
                Ok(false)
            }
            MutationOutcome::SessionExpired | MutationOutcome::Failed(_) => Ok(false),
        }
    }

    async fn show_after(&self, ok: bool) -> Result<bool> {
        if ok {
            self.flush_notifications();
            print_view(&self.client.view.snapshot().await);
        }
        Ok(ok)
    }
}

fn form_valid(draft: &ItemDraft, purpose: DraftPurpose) -> bool {
    match draft.validate(purpose) {
        Ok(()) => true,
        Err(errors) => {
            println!("{errors}");
            false
        }
    }
}
