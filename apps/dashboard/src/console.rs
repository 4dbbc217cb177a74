//! Terminal collaborators: stdin prompts, the navigator, and notification
//! output.

use std::{
    io::{self, BufRead, Write},
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use client_core::{
    Confirmation, Navigator, NotificationLevel, NotificationReceiver, Route, ViewSnapshot,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Prints `prompt` and reads one line from stdin. `None` on end of input.
pub async fn read_line(prompt: String) -> Result<Option<String>> {
    tokio::task::spawn_blocking(move || -> io::Result<Option<String>> {
        let mut stdout = io::stdout();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        Ok((read > 0).then(|| line.trim_end_matches(&['\r', '\n'][..]).to_string()))
    })
    .await
    .context("stdin reader task failed")?
    .context("failed to read from stdin")
}

/// Asks on the terminal; `assume_yes` answers for the next prompts instead.
#[derive(Default)]
pub struct StdinConfirm {
    assume_yes: AtomicBool,
}

impl StdinConfirm {
    pub fn assume_yes(&self, yes: bool) {
        self.assume_yes.store(yes, Ordering::SeqCst);
    }
}

#[async_trait]
impl Confirmation for StdinConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes.load(Ordering::SeqCst) {
            return true;
        }
        match read_line(format!("{prompt} [y/N] ")).await {
            Ok(Some(answer)) => is_yes(&answer),
            Ok(None) => false,
            Err(err) => {
                warn!("confirmation prompt failed: {err:#}");
                false
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

pub struct ConsoleNavigator {
    route: Mutex<Route>,
}

impl ConsoleNavigator {
    pub fn new(initial: Route) -> Self {
        Self {
            route: Mutex::new(initial),
        }
    }
}

impl Navigator for ConsoleNavigator {
    fn current(&self) -> Route {
        *self.route.lock()
    }

    fn navigate(&self, route: Route) {
        let mut current = self.route.lock();
        if *current != route {
            debug!(from = ?*current, to = ?route, "navigation");
            *current = route;
        }
    }
}

/// Writes every queued notification, oldest first, without waiting for more.
pub fn write_pending(
    notifications: &mut NotificationReceiver,
    out: &mut impl Write,
) -> io::Result<()> {
    while let Ok(notification) = notifications.try_recv() {
        let tag = match notification.level {
            NotificationLevel::Info => "info",
            NotificationLevel::Success => "ok",
            NotificationLevel::Error => "error",
        };
        writeln!(out, "[{tag}] {}", notification.message)?;
    }
    Ok(())
}

pub fn print_view(view: &ViewSnapshot) {
    match view.search {
        Some(_) => println!("{}", view.heading()),
        None => println!("{} ({})", view.heading(), view.filter_mode),
    }
    if let Some(error) = &view.error {
        println!("  {error}");
    }
    if view.items.is_empty() {
        println!("  No sweets found");
        return;
    }
    println!(
        "  {:<38} {:<24} {:<16} {:>10} {:>9}",
        "ID", "NAME", "CATEGORY", "PRICE", "STOCK"
    );
    for item in &view.items {
        let stock = if item.is_available() {
            item.quantity.to_string()
        } else {
            "sold out".to_string()
        };
        println!(
            "  {:<38} {:<24} {:<16} {:>10.2} {:>9}",
            item.id.as_str(),
            item.name,
            item.category,
            item.price,
            stock
        );
    }
}
