//! Line-mode front end: redraws the request list and the selected record's
//! panels on stdout after every state change, reads operator commands from
//! stdin.

use chrono::Local;
use std::io::{self, Write};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{info, warn};
use xray_core::XrayError;
use xray_monitor::panels::Tab;
use xray_monitor::{MonitorApp, MonitorView, StoreEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Row number as displayed, 1-based.
    Select(usize),
    Deselect,
    Refresh,
    Clear,
    Quit,
    Help,
}

impl Command {
    pub fn parse(line: &str) -> Option<Command> {
        match line.trim() {
            "r" | "refresh" => Some(Command::Refresh),
            "c" | "clear" => Some(Command::Clear),
            "d" | "deselect" => Some(Command::Deselect),
            "q" | "quit" => Some(Command::Quit),
            "h" | "help" | "?" => Some(Command::Help),
            other => other
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .map(Command::Select),
        }
    }
}

const HELP: &str = "commands: <row> select | d deselect | r refresh | c clear all | q quit";

/// Drive the monitor until the operator quits, Ctrl+C, or the receiver
/// reports a fault (returned as the error).
pub async fn run(
    mut app: MonitorApp,
    refresh: Duration,
    mut fault: oneshot::Receiver<XrayError>,
) -> anyhow::Result<()> {
    app.subscribe(|event, view| {
        if matches!(event, StoreEvent::Dropped { .. }) {
            return;
        }
        let mut out = io::stdout().lock();
        if let Err(e) = draw(view, &mut out) {
            warn!(error = %e, "Console redraw failed");
        }
    });
    draw(&app.view(), &mut io::stdout().lock())?;

    let mut ticker = tokio::time::interval(refresh);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                app.tick();
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match Command::parse(&line) {
                    Some(Command::Quit) => break,
                    Some(cmd) => apply(&mut app, cmd),
                    None if line.trim().is_empty() => {}
                    None => println!("unknown command {:?}; {HELP}", line.trim()),
                },
                None => {
                    info!("Stdin closed, console input disabled");
                    stdin_open = false;
                }
            },
            result = &mut fault => {
                return match result {
                    Ok(e) => Err(e.into()),
                    Err(_) => Err(anyhow::anyhow!("receiver thread exited")),
                };
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn apply(app: &mut MonitorApp, cmd: Command) {
    match cmd {
        Command::Select(row) => {
            app.select_index(row - 1);
        }
        Command::Deselect => {
            app.select(None);
        }
        Command::Refresh => {
            app.refresh();
        }
        Command::Clear => {
            app.clear_all();
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
}

/// Write the whole screen: list, then every panel grouped by tab.
pub fn draw(view: &MonitorView<'_>, out: &mut impl Write) -> io::Result<()> {
    let selected = view.selected().map(|r| r.request_id.as_str());

    writeln!(out, "══ X-Ray ══ {}", Local::now().format("%H:%M:%S"))?;
    let mut rows = 0;
    for (row, entry) in view.entries().enumerate() {
        let marker = if Some(entry.request_id.as_str()) == selected { '>' } else { ' ' };
        writeln!(
            out,
            "{marker} {:>3}  {}  ({})",
            row + 1,
            entry.label,
            entry.received_at.with_timezone(&Local).format("%H:%M:%S")
        )?;
        rows += 1;
    }
    if rows == 0 {
        writeln!(out, "  (no requests yet)")?;
    }

    for tab in Tab::all() {
        writeln!(out, "\n── {} ──", tab.as_str().to_uppercase())?;
        for panel in view.panels().iter().filter(|p| p.tab == *tab) {
            writeln!(out, "[{}] ({})", panel.title, panel.lexer.as_str())?;
            writeln!(out, "{}", panel.body)?;
        }
    }
    writeln!(out, "\n{HELP}")?;
    out.flush()
}
