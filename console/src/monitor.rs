use anyhow::Context;
use aprescore::control::{spawn_dispatcher, CatalogEntry, Command, ConsoleEvent};
use aprescore::instrument::{BurstKind, HousekeepingStatus};
use aprescore::transport::HttpConnector;
use aprescore::SessionController;
use log::warn;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

use crate::report;

/// Operator input understood by the monitor.
#[derive(Debug, Clone, PartialEq)]
enum Intent {
    ShowStatus,
    ShowCatalog,
    Refresh,
    Send(Command),
    Quit,
}

fn parse_intent(line: &str) -> Result<Option<Intent>, String> {
    let intent = match line.trim().to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "status" => Intent::ShowStatus,
        "catalog" => Intent::ShowCatalog,
        "refresh" => Intent::Refresh,
        "trial" => Intent::Send(Command::Trigger(BurstKind::Trial)),
        "burst" => Intent::Send(Command::Trigger(BurstKind::Persisted)),
        "reset" => Intent::Send(Command::ResetDevice),
        "quit" | "exit" => Intent::Quit,
        other => {
            return Err(format!(
                "unknown command `{other}` (status, trial, burst, refresh, catalog, reset, quit)"
            ))
        }
    };
    Ok(Some(intent))
}

/// Latest state seen on the event stream.
#[derive(Default)]
struct View {
    status: Option<(HousekeepingStatus, usize)>,
    catalog: Vec<CatalogEntry>,
}

impl View {
    fn observe(&mut self, event: &ConsoleEvent) {
        match event {
            ConsoleEvent::StatusUpdated { status, history } => {
                self.status = Some((status.clone(), history.len()))
            }
            ConsoleEvent::CatalogRefreshed(entries) => self.catalog = entries.clone(),
            _ => {}
        }
    }
}

/// Hands the controller to a control task and relays stdin intents to it
/// until `quit`, Ctrl+C or end of input.
pub async fn run(
    controller: SessionController<HttpConnector>,
    address: String,
    key: String,
) -> anyhow::Result<()> {
    let (handle, task) = spawn_dispatcher(controller);
    let mut events = handle.subscribe();
    handle.connect(address, key)?;
    handle.refresh_catalog(None)?;

    let mut view = View::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                match parse_intent(&line) {
                    Ok(Some(Intent::Quit)) => break,
                    Ok(Some(Intent::ShowStatus)) => match &view.status {
                        Some((status, samples)) => {
                            println!("{} ({samples} samples)", report::status_line(status))
                        }
                        None => println!("no housekeeping status yet"),
                    },
                    Ok(Some(Intent::ShowCatalog)) => println!("{}", report::catalog_report(&view.catalog)),
                    Ok(Some(Intent::Refresh)) => {
                        handle.refresh_config()?;
                        handle.refresh_catalog(None)?;
                    }
                    Ok(Some(Intent::Send(command))) => handle.send(command)?,
                    Ok(None) => {}
                    Err(message) => println!("{message}"),
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    view.observe(&event);
                    println!("{}", report::event_line(&event));
                }
                Err(RecvError::Lagged(skipped)) => warn!("monitor skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = signal::ctrl_c() => break,
        }
    }

    handle.shutdown()?;
    task.await.context("control task failed")?;
    Ok(())
}
