use crate::app::events::Event;
use crate::tracker::PlayerReport;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Feed JSON-line player reports from stdin into the device loop. Lyrics
/// keep following the last report after stdin closes, until Ctrl-C.
pub fn spawn_input_task(tx: mpsc::Sender<Event>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stdin = BufReader::new(tokio::io::stdin());
        let interrupted = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("waiting for ctrl-c failed: {e}");
            }
        };
        drive_reports(stdin, &tx, interrupted).await;
    })
}

/// Forward reports, then hold the device open until `until` completes and
/// ask it to shut down.
pub async fn drive_reports<R, F>(reader: R, tx: &mpsc::Sender<Event>, until: F)
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    match forward_reports(reader, tx).await {
        Ok(forwarded) => tracing::info!(forwarded, "player report input closed"),
        Err(e) => tracing::error!("reading player reports failed: {e}"),
    }
    until.await;
    let _ = tx.send(Event::Shutdown).await;
}

/// Forward one report per line until EOF or the receiver goes away.
/// Blank lines and `#` comments are skipped; malformed lines are logged.
pub async fn forward_reports<R>(reader: R, tx: &mpsc::Sender<Event>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_report(line) {
            Ok(report) => {
                if tx.send(Event::Player(report)).await.is_err() {
                    break;
                }
                forwarded += 1;
            }
            Err(e) => tracing::warn!("skipping malformed player report: {e}"),
        }
    }

    Ok(forwarded)
}

pub fn parse_report(line: &str) -> Result<PlayerReport, serde_json::Error> {
    serde_json::from_str(line)
}
