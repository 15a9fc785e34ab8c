// ===============================
// src/recorder.rs
// ===============================
//
// JSONL audit trail hasil per vault:
// - Tulis setiap Event ke file .jsonl (append).
// - Bufer dengan BufWriter agar hemat syscall.
// - Flush periodik tiap 1s dan saat channel ditutup (akhir run).
// - Otomatis membuat parent directory jika belum ada.
//
// ENV: set `RECORD_FILE=/path/to/events.jsonl` agar aktif (lihat main.rs).
//
use std::path::Path;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use crate::domain::Event;

async fn open_writer(path: &str) -> std::io::Result<BufWriter<tokio::fs::File>> {
    // Pastikan parent directory ada (kalau ada)
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

pub async fn run(mut rx: mpsc::Receiver<Event>, path: String) {
    let mut writer = match open_writer(&path).await {
        Ok(w) => w,
        Err(e) => {
            error!(?e, %path, "recorder: open failed, audit trail disabled");
            // drain supaya sender tidak pernah penuh
            while rx.recv().await.is_some() {}
            return;
        }
    };
    info!(%path, "recorder: started");

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                match maybe_ev {
                    Some(ev) => {
                        let mut line = match serde_json::to_vec(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                error!(?e, "recorder: serialize error, skip event");
                                continue;
                            }
                        };
                        line.push(b'\n');
                        if let Err(e) = writer.write_all(&line).await {
                            error!(?e, "recorder: write failed, drop event");
                        }
                    }
                    None => {
                        // Channel closed: flush dan keluar
                        if let Err(e) = writer.flush().await {
                            error!(?e, "recorder: final flush failed");
                        }
                        info!("recorder: channel closed, stopped");
                        break;
                    }
                }
            }

            _ = tick.tick() => {
                let _ = writer.flush().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;

    use super::*;
    use crate::domain::SkipReason;

    #[tokio::test]
    async fn events_are_written_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("events.jsonl");
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(run(rx, path.display().to_string()));

        tx.send(Event::VaultSkipped { block: 9, vault: Address::ZERO, reason: SkipReason::NoActivePositions })
            .await
            .unwrap();
        tx.send(Event::BlockDone { block: 9, timestamp: 100, rows: 0 }).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> =
            text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "vault_skipped");
        assert_eq!(lines[0]["reason"], "no_active_positions");
        assert_eq!(lines[1]["event"], "block_done");
        assert_eq!(lines[1]["rows"], 0);
    }
}
