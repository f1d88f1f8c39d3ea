use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use log::{info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task;
use tokio::time;

use crate::blockchain::{Block, SharedChain};

const PROMPT: &str = "Enter a number:\n";
const SYNC_INTERVAL: Duration = Duration::from_secs(10);
const SYNC_HEADER: &str = "\nvvvvvvvvvv chain sync vvvvvvvvvv\n";
const SYNC_FOOTER: &str = "\n^^^^^^^^^^ end of sync ^^^^^^^^^^\n";

/// Accept connections forever, spawning a session per client. Each session
/// shares the one [`SharedChain`]; `shutdown` is handed to miners so an
/// in-flight nonce search stops promptly when the process winds down.
pub async fn run(listener: TcpListener, chain: SharedChain, shutdown: Arc<AtomicBool>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("accept failed: {err}");
                continue;
            }
        };
        info!("client connected from {peer}");
        let chain = chain.clone();
        let shutdown = shutdown.clone();
        task::spawn(async move {
            if let Err(err) = handle_conn(stream, chain, shutdown).await {
                warn!("session {peer} ended with error: {err}");
            }
            info!("client {peer} disconnected");
        });
    }
}

/// One session: an input task (this future) plus a periodic sync task,
/// sharing the write half. A transport error tears down this session only.
async fn handle_conn(
    stream: TcpStream,
    chain: SharedChain,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<()> {
    let (read_half, write_half) = stream.into_split();
    let writer = Arc::new(Mutex::new(write_half));

    let sync_task = task::spawn(sync_loop(chain.clone(), writer.clone()));
    let result = input_loop(read_half, &writer, &chain, &shutdown).await;
    sync_task.abort();
    result
}

async fn input_loop(
    read_half: OwnedReadHalf,
    writer: &Arc<Mutex<OwnedWriteHalf>>,
    chain: &SharedChain,
    shutdown: &Arc<AtomicBool>,
) -> std::io::Result<()> {
    write_all(writer, PROMPT).await?;

    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(reply) = handle_line(line.trim(), chain, shutdown).await {
            write_all(writer, &reply).await?;
        }
        // A fresh prompt follows every submission, parse failures included.
        write_all(writer, PROMPT).await?;
    }
    Ok(())
}

/// Process one submitted line, returning the reply to send, if any.
/// A malformed line is reported and the session stays open; a successful
/// commit is announced through the sync push rather than a direct reply.
async fn handle_line(
    line: &str,
    chain: &SharedChain,
    shutdown: &Arc<AtomicBool>,
) -> Option<String> {
    let payload: i64 = match line.parse() {
        Ok(payload) => payload,
        Err(_) => {
            warn!("rejected non-numeric submission {line:?}");
            return Some(format!("{line:?} is not a number\n"));
        }
    };
    info!("submission: {payload}");

    // Mine against a tip snapshot with no lock held; commit re-validates
    // against the live tip.
    let tip = chain.tip().await;
    let difficulty = chain.difficulty().await;
    let cancel = shutdown.clone();
    let mined = task::spawn_blocking(move || Block::mine(&tip, payload, difficulty, &cancel))
        .await
        .ok()
        .flatten();

    let candidate = mined?; // cancelled search: wind down without a reply

    match chain.commit(candidate).await {
        Ok(len) => {
            info!("payload {payload} committed at height {}", len - 1);
            None
        }
        Err(err) => {
            warn!("candidate for payload {payload} rejected: {err}");
            Some("Invalid new block\n".to_string())
        }
    }
}

/// Push the serialized chain to the client whenever its content changes.
///
/// Wakes on commit notifications and on a fixed interval; the remembered
/// serialized form suppresses duplicate pushes either way. A lagging
/// notification receiver only skips intermediate chains, and the next wake
/// re-reads the latest state.
async fn sync_loop(chain: SharedChain, writer: Arc<Mutex<OwnedWriteHalf>>) {
    let mut changes = chain.subscribe();
    let start = time::Instant::now() + SYNC_INTERVAL;
    let mut ticker = time::interval_at(start, SYNC_INTERVAL);
    let mut last_pushed = String::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            outcome = changes.recv() => {
                if let Err(RecvError::Closed) = outcome {
                    return;
                }
            }
        }

        let snapshot = chain.snapshot().await;
        let serialized = match serde_json::to_string_pretty(&snapshot) {
            Ok(serialized) => serialized,
            Err(err) => {
                // Read-path formatting trouble must not take the process down.
                warn!("skipping sync push, chain failed to serialize: {err}");
                continue;
            }
        };
        if serialized == last_pushed {
            continue;
        }

        let framed = format!("{SYNC_HEADER}{serialized}{SYNC_FOOTER}");
        if write_all(&writer, &framed).await.is_err() {
            return;
        }
        last_pushed = serialized;
    }
}

async fn write_all(writer: &Arc<Mutex<OwnedWriteHalf>>, text: &str) -> std::io::Result<()> {
    let mut writer = writer.lock().await;
    writer.write_all(text.as_bytes()).await
}
