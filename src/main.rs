mod blockchain;
mod server;

use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dotenvy::dotenv;
use log::info;
use tokio::net::TcpListener;
use tokio::signal;

use blockchain::{DEFAULT_DIFFICULTY, SharedChain};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(9000);

    let chain = SharedChain::new(DEFAULT_DIFFICULTY);
    info!("genesis block: {:#?}", chain.tip().await);

    let listener = TcpListener::bind((host.as_str(), port)).await?;
    println!("⛓️ Proof-of-work ledger listening on {host}:{port}");

    let shutdown = Arc::new(AtomicBool::new(false));
    tokio::select! {
        _ = server::run(listener, chain, shutdown.clone()) => {}
        _ = signal::ctrl_c() => {
            info!("shutting down");
            // Miners poll this flag, so runtime teardown never waits on a
            // blocking nonce search.
            shutdown.store(true, Ordering::Relaxed);
        }
    }
    Ok(())
}
