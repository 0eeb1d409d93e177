// Testovací zdroj dat: posílá každému připojenému klientovi jeden záznam
// za sekundu jako JSON ukončený `\n`.

use std::io::Write;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

const DEFAULT_ADDR: &str = "127.0.0.1:7878";

#[derive(Serialize, Clone, Debug)]
struct FeedRecord {
    timestamp: String,
    sensor_id: String,
    location: String,
    process_stage: String,
    temperature_celsius: f64,
    humidity_percent: f64,
}

fn synthetic_record(tick: u64) -> FeedRecord {
    let phase = tick as f64 / 30.0;
    FeedRecord {
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        sensor_id: "feed-01".to_string(),
        location: "inkubátor".to_string(),
        process_stage: "simulace".to_string(),
        temperature_celsius: ((27.0 + 4.0 * phase.sin()) * 10.0).round() / 10.0,
        humidity_percent: ((60.0 + 12.0 * (phase * 0.7).cos()) * 10.0).round() / 10.0,
    }
}

async fn handle_client(mut stream: TcpStream, mut rx: broadcast::Receiver<String>) {
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "?".into());
    info!("Nový klient {}.", peer);
    loop {
        match rx.recv().await {
            Ok(line) => {
                if let Err(e) = stream.write_all(line.as_bytes()).await {
                    warn!("Klient {} odpojen: {}", peer, e);
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!("Klient {} nestíhá, přeskočeno {} záznamů.", peer, skipped),
            Err(RecvError::Closed) => break,
        }
    }
    info!("Spojení s klientem {} ukončeno.", peer);
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| { writeln!(buf, "[{}] [{}] - {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"), record.level(), record.args()) })
        .init();

    let addr = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!("Zdroj dat naslouchá na {}.", addr);

    let (tx, _) = broadcast::channel::<String>(64);
    let producer_tx = tx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        let mut tick = 0u64;
        loop {
            interval.tick().await;
            match serde_json::to_string(&synthetic_record(tick)) {
                Ok(json) => {
                    debug!("Odesílám: {}", json);
                    // bez klientů se záznam zahodí
                    let _ = producer_tx.send(format!("{}\n", json));
                }
                Err(e) => error!("Nelze serializovat záznam: {}", e),
            }
            tick += 1;
        }
    });

    loop {
        let (stream, _) = listener.accept().await?;
        tokio::spawn(handle_client(stream, tx.subscribe()));
    }
}
