use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::error::Elapsed;
use tokio::time::{sleep, timeout, Instant};

use super::framing::LineBuffer;
use super::{ConnectionState, DisconnectReason, StreamEvent};
use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::reading::parse_line;

const READ_CHUNK: usize = 4096;
const PAUSE_CHECKPOINT: Duration = Duration::from_millis(100);
/// Kolik bajtů zahozeného řádku se ukáže v události `Malformed`.
const OVERFLOW_PREVIEW: usize = 64;

struct Emitter {
    sink: Sender<StreamEvent>,
    running: Arc<AtomicBool>,
}

impl Emitter {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn send(&self, event: StreamEvent) {
        if self.sink.send(event).is_err() && self.running.swap(false, Ordering::SeqCst) {
            error!("GUI kanál je uzavřen, ukončuji TCP klienta.");
        }
    }

    fn status(&self, state: ConnectionState) {
        debug!("Stav TCP klienta: {}", state);
        self.send(StreamEvent::Status(state));
    }
}

/// Smyčka připojení, čtení a opětovného připojení.
///
/// Běží, dokud je `running` nastaveno. Příznak se kontroluje po každém
/// pokusu o připojení, po každém čtení s časovým limitem a během pauzy.
pub async fn run(config: StreamConfig, running: Arc<AtomicBool>, sink: Sender<StreamEvent>) {
    let emitter = Emitter { sink, running };
    info!("Spouštím TCP klienta pro {}.", config.address());

    while emitter.is_running() {
        emitter.status(ConnectionState::Connecting);
        match connect(&config).await {
            Ok(stream) => {
                if !emitter.is_running() {
                    close_socket(stream).await;
                    break;
                }
                info!("Připojeno k TCP serveru {}.", config.address());
                emitter.status(ConnectionState::Connected);
                if let Some(reason) = read_stream(stream, &config, &emitter).await {
                    emitter.status(ConnectionState::Disconnected(reason));
                }
            }
            Err(e) => {
                warn!("Připojení k {} selhalo: {}", config.address(), e);
                emitter.status(ConnectionState::Disconnected(DisconnectReason::from(&e)));
            }
        }
        if emitter.is_running() {
            debug!("Další pokus o připojení za {:?}.", config.reconnect_delay);
            pause(config.reconnect_delay, &emitter.running).await;
        }
    }

    let _ = emitter.sink.send(StreamEvent::Status(ConnectionState::Idle));
    info!("TCP klient ukončen.");
}

async fn connect(config: &StreamConfig) -> Result<TcpStream, StreamError> {
    classify_connect(timeout(config.connect_timeout, TcpStream::connect((config.host.as_str(), config.port))).await)
}

fn classify_connect<T>(outcome: Result<io::Result<T>, Elapsed>) -> Result<T, StreamError> {
    match outcome {
        Err(_) => Err(StreamError::ConnectTimeout),
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => Err(StreamError::ConnectRefused),
        Ok(Err(e)) if e.kind() == ErrorKind::TimedOut => Err(StreamError::ConnectTimeout),
        Ok(Err(e)) => Err(StreamError::Transport(e)),
        Ok(Ok(stream)) => Ok(stream),
    }
}

/// Čte, dokud spojení nespadne nebo nepřijde požadavek na zastavení.
/// `None` znamená zastavení.
async fn read_stream(mut stream: TcpStream, config: &StreamConfig, emitter: &Emitter) -> Option<DisconnectReason> {
    let mut lines = LineBuffer::new();
    let mut chunk = [0u8; READ_CHUNK];

    let outcome = loop {
        if !emitter.is_running() {
            break None;
        }
        match timeout(config.read_timeout, stream.read(&mut chunk)).await {
            // checkpoint
            Err(_) => continue,
            Ok(Ok(0)) => {
                info!("Server zavřel spojení.");
                break Some(DisconnectReason::PeerClosed);
            }
            Ok(Ok(n)) => {
                lines.push(&chunk[..n]);
                for event in decode_pending(&mut lines, Utc::now()) {
                    emitter.send(event);
                }
            }
            Ok(Err(e)) => {
                error!("Chyba socketu při čtení dat: {}", e);
                break Some(DisconnectReason::Transport(e.to_string()));
            }
        }
    };

    if !lines.pending().is_empty() {
        debug!("Zahazuji {} bajtů neúplného řádku.", lines.pending().len());
    }
    close_socket(stream).await;
    outcome
}

/// Vyzvedne všechny celé řádky z bufferu a převede je na události.
pub(crate) fn decode_pending(lines: &mut LineBuffer, received_at: DateTime<Utc>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    loop {
        let Some(line) = lines.next_line() else {
            if let Some(dropped) = lines.take_overflow() {
                let preview = String::from_utf8_lossy(&dropped[..dropped.len().min(OVERFLOW_PREVIEW)]).into_owned();
                let reason = StreamError::Decode(format!("řádek delší než {} bajtů", lines.limit()));
                warn!("Zahazuji příliš dlouhý řádek ({} bajtů).", dropped.len());
                events.push(StreamEvent::Malformed { line: preview, reason });
            }
            break;
        };
        match parse_line(&line, received_at) {
            Ok(Some(reading)) => {
                debug!("Přijat záznam: {:?}", reading);
                events.push(StreamEvent::Reading(reading));
            }
            Ok(None) => {}
            Err(reason) => {
                let raw = String::from_utf8_lossy(&line).trim().to_string();
                warn!("Vadný záznam '{}': {}", raw, reason);
                events.push(StreamEvent::Malformed { line: raw, reason });
            }
        }
    }
    events
}

/// Socket se zavírá jen zde a jen jednou (drop). Chybu `NotConnected`
/// z `shutdown` vrací spojení, které už druhá strana zavřela.
async fn close_socket(mut stream: TcpStream) {
    match shutdown_socket(&mut stream).await {
        Ok(()) => debug!("TCP socket uzavřen."),
        Err(StreamError::BenignCloseRace) => debug!("TCP socket již byl uzavřen druhou stranou."),
        Err(e) => warn!("Chyba při zavírání TCP socketu: {}", e),
    }
}

async fn shutdown_socket(stream: &mut TcpStream) -> Result<(), StreamError> {
    stream.shutdown().await.map_err(|e| match e.kind() {
        ErrorKind::NotConnected => StreamError::BenignCloseRace,
        _ => StreamError::Transport(e),
    })
}

async fn pause(delay: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + delay;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep((deadline - now).min(PAUSE_CHECKPOINT)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::mpsc;
    use tokio::net::TcpListener;

    fn arrival() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn stream_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        for i in 0..5 {
            bytes.extend_from_slice(
                format!(
                    "{{\"timestamp\":\"2024-05-01T10:00:0{}Z\",\"temperature_celsius\":{}.5,\"humidity_percent\":6{}.0}}\n",
                    i,
                    25 + i,
                    i
                )
                .as_bytes(),
            );
            if i % 2 == 0 {
                bytes.extend_from_slice(b"\n   \r\n");
            }
        }
        bytes
    }

    fn summarize(events: &[StreamEvent]) -> Vec<String> {
        events
            .iter()
            .map(|event| match event {
                StreamEvent::Reading(r) => format!("reading {} {:?} {:?}", r.timestamp, r.temperature_celsius, r.humidity_percent),
                StreamEvent::Malformed { line, .. } => format!("malformed {}", line),
                StreamEvent::Status(s) => format!("status {:?}", s),
            })
            .collect()
    }

    fn decode_in_chunks(bytes: &[u8], chunk_size: usize) -> Vec<StreamEvent> {
        let mut lines = LineBuffer::new();
        let mut events = Vec::new();
        for chunk in bytes.chunks(chunk_size) {
            lines.push(chunk);
            events.extend(decode_pending(&mut lines, arrival()));
        }
        events
    }

    #[test]
    fn valid_records_with_blank_lines_yield_only_readings() {
        let events = decode_in_chunks(&stream_bytes(), READ_CHUNK);
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| matches!(e, StreamEvent::Reading(_))));
    }

    #[test]
    fn chunk_boundaries_do_not_change_events() {
        let bytes = stream_bytes();
        let expected = summarize(&decode_in_chunks(&bytes, bytes.len()));
        for chunk_size in [1, 2, 3, 7, 16, 64, 100] {
            assert_eq!(summarize(&decode_in_chunks(&bytes, chunk_size)), expected, "chunk size {chunk_size}");
        }
        for split in 1..bytes.len() {
            let mut lines = LineBuffer::new();
            lines.push(&bytes[..split]);
            let mut events = decode_pending(&mut lines, arrival());
            lines.push(&bytes[split..]);
            events.extend(decode_pending(&mut lines, arrival()));
            assert_eq!(summarize(&events), expected, "split at {split}");
        }
    }

    #[test]
    fn malformed_lines_do_not_interrupt_the_stream() {
        let mut lines = LineBuffer::new();
        lines.push(b"not-json\n{\"temperature_celsius\":25.0,\"humidity_percent\":60.0}\n");
        lines.push(b"{\"timestamp\":\"2024-05-01T10:00:00Z\",\"temperature_celsius\":25.0,\"humidity_percent\":60.0}\n");
        let events = decode_pending(&mut lines, arrival());
        assert_eq!(events.len(), 3);
        match &events[0] {
            StreamEvent::Malformed { line, reason } => {
                assert_eq!(line, "not-json");
                assert!(matches!(reason, StreamError::Decode(_)));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(&events[1], StreamEvent::Malformed { reason: StreamError::Validation(_), .. }));
        assert!(matches!(&events[2], StreamEvent::Reading(_)));
    }

    #[test]
    fn partial_line_waits_for_newline() {
        let mut lines = LineBuffer::new();
        lines.push(b"{\"timestamp\":null,\"temperature_celsius\":25.0");
        assert!(decode_pending(&mut lines, arrival()).is_empty());
        lines.push(b",\"humidity_percent\":60.0}\n");
        let events = decode_pending(&mut lines, arrival());
        match events.as_slice() {
            [StreamEvent::Reading(r)] => assert_eq!(r.timestamp, arrival()),
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn pause_returns_early_when_stopped() {
        let running = AtomicBool::new(false);
        let started = Instant::now();
        pause(Duration::from_secs(10), &running).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn overlong_line_is_reported_once_and_stream_continues() {
        let mut lines = LineBuffer::with_limit(32);
        lines.push(&[b'x'; 40]);
        let events = decode_pending(&mut lines, arrival());
        match events.as_slice() {
            [StreamEvent::Malformed { line, reason: StreamError::Decode(msg) }] => {
                assert_eq!(line, &"x".repeat(40));
                assert!(msg.contains("32"));
            }
            other => panic!("unexpected events: {other:?}"),
        }

        lines.push(&[b'x'; 40]);
        assert!(decode_pending(&mut lines, arrival()).is_empty());

        lines.push(b"xx\n{\"timestamp\":null,\"temperature_celsius\":25.0,\"humidity_percent\":60.0}\n");
        let events = decode_pending(&mut lines, arrival());
        assert!(matches!(events.as_slice(), [StreamEvent::Reading(_)]));
    }

    #[tokio::test]
    async fn connect_timeout_becomes_timeout_status() {
        let outcome = timeout(Duration::from_millis(10), std::future::pending::<io::Result<()>>()).await;
        let err = classify_connect(outcome).unwrap_err();
        assert!(matches!(err, StreamError::ConnectTimeout));
        assert_eq!(DisconnectReason::from(&err), DisconnectReason::Timeout);
    }

    #[test]
    fn connect_io_errors_are_classified() {
        let refused = classify_connect::<()>(Ok(Err(io::Error::from(ErrorKind::ConnectionRefused)))).unwrap_err();
        assert_eq!(DisconnectReason::from(&refused), DisconnectReason::Refused);
        let timed_out = classify_connect::<()>(Ok(Err(io::Error::from(ErrorKind::TimedOut)))).unwrap_err();
        assert_eq!(DisconnectReason::from(&timed_out), DisconnectReason::Timeout);
        let unreachable = classify_connect::<()>(Ok(Err(io::Error::new(ErrorKind::Other, "no route")))).unwrap_err();
        assert!(matches!(unreachable, StreamError::Transport(_)));
        assert!(matches!(DisconnectReason::from(&unreachable), DisconnectReason::Transport(_)));
    }

    /// Spojení, které server hned ukončí resetem (RST).
    async fn reset_connection() -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            socket.set_linger(Some(Duration::ZERO)).unwrap();
            drop(socket);
        });
        let client = TcpStream::connect(addr).await.unwrap();
        server.await.unwrap();
        client
    }

    fn test_config() -> StreamConfig {
        StreamConfig {
            host: "127.0.0.1".into(),
            port: 0,
            reconnect_delay: Duration::from_millis(50),
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn reset_during_read_is_a_transport_disconnect() {
        let stream = reset_connection().await;
        let (tx, rx) = mpsc::channel();
        let emitter = Emitter { sink: tx, running: Arc::new(AtomicBool::new(true)) };

        let reason = timeout(Duration::from_secs(5), read_stream(stream, &test_config(), &emitter)).await.unwrap();
        assert!(matches!(reason, Some(DisconnectReason::Transport(_))), "got {reason:?}");
        assert!(emitter.is_running());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn shutdown_after_reset_is_swallowed() {
        let mut stream = reset_connection().await;
        let mut chunk = [0u8; 16];
        let read = timeout(Duration::from_secs(5), stream.read(&mut chunk)).await.unwrap();
        assert!(read.is_err());

        let result = shutdown_socket(&mut stream).await;
        assert!(matches!(result, Ok(()) | Err(StreamError::BenignCloseRace)), "got {result:?}");
        close_socket(stream).await;
    }
}
