mod framing;
mod worker;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::reading::SensorReading;

pub use framing::LineBuffer;
pub use worker::run;

/// Jak dlouho `stop()` čeká na doběhnutí smyčky, než ji ukončí násilně.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum StreamEvent {
    Reading(SensorReading),
    Status(ConnectionState),
    /// Řádek, který nešlo dekódovat (`Decode`) nebo mu chybí pole (`Validation`).
    Malformed { line: String, reason: StreamError },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Odpojeno, klient se nepřipojuje.
    Idle,
    Connecting,
    Connected,
    Disconnected(DisconnectReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    Refused,
    Timeout,
    PeerClosed,
    Transport(String),
    Other(String),
}

impl From<&StreamError> for DisconnectReason {
    fn from(e: &StreamError) -> Self {
        match e {
            StreamError::ConnectRefused => DisconnectReason::Refused,
            StreamError::ConnectTimeout => DisconnectReason::Timeout,
            StreamError::Transport(e) => DisconnectReason::Transport(e.to_string()),
            other => DisconnectReason::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Monitorování zastaveno"),
            ConnectionState::Connecting => write!(f, "Připojuji..."),
            ConnectionState::Connected => write!(f, "Připojeno"),
            ConnectionState::Disconnected(reason) => write!(f, "Odpojeno ({})", reason),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Refused => write!(f, "odmítnuto"),
            DisconnectReason::Timeout => write!(f, "timeout"),
            DisconnectReason::PeerClosed => write!(f, "server zavřel spojení"),
            DisconnectReason::Transport(msg) => write!(f, "chyba přenosu: {}", msg),
            DisconnectReason::Other(msg) => write!(f, "chyba: {}", msg),
        }
    }
}

/// Signál pro zastavení smyčky z libovolného vlákna.
#[derive(Clone, Debug)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Worker {
    thread: thread::JoinHandle<()>,
    task: tokio::task::AbortHandle,
    done: mpsc::Receiver<()>,
}

/// Vlastník vlákna se smyčkou TCP klienta.
pub struct StreamClient {
    config: StreamConfig,
    running: Arc<AtomicBool>,
    worker: Option<Worker>,
}

impl StreamClient {
    pub fn new(config: StreamConfig) -> Self {
        Self { config, running: Arc::new(AtomicBool::new(false)), worker: None }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some() && self.running.load(Ordering::SeqCst)
    }

    /// Handle patří k aktuálnímu běhu; `start()` založí pro každý běh nový
    /// příznak, takže handle ze staršího běhu nový běh nezastaví.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.running.clone())
    }

    /// Spustí smyčku na vlastním vlákně. Druhé volání bez `stop()` vrací
    /// `StreamError::AlreadyRunning`.
    pub fn start(&mut self, sink: Sender<StreamEvent>) -> Result<(), StreamError> {
        if self.is_running() {
            return Err(StreamError::AlreadyRunning);
        }
        // smyčka mohla skončit sama (zavřený kanál)
        self.stop();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(StreamError::Runtime)?;

        self.running = Arc::new(AtomicBool::new(true));
        let task = runtime.spawn(run(self.config.clone(), self.running.clone(), sink));
        let abort = task.abort_handle();
        let (done_tx, done_rx) = mpsc::channel();

        let spawned = thread::Builder::new().name("tcp-client".into()).spawn(move || {
            match runtime.block_on(task) {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => warn!("Smyčka TCP klienta byla násilně ukončena."),
                Err(e) => error!("Smyčka TCP klienta spadla: {}", e),
            }
            let _ = done_tx.send(());
        });

        match spawned {
            Ok(thread) => {
                info!("TCP klient spuštěn pro {}.", self.config.address());
                self.worker = Some(Worker { thread, task: abort, done: done_rx });
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(StreamError::Runtime(e))
            }
        }
    }

    /// Zastaví smyčku a počká na vlákno nejdéle `JOIN_TIMEOUT`, pak smyčku
    /// ukončí násilně. Opakované volání nic nedělá.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let Some(worker) = self.worker.take() else {
            return;
        };

        info!("Zastavuji TCP klienta.");
        if let Err(RecvTimeoutError::Timeout) = worker.done.recv_timeout(JOIN_TIMEOUT) {
            warn!("TCP klient se neukončil včas, vynucuji ukončení.");
            worker.task.abort();
            if let Err(RecvTimeoutError::Timeout) = worker.done.recv_timeout(JOIN_TIMEOUT) {
                error!("Vlákno TCP klienta neodpovídá, odpojuji ho.");
                return;
            }
        }
        if worker.thread.join().is_err() {
            error!("Vlákno TCP klienta skončilo panikou.");
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.stop();
    }
}
