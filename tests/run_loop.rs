use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

use incubator_monitor::stream::run;
use incubator_monitor::{ConnectionState, StreamConfig, StreamEvent};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

async fn collect_readings(rx: &Receiver<StreamEvent>, wanted: usize) -> (usize, usize) {
    let (mut readings, mut malformed) = (0, 0);
    let poll = async {
        while readings < wanted {
            match rx.try_recv() {
                Ok(StreamEvent::Reading(_)) => readings += 1,
                Ok(StreamEvent::Malformed { .. }) => malformed += 1,
                Ok(StreamEvent::Status(_)) => {}
                Err(_) => sleep(Duration::from_millis(10)).await,
            }
        }
    };
    timeout(Duration::from_secs(5), poll).await.expect("readings did not arrive");
    (readings, malformed)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_emits_one_reading_per_record_regardless_of_chunking() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut payload = String::new();
        for i in 0..4 {
            payload.push_str(&format!(
                "{{\"timestamp\":\"2024-05-01T10:00:0{i}Z\",\"temperature_celsius\":37.{i},\"humidity_percent\":55}}\n"
            ));
            payload.push_str("\n");
        }
        for piece in payload.as_bytes().chunks(5) {
            socket.write_all(piece).await.unwrap();
            sleep(Duration::from_millis(1)).await;
        }
        sleep(Duration::from_secs(10)).await;
    });

    let config = StreamConfig {
        port,
        reconnect_delay: Duration::from_millis(50),
        read_timeout: Duration::from_millis(100),
        ..StreamConfig::default()
    };
    let running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = mpsc::channel();
    let task = tokio::spawn(run(config, running.clone(), tx));

    let (readings, malformed) = collect_readings(&rx, 4).await;
    assert_eq!(readings, 4);
    assert_eq!(malformed, 0);

    running.store(false, Ordering::SeqCst);
    timeout(Duration::from_secs(1), task).await.expect("loop did not stop").unwrap();

    let rest: Vec<StreamEvent> = rx.try_iter().collect();
    assert!(matches!(rest.last(), Some(StreamEvent::Status(ConnectionState::Idle))));
}
