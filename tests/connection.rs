use nad_remote::{
    Connection, Control, NadClient, NadError, Parameter, PowerState, Request, Transport, Zone,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// What the fake amplifier does with one request line
enum Reply {
    Lines(Vec<String>),
    Delayed(Duration, Vec<String>),
    Silent,
}

fn lines(items: &[&str]) -> Reply {
    Reply::Lines(items.iter().map(|s| s.to_string()).collect())
}

struct FakeAmp {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
}

impl FakeAmp {
    async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(handler);

        let counter = connections.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let handler = handler.clone();
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut reader = BufReader::new(read);
                    let mut buf = Vec::new();
                    loop {
                        buf.clear();
                        match reader.read_until(b'\r', &mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(_) => {}
                        }
                        let request = String::from_utf8_lossy(&buf).trim().to_string();
                        if request.is_empty() {
                            continue;
                        }
                        let (delay, out) = match handler(&request) {
                            Reply::Lines(out) => (None, out),
                            Reply::Delayed(delay, out) => (Some(delay), out),
                            Reply::Silent => continue,
                        };
                        if let Some(delay) = delay {
                            tokio::time::sleep(delay).await;
                        }
                        for line in out {
                            if write.write_all(format!("{}\n", line).as_bytes()).await.is_err() {
                                return;
                            }
                        }
                    }
                });
            }
        });

        Self { addr, connections }
    }

    fn connection(&self) -> Connection {
        Connection::new(self.addr.ip().to_string(), self.addr.port())
            .with_request_timeout(Duration::from_millis(500))
            .with_probe_timeout(Duration::from_millis(200))
            .with_bulk_idle(Duration::from_millis(50))
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn main_power() -> Parameter {
    Parameter::new(Zone::Main, Control::Power)
}

#[tokio::test]
async fn test_query_round_trip() {
    let amp = FakeAmp::start(|request| match request {
        "Main.Power?" => lines(&["Main.Power=On"]),
        _ => Reply::Silent,
    })
    .await;
    let connection = amp.connection();

    assert_eq!(connection.send(&Request::query(main_power())).await.unwrap(), "On");
    assert_eq!(connection.send(&Request::query(main_power())).await.unwrap(), "On");
    assert!(connection.is_open().await);
    assert_eq!(amp.connections(), 1);
}

#[tokio::test]
async fn test_set_echoes_new_value() {
    let amp = FakeAmp::start(|request| match request.split_once('=') {
        Some((param, value)) => Reply::Lines(vec![format!("{}={}", param, value)]),
        None => Reply::Silent,
    })
    .await;
    let connection = amp.connection();

    let reply = connection.send(&Request::set(main_power(), "Off")).await.unwrap();
    assert_eq!(reply, "Off");
}

#[tokio::test]
async fn test_unsolicited_lines_are_skipped() {
    let amp = FakeAmp::start(|_| lines(&["Main.Volume=-40", "Zone2.Power=Off", "Main.Power=On"])).await;
    let connection = amp.connection();

    assert_eq!(connection.send(&Request::query(main_power())).await.unwrap(), "On");
}

#[tokio::test]
async fn test_crlf_replies() {
    let amp = FakeAmp::start(|_| lines(&["\rMain.Power=Off\r"])).await;
    let connection = amp.connection();

    assert_eq!(connection.send(&Request::query(main_power())).await.unwrap(), "Off");
}

#[tokio::test]
async fn test_empty_value_is_rejection() {
    let amp = FakeAmp::start(|_| lines(&["Zone2.Source="])).await;
    let connection = amp.connection();

    let request = Request::query(Parameter::new(Zone::Zone2, Control::Source));
    let err = connection.send(&request).await.unwrap_err();
    assert!(matches!(err, NadError::Rejected { .. }));
    // a rejection leaves the session usable
    assert!(connection.is_open().await);
}

#[tokio::test]
async fn test_banner_before_reply_is_skipped() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let amp = FakeAmp::start(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            lines(&["NAD telnet ready", "Main.Power=On"])
        } else {
            lines(&["Main.Power=Off"])
        }
    })
    .await;
    let connection = amp.connection();

    assert_eq!(connection.send(&Request::query(main_power())).await.unwrap(), "On");
    // the next request gets its own reply, not one left over from the first
    assert_eq!(connection.send(&Request::query(main_power())).await.unwrap(), "Off");
    assert_eq!(amp.connections(), 1);
}

#[tokio::test]
async fn test_noise_without_reply_times_out() {
    let amp = FakeAmp::start(|_| lines(&["garbage"])).await;
    let connection = amp.connection();

    let err = connection.send(&Request::query(main_power())).await.unwrap_err();
    assert!(matches!(err, NadError::Timeout));
    assert!(!connection.is_open().await);
}

#[tokio::test]
async fn test_invalid_request_is_not_sent() {
    let amp = FakeAmp::start(|_| lines(&["Main.Power=On"])).await;
    let connection = amp.connection();

    let request = Request::new(main_power(), nad_remote::Operator::Increment);
    assert!(matches!(
        connection.send(&request).await,
        Err(NadError::InvalidRequest(_))
    ));
    assert_eq!(amp.connections(), 0);
}

#[tokio::test]
async fn test_timeout_reconnects_without_stale_reply() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let amp = FakeAmp::start(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Reply::Delayed(Duration::from_millis(800), vec!["Main.Volume=-10".to_string()])
        } else {
            lines(&["Main.Volume=-20"])
        }
    })
    .await;
    let connection = amp.connection();
    let volume = Request::query(Parameter::new(Zone::Main, Control::Volume));

    assert!(matches!(connection.send(&volume).await, Err(NadError::Timeout)));
    assert!(!connection.is_open().await);

    assert_eq!(connection.send(&volume).await.unwrap(), "-20");
    assert_eq!(amp.connections(), 2);

    // the late reply to the first request never shows up
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(connection.send(&volume).await.unwrap(), "-20");
}

#[tokio::test]
async fn test_probe_uses_shorter_timeout() {
    let amp = FakeAmp::start(|_| Reply::Delayed(Duration::from_millis(350), vec!["Zone2.Source=1".to_string()])).await;
    let connection = amp.connection();
    let request = Request::query(Parameter::new(Zone::Zone2, Control::Source));

    assert!(matches!(connection.probe(&request).await, Err(NadError::Timeout)));
    assert_eq!(connection.send(&request).await.unwrap(), "1");
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connection = Connection::new(addr.ip().to_string(), addr.port());
    let err = connection.send(&Request::query(main_power())).await.unwrap_err();
    assert!(matches!(err, NadError::Connection(_)));
}

#[tokio::test]
async fn test_status_all_collects_table() {
    let amp = FakeAmp::start(|request| match request {
        "?" => lines(&[
            "Main.Model=C368",
            "Source1.Name=CD",
            "Source1.Enabled=Yes",
            "not a setting",
            "Main.Volume.Min=-90",
        ]),
        _ => Reply::Silent,
    })
    .await;
    let connection = amp.connection();

    let table = connection.status_all().await.unwrap();
    assert_eq!(table.get("main_model").map(String::as_str), Some("C368"));
    assert_eq!(table.get("source1_name").map(String::as_str), Some("CD"));
    assert_eq!(table.get("source1_enabled").map(String::as_str), Some("Yes"));
    assert_eq!(table.get("main_volume_min").map(String::as_str), Some("-90"));
    assert_eq!(table.len(), 4);
}

#[tokio::test]
async fn test_status_all_without_reply_times_out() {
    let amp = FakeAmp::start(|_| Reply::Silent).await;
    let connection = amp.connection();

    assert!(matches!(connection.status_all().await, Err(NadError::Timeout)));
}

#[tokio::test]
async fn test_concurrent_requests_are_paired() {
    let amp = FakeAmp::start(|request| {
        let param = request.trim_end_matches('?');
        Reply::Delayed(Duration::from_millis(20), vec![format!("{}={}", param, param.len())])
    })
    .await;
    let connection = Arc::new(amp.connection());

    let power = Request::query(main_power());
    let mode = Request::query(Parameter::new(Zone::Main, Control::ListeningMode));
    let (a, b) = tokio::join!(connection.send(&power), connection.send(&mode));

    assert_eq!(a.unwrap(), "Main.Power".len().to_string());
    assert_eq!(b.unwrap(), "Main.ListeningMode".len().to_string());
    assert_eq!(amp.connections(), 1);
}

/// Stateful fake that answers like a small amplifier without zone 2
async fn stateful_amp() -> (FakeAmp, Arc<Mutex<HashMap<String, String>>>) {
    let state: HashMap<String, String> = [
        ("Main.Model", "C368"),
        ("Main.Power", "On"),
        ("Main.Volume", "-30"),
        ("Main.Mute", "Off"),
        ("Main.Source", "1"),
        ("Main.ListeningMode", "Stereo"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let state = Arc::new(Mutex::new(state));

    let shared = state.clone();
    let amp = FakeAmp::start(move |request| {
        if request == "?" {
            return lines(&[
                "Source1.Name=CD",
                "Source1.Enabled=Yes",
                "Source2.Enabled=No",
                "Main.Volume.Min=-90",
                "Main.Volume.Max=5",
            ]);
        }
        let mut state = shared.lock().unwrap();
        if let Some(param) = request.strip_suffix('?') {
            return match state.get(param) {
                Some(value) => Reply::Lines(vec![format!("{}={}", param, value)]),
                None => Reply::Lines(vec![format!("{}=", param)]),
            };
        }
        if let Some((param, value)) = request.split_once('=') {
            state.insert(param.to_string(), value.to_string());
            return Reply::Lines(vec![format!("{}={}", param, value)]);
        }
        Reply::Silent
    })
    .await;
    (amp, state)
}

#[tokio::test]
async fn test_client_against_device() {
    let (amp, state) = stateful_amp().await;
    let client = NadClient::with_transport(amp.connection()).await.unwrap();

    assert!(!client.has_zone2().await.unwrap());
    assert_eq!(client.sources().await.unwrap(), vec!["CD".to_string()]);
    assert_eq!(client.model().await.unwrap().as_deref(), Some("C368"));

    client.set_volume_level(Zone::Main, 0.5).await.unwrap();
    assert_eq!(state.lock().unwrap().get("Main.Volume").map(String::as_str), Some("-43"));
    let level = client.volume_level(Zone::Main).await.unwrap().unwrap();
    assert!((level - 47.0 / 95.0).abs() < 1e-9);

    client.set_source(Zone::Main, "Radio").await.unwrap();
    assert_eq!(state.lock().unwrap().get("Main.Source").map(String::as_str), Some("1"));

    let snapshot = client.refresh().await.unwrap();
    let main = snapshot.zone(Zone::Main).unwrap();
    assert_eq!(main.power, PowerState::On);
    assert_eq!(main.source.as_deref(), Some("CD"));
    assert_eq!(main.muted, Some(false));
    assert!(snapshot.zone(Zone::Zone2).is_none());
    assert_eq!(amp.connections(), 1);
}
