//! Loopback harness: a real command server wired to a fake C layer and a fake ISS.

use liric::app::Liric;
use liric::network::protocol::{decode_reply, encode_line, Completion, Reply};
use liric::network::CommandServer;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

pub const ALL_HANDLERS: &str = r#"
[command.implementation]
0 = "liric::handlers::abort::AbortHandler"
1 = "liric::handlers::bias::BiasHandler"
2 = "liric::handlers::config::ConfigHandler"
3 = "liric::handlers::dark::DarkHandler"
4 = "liric::handlers::get_status::GetStatusHandler"
5 = "liric::handlers::multbias::MultbiasHandler"
6 = "liric::handlers::multdark::MultdarkHandler"
7 = "liric::handlers::multrun::MultrunHandler"
8 = "liric::handlers::reboot::RebootHandler"
"#;

/// Line protocol peer answering by command prefix; anything unscripted gets `0 ok`.
pub struct FakeCLayer {
    pub port: u16,
    received: Arc<Mutex<Vec<String>>>,
}

impl FakeCLayer {
    pub async fn start(script: Vec<(&'static str, &'static str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = received.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (read_half, mut write_half) = stream.into_split();
                let mut line = String::new();
                if BufReader::new(read_half).read_line(&mut line).await.is_err() {
                    continue;
                }
                let command = line.trim_end().to_string();
                let reply = script
                    .iter()
                    .find(|(prefix, _)| command.starts_with(prefix))
                    .map_or("0 ok", |(_, reply)| *reply);
                log.lock().unwrap().push(command);
                let _ = write_half.write_all(format!("{reply}\n").as_bytes()).await;
            }
        });
        Self { port, received }
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

/// What the fake ISS does with one request.
pub enum IssStep {
    Reply(Vec<Reply>),
    /// Keep the connection open and never answer.
    Stall,
}

pub fn iss_ok() -> IssStep {
    IssStep::Reply(vec![done("iss", Completion::success(None))])
}

pub fn done(id: &str, completion: Completion) -> Reply {
    Reply::Done {
        id: id.to_string(),
        completion,
    }
}

pub struct FakeIss {
    pub port: u16,
    requests: Arc<Mutex<Vec<serde_json::Value>>>,
    arrived: tokio::sync::Mutex<mpsc::UnboundedReceiver<()>>,
}

impl FakeIss {
    pub async fn start(script: Vec<IssStep>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = requests.clone();
        let (arrived_tx, arrived) = mpsc::unbounded_channel();
        let mut script = VecDeque::from(script);
        tokio::spawn(async move {
            let mut stalled = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                let (read_half, mut write_half) = stream.into_split();
                let mut reader = BufReader::new(read_half);
                let mut line = String::new();
                if reader.read_line(&mut line).await.is_err() {
                    continue;
                }
                log.lock()
                    .unwrap()
                    .push(serde_json::from_str(line.trim_end()).unwrap());
                let _ = arrived_tx.send(());
                match script.pop_front() {
                    Some(IssStep::Reply(replies)) => {
                        for reply in replies {
                            let _ = write_half
                                .write_all(encode_line(&reply).unwrap().as_bytes())
                                .await;
                        }
                    }
                    Some(IssStep::Stall) | None => stalled.push((reader, write_half)),
                }
            }
        });
        Self {
            port,
            requests,
            arrived: tokio::sync::Mutex::new(arrived),
        }
    }

    pub fn requests(&self) -> Vec<serde_json::Value> {
        self.requests.lock().unwrap().clone()
    }

    /// Waits until the next request has reached the ISS.
    pub async fn next_request(&self) {
        let mut arrived = self.arrived.lock().await;
        tokio::time::timeout(Duration::from_secs(2), arrived.recv())
            .await
            .expect("no ISS request arrived")
            .unwrap();
    }
}

pub struct Harness {
    pub addr: SocketAddr,
    pub liric: Arc<Liric>,
    pub exit: mpsc::UnboundedReceiver<i32>,
    pub config_path: PathBuf,
    _dir: TempDir,
}

/// Settings file text for a front end talking to the given fakes.
///
/// `top_level` lands before the first table; `tables` after the fixed sections.
pub fn settings_text(c_layer_port: u16, iss_port: u16, top_level: &str, tables: &str) -> String {
    format!(
        r#"
{top_level}

[server]
address = "127.0.0.1"
port = 0

[c_layer]
hostname = "127.0.0.1"
port_number = {c_layer_port}

[iss]
address = "127.0.0.1"
port_number = {iss_port}

[server_connection]
default_acknowledge_time = 60000
min_acknowledge_time = 30000
abort_poll_interval_ms = 10

{tables}
"#
    )
}

impl Harness {
    /// Writes `text` to a temporary settings file and serves from it.
    pub async fn start(text: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("liric.toml");
        std::fs::write(&config_path, text).unwrap();

        let (liric, exit) = Liric::load(&config_path).unwrap();
        let server = CommandServer::bind(liric.clone()).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        Self {
            addr,
            liric,
            exit,
            config_path,
            _dir: dir,
        }
    }

    /// Sends one request line and collects every reply until the server closes the connection.
    pub async fn send(&self, line: &str) -> Vec<Reply> {
        send_line(self.addr, line).await
    }
}

pub async fn send_line(addr: SocketAddr, line: &str) -> Vec<Reply> {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    write_half
        .write_all(format!("{line}\n").as_bytes())
        .await
        .unwrap();
    let mut lines = BufReader::new(read_half).lines();
    let mut replies = Vec::new();
    let read_all = async {
        while let Some(line) = lines.next_line().await.unwrap() {
            replies.push(decode_reply(&line).unwrap());
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read_all)
        .await
        .expect("server did not close the connection");
    replies
}

/// The single DONE in `replies`, which must also be the last reply.
pub fn completion(replies: &[Reply]) -> &Completion {
    let dones = replies
        .iter()
        .filter(|reply| matches!(reply, Reply::Done { .. }))
        .count();
    assert_eq!(dones, 1, "expected exactly one DONE in {replies:?}");
    match replies.last() {
        Some(Reply::Done { completion, .. }) => completion,
        other => panic!("last reply is not DONE: {other:?}"),
    }
}

/// Acknowledge times in the order they were sent.
pub fn acknowledgements(replies: &[Reply]) -> Vec<u64> {
    replies
        .iter()
        .filter_map(|reply| match reply {
            Reply::Acknowledge {
                acknowledgement, ..
            } => Some(acknowledgement.time_to_complete),
            Reply::Done { .. } => None,
        })
        .collect()
}
