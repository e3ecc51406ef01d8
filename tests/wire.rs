//! End-to-end tests over real TCP sockets.
//!
//! Each test binds an ephemeral port, talks the line protocol like a remote
//! console would, and asserts on the exact response lines (and, where the
//! script runtime is involved, on the telemetry the tree exposes).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use tether::script::runtime::{ERROR_KEY, STATE_KEY};
use tether::{Module, Outcome, Robot, Server};

type ResponseLines = tokio::io::Lines<BufReader<OwnedReadHalf>>;

/// A tree with the bank demo module mounted under the root.
fn bank_tree() -> Module {
    let root = Module::new("robot");
    let bank = Module::new("bank");
    bank.register("get_cash", |parameter: Option<&str>| {
        Ok(match parameter {
            Some("shleam") => Outcome::finished("1337"),
            _ => Outcome::finished("0"),
        })
    });
    root.adopt(&bank);
    root
}

async fn connect(addr: std::net::SocketAddr) -> (ResponseLines, OwnedWriteHalf) {
    let stream = TcpStream::connect(addr).await.expect("connect");
    let (read_half, write_half) = stream.into_split();
    (BufReader::new(read_half).lines(), write_half)
}

/// Send one request line and read one response line.
async fn roundtrip(
    lines: &mut ResponseLines,
    writer: &mut OwnedWriteHalf,
    request: &str,
) -> String {
    writer
        .write_all(format!("{request}\n").as_bytes())
        .await
        .expect("write request");
    timeout(Duration::from_secs(2), lines.next_line())
        .await
        .expect("Timed out waiting for a response")
        .expect("Read failed")
        .expect("Connection closed early")
}

#[tokio::test]
async fn test_bank_demo_over_the_wire() {
    let server = Server::start(0, bank_tree()).await.expect("start server");
    let (mut lines, mut writer) = connect(server.local_addr()).await;

    assert_eq!(roundtrip(&mut lines, &mut writer, "bank get_cash shleam").await, "true:1337");
    assert_eq!(roundtrip(&mut lines, &mut writer, "bank get_cash nobody").await, "true:0");

    server.shutdown();
}

#[tokio::test]
async fn test_unresolved_module_answers_not_finished() {
    let server = Server::start(0, bank_tree()).await.expect("start server");
    let (mut lines, mut writer) = connect(server.local_addr()).await;

    assert_eq!(
        roundtrip(&mut lines, &mut writer, "foo bar baz").await,
        "false:Module not found"
    );

    server.shutdown();
}

#[tokio::test]
async fn test_unknown_function_answers_an_empty_line() {
    let server = Server::start(0, bank_tree()).await.expect("start server");
    let (mut lines, mut writer) = connect(server.local_addr()).await;

    assert_eq!(roundtrip(&mut lines, &mut writer, "bank get_gold").await, "");
    // The connection is still healthy afterwards.
    assert_eq!(roundtrip(&mut lines, &mut writer, "bank get_cash shleam").await, "true:1337");

    server.shutdown();
}

#[tokio::test]
async fn test_base64_transport_is_equivalent_to_plain() {
    let server = Server::start(0, bank_tree()).await.expect("start server");
    let (mut lines, mut writer) = connect(server.local_addr()).await;

    let plain = roundtrip(&mut lines, &mut writer, "bank get_cash shleam").await;

    let wrapped = format!("base64:{}", STANDARD.encode("bank get_cash shleam"));
    let encoded = roundtrip(&mut lines, &mut writer, &wrapped).await;
    let (prefix, body) = encoded.split_once(':').expect("response separator");
    let payload = STANDARD.decode(body).expect("base64 payload");

    assert_eq!(plain, format!("{prefix}:{}", String::from_utf8_lossy(&payload)));

    server.shutdown();
}

#[tokio::test]
async fn test_multi_line_help_payload_survives_base64_transport() {
    let server = Server::start(0, bank_tree()).await.expect("start server");

    // Plain transport: the payload's own line breaks tear the response
    // apart, so only the first fragment arrives as the response line.
    let (mut lines, mut writer) = connect(server.local_addr()).await;
    assert_eq!(
        roundtrip(&mut lines, &mut writer, "bank help").await,
        "true:Showing help for module \"bank\""
    );

    // Base64 transport: the whole listing comes back in one line.
    let (mut lines, mut writer) = connect(server.local_addr()).await;
    let wrapped = format!("base64:{}", STANDARD.encode("bank help"));
    let response = roundtrip(&mut lines, &mut writer, &wrapped).await;
    let (prefix, body) = response.split_once(':').expect("response separator");
    assert_eq!(prefix, "true");
    let listing = String::from_utf8(STANDARD.decode(body).expect("base64 payload")).expect("utf8");
    assert!(listing.contains("Available functions:\r\n"));
    assert!(listing.contains("get_cash\r\n"));
    assert!(listing.contains("Adopted children:\r\n"));

    server.shutdown();
}

#[tokio::test]
async fn test_concurrent_consoles_share_one_tree() {
    let root = bank_tree();
    let hits = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&hits);
    root.register("bump", move |_: Option<&str>| {
        Ok(Outcome::finished(
            (counter.fetch_add(1, Ordering::SeqCst) + 1).to_string(),
        ))
    });
    let server = Server::start(0, root).await.expect("start server");

    let (mut lines_a, mut writer_a) = connect(server.local_addr()).await;
    let (mut lines_b, mut writer_b) = connect(server.local_addr()).await;

    let mut replies = vec![
        roundtrip(&mut lines_a, &mut writer_a, "robot bump").await,
        roundtrip(&mut lines_b, &mut writer_b, "robot bump").await,
    ];
    replies.sort();
    assert_eq!(replies, vec!["true:1", "true:2"]);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(server.connection_count(), 2);

    server.shutdown();
}

#[tokio::test]
async fn test_remote_script_lifecycle() {
    let robot = Robot::launch("robot", 0).await.expect("launch robot");
    let (mut lines, mut writer) = connect(robot.local_addr()).await;

    // Scripts span lines, so loading one remotely requires the base64
    // transport.
    let script = "s robot timer reset\na robot sleep 40\ns robot log settled";
    let wrapped = format!("base64:{}", STANDARD.encode(format!("runtime load {script}")));
    let response = roundtrip(&mut lines, &mut writer, &wrapped).await;
    let (prefix, body) = response.split_once(':').expect("response separator");
    assert_eq!(prefix, "true");
    assert_eq!(STANDARD.decode(body).expect("base64 payload"), b"Script loaded");
    assert_eq!(
        robot.autonomous().module().get(STATE_KEY).as_deref(),
        Some("loaded")
    );

    // Drive the scheduler the way a host control loop would until the
    // sleep elapses and the script drains.
    let mut state = String::new();
    for _ in 0..200 {
        robot.autonomous().next();
        state = robot
            .autonomous()
            .module()
            .get(STATE_KEY)
            .expect("state telemetry");
        if state == "finished" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(state, "finished");
    assert_eq!(
        robot.autonomous().finished(),
        vec!["s robot timer reset", "s robot log settled", "a robot sleep 40"]
    );
    assert_eq!(robot.autonomous().module().get(ERROR_KEY), None);

    robot.shutdown();
}

#[tokio::test]
async fn test_script_file_loads_and_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("auto.shleam");
    std::fs::write(&path, "s robot timer reset\ns robot timer read\n").expect("write script");

    let robot = Robot::launch("robot", 0).await.expect("launch robot");
    let script = std::fs::read_to_string(&path).expect("read script");
    assert_eq!(
        robot.autonomous().module().dispatch("load", Some(&script)),
        tether::CallOutcome::Finished("Script loaded".into())
    );

    robot.autonomous().next();
    robot.autonomous().next();
    assert_eq!(
        robot.autonomous().module().get(STATE_KEY).as_deref(),
        Some("finished")
    );
    assert_eq!(
        robot.autonomous().finished(),
        vec!["s robot timer reset", "s robot timer read"]
    );

    robot.shutdown();
}
