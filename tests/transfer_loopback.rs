//! End-to-end loopback test: a receiver Node and a sender Node exchange a
//! real handshake and a real file over TCP, without relying on multicast
//! discovery (which may not route in a sandboxed test environment) — the
//! sender's device registry is seeded directly instead.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fishare::consent::{AutoAcceptOracle, AutoRejectOracle};
use fishare::history::RecordStatus;
use fishare::net::pick_free_port;
use fishare::state::{AppStatus, Device};
use fishare::Node;

fn scratch_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fishare-it-{label}-{}", rand::random::<u64>()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_sample_file(dir: &PathBuf, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn start_receiver(data_dir: PathBuf, listen_port: u16, discovery_port: u16, auto_accept: bool) -> Node {
    let cfg_json = serde_json::json!({
        "device_name": "receiver",
        "download_dir": data_dir.join("downloads"),
        "allow_incoming": true,
        "listen_port": listen_port,
        "discovery_port": discovery_port,
    });
    std::fs::write(data_dir.join("config.json"), cfg_json.to_string()).unwrap();

    let oracle: Arc<dyn fishare::consent::ConsentOracle> = if auto_accept {
        Arc::new(AutoAcceptOracle)
    } else {
        Arc::new(AutoRejectOracle)
    };
    Node::start(data_dir, oracle, fishare::ui::inline_ui_poster()).expect("receiver node starts")
}

fn start_sender(data_dir: PathBuf, listen_port: u16, discovery_port: u16) -> Node {
    let cfg_json = serde_json::json!({
        "device_name": "sender",
        "download_dir": data_dir.join("downloads"),
        "allow_incoming": true,
        "listen_port": listen_port,
        "discovery_port": discovery_port,
    });
    std::fs::write(data_dir.join("config.json"), cfg_json.to_string()).unwrap();
    Node::start(data_dir, Arc::new(AutoAcceptOracle), fishare::ui::inline_ui_poster()).expect("sender node starts")
}

#[test]
fn accepted_transfer_writes_files_and_records_history() {
    let receiver_port = pick_free_port().unwrap();
    let sender_port = pick_free_port().unwrap();
    let discovery_port = pick_free_port().unwrap();

    let receiver_dir = scratch_dir("recv");
    let sender_dir = scratch_dir("send");

    let receiver = start_receiver(receiver_dir.clone(), receiver_port, discovery_port, true);
    let sender = start_sender(sender_dir.clone(), sender_port, discovery_port);

    let device_id = format!("127.0.0.1:{receiver_port}");
    sender.state.upsert_device(Device::new(
        "receiver".to_string(),
        "127.0.0.1".to_string(),
        receiver_port,
        AppStatus::Available,
    ));

    let files_dir = scratch_dir("files");
    let file_a = write_sample_file(&files_dir, "a.bin", &[7u8; 100]);
    let file_b = write_sample_file(&files_dir, "b.bin", &vec![9u8; 70_000]);

    sender.send_to(&device_id, &[file_a.clone(), file_b.clone()]).unwrap();

    // Progress reaches 1.0 then clears (the terminal-state convention).
    assert_eq!(sender.state.progress(&device_id), None);

    let record = sender.history.all().into_iter().next().unwrap();
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(record.direction, "sent");

    let received_a = std::fs::read(receiver.config.download_dir.join("a.bin")).unwrap();
    let received_b = std::fs::read(receiver.config.download_dir.join("b.bin")).unwrap();
    assert_eq!(received_a, std::fs::read(&file_a).unwrap());
    assert_eq!(received_b, std::fs::read(&file_b).unwrap());

    let receiver_record = receiver.history.all().into_iter().next().unwrap();
    assert_eq!(receiver_record.direction, "received");
    assert_eq!(receiver_record.status, RecordStatus::Completed);

    sender.shutdown();
    receiver.shutdown();
    std::fs::remove_dir_all(&receiver_dir).ok();
    std::fs::remove_dir_all(&sender_dir).ok();
    std::fs::remove_dir_all(&files_dir).ok();
}

#[test]
fn rejected_transfer_writes_no_bytes_and_marks_canceled() {
    let receiver_port = pick_free_port().unwrap();
    let sender_port = pick_free_port().unwrap();
    let discovery_port = pick_free_port().unwrap();

    let receiver_dir = scratch_dir("recv-reject");
    let sender_dir = scratch_dir("send-reject");

    let receiver = start_receiver(receiver_dir.clone(), receiver_port, discovery_port, false);
    let sender = start_sender(sender_dir.clone(), sender_port, discovery_port);

    let device_id = format!("127.0.0.1:{receiver_port}");
    sender.state.upsert_device(Device::new(
        "receiver".to_string(),
        "127.0.0.1".to_string(),
        receiver_port,
        AppStatus::Available,
    ));

    let files_dir = scratch_dir("files-reject");
    let file_a = write_sample_file(&files_dir, "a.bin", &[1u8; 10]);

    sender.send_to(&device_id, &[file_a]).unwrap();

    let record = sender.history.all().into_iter().next().unwrap();
    assert_eq!(record.status, RecordStatus::Canceled);
    assert_eq!(record.error_msg.as_deref(), Some("Transfer rejected by recipient"));
    assert!(!receiver.config.download_dir.join("a.bin").exists());

    sender.shutdown();
    receiver.shutdown();
    std::fs::remove_dir_all(&receiver_dir).ok();
    std::fs::remove_dir_all(&sender_dir).ok();
    std::fs::remove_dir_all(&files_dir).ok();
}

#[test]
fn busy_destination_is_refused_locally_without_connecting() {
    let sender_dir = scratch_dir("send-busy");
    let discovery_port = pick_free_port().unwrap();
    let sender_port = pick_free_port().unwrap();
    let sender = start_sender(sender_dir.clone(), sender_port, discovery_port);

    let unreachable_port = pick_free_port().unwrap();
    let device_id = format!("127.0.0.1:{unreachable_port}");
    sender.state.upsert_device(Device::new(
        "busy-peer".to_string(),
        "127.0.0.1".to_string(),
        unreachable_port,
        AppStatus::Busy,
    ));

    let files_dir = scratch_dir("files-busy");
    let file_a = write_sample_file(&files_dir, "a.bin", &[1u8; 10]);
    sender.send_to(&device_id, &[file_a]).unwrap();

    let record = sender.history.all().into_iter().next().unwrap();
    assert_eq!(record.status, RecordStatus::Canceled);
    assert_eq!(record.error_msg.as_deref(), Some("Destination is busy"));

    sender.shutdown();
    std::fs::remove_dir_all(&sender_dir).ok();
    std::fs::remove_dir_all(&files_dir).ok();
}

#[test]
fn zero_file_transfer_completes_with_empty_total_convention() {
    let receiver_port = pick_free_port().unwrap();
    let sender_port = pick_free_port().unwrap();
    let discovery_port = pick_free_port().unwrap();

    let receiver_dir = scratch_dir("recv-empty");
    let sender_dir = scratch_dir("send-empty");
    let receiver = start_receiver(receiver_dir.clone(), receiver_port, discovery_port, true);
    let sender = start_sender(sender_dir.clone(), sender_port, discovery_port);

    let device_id = format!("127.0.0.1:{receiver_port}");
    sender.state.upsert_device(Device::new(
        "receiver".to_string(),
        "127.0.0.1".to_string(),
        receiver_port,
        AppStatus::Available,
    ));

    sender.send_to(&device_id, &[]).unwrap();
    let record = sender.history.all().into_iter().next().unwrap();
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(record.total_size, 0);

    sender.shutdown();
    receiver.shutdown();
    std::fs::remove_dir_all(&receiver_dir).ok();
    std::fs::remove_dir_all(&sender_dir).ok();
    // wait a moment so receiver's worker thread finishes writing history before cleanup elsewhere
    std::thread::sleep(Duration::from_millis(10));
}

#[test]
fn empty_file_within_a_transfer_arrives_as_header_only() {
    let receiver_port = pick_free_port().unwrap();
    let sender_port = pick_free_port().unwrap();
    let discovery_port = pick_free_port().unwrap();

    let receiver_dir = scratch_dir("recv-emptyfile");
    let sender_dir = scratch_dir("send-emptyfile");
    let receiver = start_receiver(receiver_dir.clone(), receiver_port, discovery_port, true);
    let sender = start_sender(sender_dir.clone(), sender_port, discovery_port);

    let device_id = format!("127.0.0.1:{receiver_port}");
    sender.state.upsert_device(Device::new(
        "receiver".to_string(),
        "127.0.0.1".to_string(),
        receiver_port,
        AppStatus::Available,
    ));

    let files_dir = scratch_dir("files-emptyfile");
    // An empty file's header carries size=0; the receiver's chunk-read loop
    // is `while remaining > 0`, so it never waits on a file_chunk frame the
    // sender never sends. If that invariant broke, this would hang on the
    // read instead of completing.
    let empty_file = write_sample_file(&files_dir, "empty.bin", &[]);

    sender.send_to(&device_id, &[empty_file.clone()]).unwrap();

    let record = sender.history.all().into_iter().next().unwrap();
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(record.total_size, 0);

    let received = std::fs::read(receiver.config.download_dir.join("empty.bin")).unwrap();
    assert!(received.is_empty());

    sender.shutdown();
    receiver.shutdown();
    std::fs::remove_dir_all(&receiver_dir).ok();
    std::fs::remove_dir_all(&sender_dir).ok();
    std::fs::remove_dir_all(&files_dir).ok();
}
