//! Integration tests: channel bytes → ChannelManager → ExchangeHub →
//! OKTO session → file store / firmware updater, and the responses that
//! come back out of the driver.

use ricxfer::comms::crc;
use ricxfer::comms::ricrest::{encode_cmd_frame, encode_file_block};
use ricxfer::config::ExchangeConfig;
use ricxfer::events::TransferEvent;
use ricxfer::filestream::firmware::OtaState;
use ricxfer::filestream::{ContentType, FileStreamBlock, FlowType};
use ricxfer::ports::FirmwareUpdater;

use crate::mock_ports::{MockRouter, Rig};

fn start_json(name: &str, file_type: &str, len: usize, extra: &str) -> String {
    format!(
        r#"{{"cmdName":"ufStart","reqStr":"ufStart","fileName":"{}","fileType":"{}","fileLen":{},"batchMsgSize":100,"batchAckSize":2{}}}"#,
        name, file_type, len, extra
    )
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

/// ufStart and return the negotiated stream ID.
fn start(rig: &mut Rig, name: &str, file_type: &str, len: usize, extra: &str) -> u8 {
    rig.send_rest(1, &encode_cmd_frame(&start_json(name, file_type, len, extra), &[]));
    rig.pump();
    let responses = rig.take_responses();
    assert_eq!(responses.len(), 1, "{:?}", responses);
    let (msg_num, resp) = &responses[0];
    assert_eq!(*msg_num, 1);
    assert_eq!(resp["rslt"], "ok", "{}", resp);
    assert_eq!(resp["batchMsgSize"], 100);
    assert_eq!(resp["batchAckSize"], 2);
    resp["streamID"].as_u64().unwrap() as u8
}

fn send_blocks(rig: &mut Rig, stream_id: u8, data: &[u8]) {
    for (i, chunk) in data.chunks(100).enumerate() {
        rig.send_rest(10 + i as u8, &encode_file_block(stream_id, (i * 100) as u32, chunk));
        rig.pump();
    }
}

fn oktos(responses: &[(u32, serde_json::Value)]) -> Vec<u64> {
    responses
        .iter()
        .filter_map(|(_, r)| r.get("okto").and_then(serde_json::Value::as_u64))
        .collect()
}

#[test]
fn file_upload_end_to_end() {
    let mut rig = Rig::new();
    let data = payload(250);
    let sid = start(&mut rig, "logs/a.txt", "fs", data.len(), "");
    assert_eq!(rig.hub.sessions().len(), 1);

    send_blocks(&mut rig, sid, &data);
    let responses = rig.take_responses();
    // First block, then the batch that also holds the last block
    assert_eq!(oktos(&responses), vec![100, 250]);
    assert!(responses.iter().all(|(_, r)| r["rslt"] == "ok"));

    assert_eq!(rig.files.data("logs/a.txt").unwrap(), data);
    assert_eq!(rig.files.finished("logs/a.txt"), Some(true));

    // The completed session was reaped during the same tick
    assert!(rig.hub.sessions().is_empty());

    rig.send_rest(20, &encode_cmd_frame(&format!(r#"{{"cmdName":"ufEnd","streamID":{}}}"#, sid), &[]));
    rig.pump();
    let responses = rig.take_responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].1["rslt"], "ok");

    assert!(matches!(
        rig.events.events.first(),
        Some(TransferEvent::SessionOpened {
            content: ContentType::File,
            flow: FlowType::CommsChannel,
            ..
        })
    ));
    assert!(
        rig.events
            .events
            .iter()
            .any(|e| matches!(e, TransferEvent::SessionClosed { name, .. } if name == "logs/a.txt"))
    );
}

#[test]
fn firmware_upload_with_crc_reaches_reboot_state() {
    let mut rig = Rig::new();
    let data = payload(300);
    let crc = crc::crc16(&data);
    let sid = start(&mut rig, "fw.bin", "fw", data.len(), &format!(r#","CRC16":"0x{:04x}""#, crc));

    send_blocks(&mut rig, sid, &data);
    assert_eq!(rig.firmware.state(), OtaState::ReadyToReboot);
    assert_eq!(rig.firmware.image(), data.as_slice());
    assert!(!rig.firmware.is_busy());
}

#[test]
fn firmware_crc_mismatch_fails_and_cancels() {
    let mut rig = Rig::new();
    let data = payload(200);
    let bad = crc::crc16(&data) ^ 0x0101;
    let sid = start(&mut rig, "fw.bin", "fw", data.len(), &format!(r#","CRC16":"{}""#, bad));

    send_blocks(&mut rig, sid, &data);
    assert_eq!(rig.firmware.state(), OtaState::Failed);

    let responses = rig.take_responses();
    let status = responses
        .iter()
        .find(|(_, r)| r["cmdName"] == "ufStatus")
        .expect("ufStatus fail");
    assert_eq!(status.1["rslt"], "fail");
    assert_eq!(status.1["reason"], "OTAWriteFailed");
    let cancel = responses
        .iter()
        .find(|(_, r)| r["cmdName"] == "ufCancel")
        .expect("ufCancel");
    assert_eq!(cancel.0, 0);
    assert_eq!(cancel.1["reason"], "failOTAWrite");
}

#[test]
fn out_of_order_block_is_acked_with_expected_position() {
    let mut rig = Rig::new();
    let data = payload(400);
    let sid = start(&mut rig, "b.bin", "fs", data.len(), "");

    rig.send_rest(10, &encode_file_block(sid, 0, &data[..100]));
    rig.pump();
    // Skip 100..200
    rig.send_rest(11, &encode_file_block(sid, 200, &data[200..300]));
    rig.send_rest(12, &encode_file_block(sid, 300, &data[300..400]));
    rig.pump();
    let responses = rig.take_responses();
    // Until a second block lands every block is acked, so each bad one repeats okto 100
    assert_eq!(oktos(&responses), vec![100, 100, 100]);
    assert_eq!(rig.files.data("b.bin").unwrap(), &data[..100]);
    assert_eq!(rig.hub.sessions().len(), 1);

    // Host rewinds to okto and finishes
    rig.send_rest(13, &encode_file_block(sid, 100, &data[100..200]));
    rig.send_rest(14, &encode_file_block(sid, 200, &data[200..300]));
    rig.send_rest(15, &encode_file_block(sid, 300, &data[300..400]));
    rig.pump();
    assert_eq!(oktos(&rig.take_responses()), vec![300, 400]);
    assert_eq!(rig.files.data("b.bin").unwrap(), data);
    assert_eq!(rig.files.finished("b.bin"), Some(true));
}

#[test]
fn stalled_upload_resends_okto_then_gives_up() {
    let config = ExchangeConfig {
        session_idle_timeout_ms: 600_000,
        ..ExchangeConfig::default()
    };
    let mut rig = Rig::with_config(config, MockRouter::default());
    let data = payload(300);
    let sid = start(&mut rig, "slow.bin", "fs", data.len(), "");
    rig.send_rest(10, &encode_file_block(sid, 0, &data[..100]));
    rig.pump();
    rig.take_responses();

    let cfg = rig.hub.config().upload;
    for retry in 1..cfg.max_retries {
        rig.clock.advance(cfg.first_msg_timeout_ms + 1);
        rig.pump();
        let responses = rig.take_responses();
        assert_eq!(oktos(&responses), vec![100], "retry {}", retry);
        assert_eq!(responses[0].0, 0);
    }
    rig.clock.advance(cfg.first_msg_timeout_ms + 1);
    rig.pump();
    let responses = rig.take_responses();
    assert!(
        responses
            .iter()
            .any(|(_, r)| r["cmdName"] == "ufCancel" && r["reason"] == "failRetries")
    );
    assert!(rig.hub.sessions().is_empty());
    assert_eq!(rig.files.finished("slow.bin"), Some(false));
}

#[test]
fn cancel_from_host_aborts_file() {
    let mut rig = Rig::new();
    let data = payload(300);
    let sid = start(&mut rig, "c.bin", "fs", data.len(), "");
    rig.send_rest(10, &encode_file_block(sid, 0, &data[..100]));
    rig.pump();

    rig.send_rest(11, &encode_cmd_frame(&format!(r#"{{"cmdName":"ufCancel","streamID":{}}}"#, sid), &[]));
    rig.pump();
    assert_eq!(rig.files.finished("c.bin"), Some(false));
    assert!(rig.hub.sessions().is_empty());
}

#[test]
fn block_for_unknown_stream_fails() {
    let mut rig = Rig::new();
    rig.send_rest(3, &encode_file_block(42, 0, b"abc"));
    rig.pump();
    let responses = rig.take_responses();
    assert_eq!(responses.len(), 1);
    let (msg_num, resp) = &responses[0];
    assert_eq!(*msg_num, 3);
    assert_eq!(resp["rslt"], "fail");
    assert_eq!(resp["streamID"], 42);
    assert_eq!(resp["reason"], "sessionNotFound");
}

#[test]
fn session_cap_refuses_extra_uploads() {
    let mut rig = Rig::new();
    let max = rig.hub.config().max_sessions;
    for i in 0..max {
        start(&mut rig, &format!("f{}.bin", i), "fs", 1000, "");
    }
    rig.send_rest(9, &encode_cmd_frame(&start_json("extra.bin", "fs", 1000, ""), &[]));
    rig.pump();
    let responses = rig.take_responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].1["rslt"], "fail");
    assert_eq!(responses[0].1["reason"], "insufficientResource");
    assert_eq!(rig.hub.sessions().len(), max);
}

#[test]
fn idle_sessions_are_reaped_one_per_tick() {
    let mut rig = Rig::new();
    start(&mut rig, "x.bin", "fs", 1000, "");
    start(&mut rig, "y.bin", "fs", 1000, "");
    assert_eq!(rig.hub.sessions().len(), 2);

    let idle = rig.hub.config().session_idle_timeout_ms;
    rig.clock.advance(idle + 1);
    rig.tick();
    assert_eq!(rig.hub.sessions().len(), 1);
    rig.tick();
    assert!(rig.hub.sessions().is_empty());
    assert_eq!(rig.files.finished("x.bin"), Some(false));
    assert_eq!(rig.files.finished("y.bin"), Some(false));
}

#[test]
fn interleaved_uploads_on_one_channel_stay_separate() {
    let mut rig = Rig::with_config(ExchangeConfig::default(), MockRouter::with_stream("audio"));
    let a = payload(200);
    let b: Vec<u8> = payload(200).iter().map(|x| !x).collect();
    let sid_a = start(&mut rig, "a.bin", "fs", a.len(), "");
    let sid_b = start(&mut rig, "b.bin", "fs", b.len(), "");
    assert_ne!(sid_a, sid_b);

    // A nameless stream start is a transfer of its own
    rig.send_rest(
        2,
        &encode_cmd_frame(r#"{"cmdName":"ufStart","fileType":"rtstream","endpoint":"audio"}"#, &[]),
    );
    rig.pump();
    let responses = rig.take_responses();
    let sid_s = responses[0].1["streamID"].as_u64().unwrap() as u8;
    assert!(![sid_a, sid_b].contains(&sid_s));
    assert_eq!(rig.hub.sessions().len(), 3);

    for i in 0..2 {
        let at = i * 100;
        rig.send_rest(10, &encode_file_block(sid_a, at as u32, &a[at..at + 100]));
        rig.send_rest(11, &encode_file_block(sid_b, at as u32, &b[at..at + 100]));
        rig.send_rest(12, &encode_file_block(sid_s, (i * 3) as u32, b"xyz"));
        rig.pump();
    }

    assert_eq!(rig.files.data("a.bin").unwrap(), a);
    assert_eq!(rig.files.data("b.bin").unwrap(), b);
    assert_eq!(rig.files.finished("a.bin"), Some(true));
    assert_eq!(rig.files.finished("b.bin"), Some(true));
    assert_eq!(rig.router.streams["audio"].data, b"xyzxyz");
    assert!(rig.hub.sessions().iter().all(|s| s.is_streaming()));
}

#[test]
fn push_reupload_before_reap_opens_fresh_session() {
    let mut rig = Rig::new();
    let block = |pos: u32, data: &'static [u8]| FileStreamBlock {
        name: "page.html",
        content_len: 6,
        file_pos: pos,
        data,
        first_block: pos == 0,
        final_block: pos + data.len() as u32 >= 6,
        crc16: None,
        file_len: Some(6),
    };

    rig.push_block(&block(0, b"old!!!"), ContentType::File).unwrap();
    assert_eq!(rig.files.finished("page.html"), Some(true));
    assert_eq!(rig.hub.sessions().len(), 1);

    // No service tick in between: the ended session is still in the table
    rig.push_block(&block(0, b"new"), ContentType::File).unwrap();
    rig.push_block(&block(3, b"one"), ContentType::File).unwrap();
    assert_eq!(rig.hub.sessions().len(), 2);
    assert_eq!(rig.files.data("page.html").unwrap(), b"newone");
    assert_eq!(rig.files.finished("page.html"), Some(true));

    rig.tick();
    rig.tick();
    assert!(rig.hub.sessions().is_empty());
}
