//! Integration tests: real-time streams, HTTP push uploads and plain
//! router requests through the hub.

use ricxfer::comms::message::MsgProtocol;
use ricxfer::comms::ricrest::{ElementCode, encode_body, encode_cmd_frame, encode_file_block, encode_str};
use ricxfer::config::ExchangeConfig;
use ricxfer::error::TransferError;
use ricxfer::events::{Activity, TransferEvent};
use ricxfer::filestream::{ContentType, FileStreamBlock};

use crate::mock_ports::{MockRouter, Rig};

fn stream_rig() -> Rig {
    Rig::with_config(ExchangeConfig::default(), MockRouter::with_stream("audio"))
}

fn open_stream(rig: &mut Rig) -> u8 {
    rig.send_rest(
        1,
        &encode_cmd_frame(
            r#"{"cmdName":"ufStart","fileName":"clip","fileType":"rtstream","endpoint":"audio"}"#,
            &[],
        ),
    );
    rig.pump();
    let responses = rig.take_responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].1["rslt"], "ok");
    responses[0].1["streamID"].as_u64().unwrap() as u8
}

#[test]
fn stream_blocks_reach_router_sink() {
    let mut rig = stream_rig();
    let sid = open_stream(&mut rig);
    assert_eq!(rig.hub.sessions()[0].engine().kind(), "datagram");

    rig.send_rest(2, &encode_file_block(sid, 0, b"abc"));
    rig.send_rest(3, &encode_file_block(sid, 3, b"defg"));
    rig.pump();
    // Open-ended stream: accepted blocks are not acked
    assert!(rig.take_responses().is_empty());
    assert_eq!(rig.router.streams["audio"].data, b"abcdefg");

    assert_eq!(
        rig.hub.activity(),
        Activity {
            streaming: true,
            ..Activity::default()
        }
    );
}

#[test]
fn stream_gap_reports_expected_position() {
    let mut rig = stream_rig();
    let sid = open_stream(&mut rig);
    rig.send_rest(2, &encode_file_block(sid, 0, b"abc"));
    rig.send_rest(3, &encode_file_block(sid, 10, b"zz"));
    rig.pump();

    let responses = rig.take_responses();
    assert_eq!(responses.len(), 1);
    let (msg_num, resp) = &responses[0];
    assert_eq!(*msg_num, 3);
    assert_eq!(resp["rslt"], "ok");
    assert_eq!(resp["sokto"], 3);
    assert_eq!(resp["reason"], "posMismatch");
    assert_eq!(rig.router.streams["audio"].data, b"abc");
}

#[test]
fn idle_stream_is_closed_and_sink_told() {
    let mut rig = stream_rig();
    let sid = open_stream(&mut rig);
    rig.send_rest(2, &encode_file_block(sid, 0, b"abc"));
    rig.pump();

    rig.clock.advance(rig.hub.config().session_idle_timeout_ms + 1);
    rig.tick();
    assert!(rig.hub.sessions().is_empty());
    assert_eq!(rig.router.streams["audio"].ended, Some(false));
    assert!(matches!(
        rig.events.events.last(),
        Some(TransferEvent::ActivityChanged(a)) if !a.any()
    ));
}

#[test]
fn stream_without_endpoint_is_dropped() {
    let mut rig = Rig::new();
    rig.send_rest(
        1,
        &encode_cmd_frame(
            r#"{"cmdName":"ufStart","fileName":"clip","fileType":"rtstream","endpoint":"nowhere"}"#,
            &[],
        ),
    );
    rig.pump();
    assert!(rig.hub.sessions().is_empty());
}

// ── HTTP push ─────────────────────────────────────────────────

fn push<'a>(name: &'a str, pos: u32, data: &'a [u8], total: u32) -> FileStreamBlock<'a> {
    FileStreamBlock {
        name,
        content_len: total,
        file_pos: pos,
        data,
        first_block: pos == 0,
        final_block: pos + data.len() as u32 >= total,
        crc16: None,
        file_len: Some(total),
    }
}

#[test]
fn http_push_writes_file_and_closes() {
    let mut rig = Rig::new();
    rig.push_block(&push("web/index.html", 0, b"<html>", 13), ContentType::File)
        .unwrap();
    assert_eq!(rig.hub.sessions().len(), 1);
    assert_eq!(rig.hub.sessions()[0].engine().kind(), "http");
    rig.push_block(&push("web/index.html", 6, b"</html>", 13), ContentType::File)
        .unwrap();

    assert_eq!(rig.files.data("web/index.html").unwrap(), b"<html></html>");
    assert_eq!(rig.files.finished("web/index.html"), Some(true));
    rig.tick();
    assert!(rig.hub.sessions().is_empty());
}

#[test]
fn http_push_firmware_goes_to_updater() {
    let mut rig = Rig::new();
    let image = [0x5au8; 64];
    rig.push_block(&push("fw.bin", 0, &image[..32], 64), ContentType::Firmware)
        .unwrap();
    assert!(rig.hub.sessions()[0].is_firmware_update());
    rig.push_block(&push("fw.bin", 32, &image[32..], 64), ContentType::Firmware)
        .unwrap();
    assert_eq!(rig.firmware.image(), &image[..]);
}

#[test]
fn http_push_continuation_without_session_fails() {
    let mut rig = Rig::new();
    assert_eq!(
        rig.push_block(&push("late.bin", 10, b"xx", 20), ContentType::File),
        Err(TransferError::SessionNotFound)
    );
}

// ── Router requests ───────────────────────────────────────────

#[test]
fn url_request_answered_on_same_msg_num() {
    let mut rig = Rig::new();
    rig.router.reply = Some(r#"{"req":"v","rslt":"ok","ver":"1.2"}"#.into());
    rig.send_rest(7, &encode_str("v", ElementCode::Url));
    rig.pump();

    assert_eq!(rig.router.calls.len(), 1);
    assert_eq!(rig.router.calls[0].req, "v");
    assert_eq!(rig.router.calls[0].body, None);
    assert_eq!(rig.router.calls[0].channel_id, rig.chan);
    let responses = rig.take_responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].0, 7);
    assert_eq!(responses[0].1["ver"], "1.2");
}

#[test]
fn body_elements_are_attached_to_next_url() {
    let mut rig = Rig::new();
    rig.send_rest(1, &encode_body(0, 10, b"hello"));
    rig.send_rest(2, &encode_body(5, 10, b"world"));
    rig.send_rest(3, &encode_str("setcfg", ElementCode::Url));
    rig.pump();

    assert_eq!(rig.router.calls.len(), 1);
    assert_eq!(rig.router.calls[0].body.as_deref(), Some(&b"helloworld"[..]));
    // No reply from the router, nothing sent
    assert!(rig.take_responses().is_empty());
}

#[test]
fn command_frame_becomes_query_request() {
    let mut rig = Rig::new();
    rig.router.reply = Some(r#"{"req":"led","rslt":"ok"}"#.into());
    rig.send_rest(4, &encode_cmd_frame(r#"{"cmdName":"led","r":1,"mode":"on"}"#, &[]));
    rig.pump();

    assert_eq!(rig.router.calls[0].req, "led?mode=on&r=1");
    let responses = rig.take_responses();
    assert_eq!(responses[0].0, 4);
    assert_eq!(responses[0].1["rslt"], "ok");
}

#[test]
fn raw_cmd_frame_reply_is_raw() {
    let mut rig = Rig::new();
    rig.router.reply = Some(r#"{"rslt":"ok"}"#.into());
    rig.send(5, MsgProtocol::RawCmdFrame, br#"{"cmdName":"stop","now":true}"#);
    rig.pump();

    assert_eq!(rig.router.calls[0].req, "stop?now=true");
    let sent = rig.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].protocol, MsgProtocol::RawCmdFrame);
    assert_eq!(sent[0].msg_num, 5);
    assert_eq!(sent[0].payload, br#"{"rslt":"ok"}"#);
}
