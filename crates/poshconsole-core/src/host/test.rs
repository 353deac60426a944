use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use poshconsole_types::KeyInfo;

use super::{HostEvent, HostHandle, InputBridge, InputKind, KeyDisposition, RecordingHost};

fn wait_until_waiting(bridge: &InputBridge, kind: InputKind) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while bridge.is_waiting() != Some(kind) {
        assert!(Instant::now() < deadline, "reader never started waiting");
        thread::sleep(Duration::from_millis(1));
    }
}

fn type_text(bridge: &InputBridge, text: &str) -> Vec<KeyDisposition> {
    text.chars()
        .map(|c| bridge.key_down(KeyInfo::from_char(c)))
        .collect()
}

#[test]
fn read_line_round_trip() {
    let bridge = Arc::new(InputBridge::new());
    let reader = {
        let bridge = Arc::clone(&bridge);
        thread::spawn(move || bridge.read_line(|_| {}))
    };

    wait_until_waiting(&bridge, InputKind::Line);
    let echoed = type_text(&bridge, "bob");
    assert_eq!(
        echoed,
        vec![
            KeyDisposition::Echo('b'),
            KeyDisposition::Echo('o'),
            KeyDisposition::Echo('b')
        ]
    );
    assert_eq!(bridge.key_down(KeyInfo::enter()), KeyDisposition::LineCompleted);

    assert_eq!(reader.join().unwrap(), Ok("bob".to_string()));
    assert_eq!(bridge.is_waiting(), None);
}

#[test]
fn secret_keys_are_masked() {
    let bridge = Arc::new(InputBridge::new());
    let reader = {
        let bridge = Arc::clone(&bridge);
        thread::spawn(move || bridge.read_line_secret(|_| {}))
    };

    wait_until_waiting(&bridge, InputKind::SecretLine);
    assert!(
        type_text(&bridge, "pw")
            .iter()
            .all(|d| *d == KeyDisposition::Masked)
    );
    bridge.key_down(KeyInfo::enter());

    assert_eq!(reader.join().unwrap(), Ok(b"pw".to_vec()));
}

#[test]
fn backspace_and_escape_edit_the_line() {
    let bridge = Arc::new(InputBridge::new());
    let reader = {
        let bridge = Arc::clone(&bridge);
        thread::spawn(move || bridge.read_line(|_| {}))
    };

    wait_until_waiting(&bridge, InputKind::Line);
    type_text(&bridge, "abc");
    assert_eq!(bridge.key_down(KeyInfo::escape()), KeyDisposition::Cleared(3));
    type_text(&bridge, "xy");
    assert_eq!(bridge.key_down(KeyInfo::backspace()), KeyDisposition::Erase);
    bridge.key_down(KeyInfo::enter());

    assert_eq!(reader.join().unwrap(), Ok("x".to_string()));
}

#[test]
fn typeahead_is_consumed_in_order() {
    let bridge = InputBridge::new();
    assert_eq!(bridge.key_down(KeyInfo::from_char('a')), KeyDisposition::Buffered);
    bridge.key_down(KeyInfo::from_char('b'));
    bridge.key_down(KeyInfo::enter());
    bridge.key_down(KeyInfo::from_char('c'));

    let mut waited = false;
    let line = bridge.read_line(|_| waited = true).unwrap();
    assert_eq!(line, "ab");
    assert!(!waited, "a buffered line must not block");

    let key = bridge.read_key(|_| {}).unwrap();
    assert_eq!(key.character, 'c');
    assert!(!bridge.key_available());
}

#[test]
fn keys_after_enter_wait_for_the_next_read() {
    for _ in 0..100 {
        let bridge = Arc::new(InputBridge::new());
        let reader = {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || bridge.read_line(|_| {}))
        };

        wait_until_waiting(&bridge, InputKind::Line);
        type_text(&bridge, "a");
        assert_eq!(bridge.key_down(KeyInfo::enter()), KeyDisposition::LineCompleted);
        // the reader may not have woken yet; these must not touch the finished line
        assert!(
            type_text(&bridge, "bbb")
                .iter()
                .all(|d| *d == KeyDisposition::Buffered)
        );
        assert_eq!(bridge.key_down(KeyInfo::enter()), KeyDisposition::Buffered);
        assert!(!bridge.submit_line("late"));

        assert_eq!(reader.join().unwrap(), Ok("a".to_string()));
        assert_eq!(bridge.read_line(|_| {}), Ok("bbb".to_string()));
    }
}

#[test]
fn interrupt_releases_pending_reads() {
    let bridge = Arc::new(InputBridge::new());
    assert!(!bridge.interrupt());

    let line_reader = {
        let bridge = Arc::clone(&bridge);
        thread::spawn(move || bridge.read_line(|_| {}))
    };
    wait_until_waiting(&bridge, InputKind::Line);
    type_text(&bridge, "half");
    assert!(bridge.interrupt());
    assert_eq!(line_reader.join().unwrap(), Ok(String::new()));

    let key_reader = {
        let bridge = Arc::clone(&bridge);
        thread::spawn(move || bridge.read_key(|_| {}))
    };
    wait_until_waiting(&bridge, InputKind::Key);
    assert!(bridge.interrupt());
    assert_eq!(key_reader.join().unwrap(), Ok(KeyInfo::ctrl_c()));
    assert!(!bridge.key_available());
}

#[test]
fn read_key_blocks_until_delivered() {
    let bridge = Arc::new(InputBridge::new());
    let reader = {
        let bridge = Arc::clone(&bridge);
        thread::spawn(move || bridge.read_key(|_| {}))
    };

    wait_until_waiting(&bridge, InputKind::Key);
    assert_eq!(
        bridge.key_down(KeyInfo::from_char('q')),
        KeyDisposition::KeyDelivered
    );
    assert_eq!(reader.join().unwrap().unwrap().character, 'q');
}

#[test]
fn submit_line_only_when_waiting() {
    let bridge = Arc::new(InputBridge::new());
    assert!(!bridge.submit_line("too early"));

    let reader = {
        let bridge = Arc::clone(&bridge);
        thread::spawn(move || bridge.read_line(|_| {}))
    };
    wait_until_waiting(&bridge, InputKind::Line);
    assert!(bridge.submit_line("pasted"));
    assert_eq!(reader.join().unwrap(), Ok("pasted".to_string()));
}

#[test]
fn close_releases_blocked_reader() {
    let bridge = Arc::new(InputBridge::new());
    let reader = {
        let bridge = Arc::clone(&bridge);
        thread::spawn(move || bridge.read_line(|_| {}))
    };

    wait_until_waiting(&bridge, InputKind::Line);
    bridge.close();
    assert_eq!(reader.join().unwrap(), Err(super::HostError::InputClosed));
    assert_eq!(bridge.read_key(|_| {}), Err(super::HostError::InputClosed));
    assert_eq!(bridge.key_down(KeyInfo::enter()), KeyDisposition::Ignored);
}

#[test]
fn flush_input_drops_buffered_keys() {
    let bridge = InputBridge::new();
    bridge.key_down(KeyInfo::from_char('z'));
    assert!(bridge.key_available());
    bridge.flush_input();
    assert!(!bridge.key_available());
}

#[test]
fn on_wait_reports_the_read_kind() {
    let bridge = Arc::new(InputBridge::new());
    let host = RecordingHost::new();
    let reader = {
        let bridge = Arc::clone(&bridge);
        let handle = host.handle();
        thread::spawn(move || bridge.read_line_secret(|kind| handle.input_requested(kind)))
    };

    wait_until_waiting(&bridge, InputKind::SecretLine);
    bridge.key_down(KeyInfo::enter());
    reader.join().unwrap().unwrap();

    assert_eq!(
        host.events(),
        vec![HostEvent::InputRequested(InputKind::SecretLine)]
    );
}

#[test]
fn channel_host_delivers_in_order() {
    let (handle, rx) = HostHandle::channel();
    handle.write("a");
    handle.write_line("b");
    handle.write_error_line("c");
    handle.should_exit(3);

    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(events.len(), 4);
    assert!(matches!(&events[0], HostEvent::Write { text, .. } if text == "a"));
    assert!(matches!(&events[1], HostEvent::WriteLine { text, .. } if text == "b"));
    assert_eq!(events[2], HostEvent::ErrorLine("c".to_string()));
    assert_eq!(events[3], HostEvent::ShouldExit(3));
}

#[test]
fn recording_host_collects_output_text() {
    let host = RecordingHost::new();
    let handle = host.handle();
    handle.write("x = ");
    handle.write_line("1");
    handle.set_prompt("PS> ");
    assert_eq!(host.output_text(), "x = 1\n");
    assert_eq!(host.prompts(), vec!["PS> ".to_string()]);
}
