use smsrelay::modem::parser::{
    classify_rssi, parse_caller_id, parse_message_list, parse_signal,
};
use smsrelay::modem::types::{CallEvent, SignalBand, SignalReport, Storage};

#[test]
fn cmgl_record_with_quoted_body() {
    let response = "+CMGL: 1,\"REC UNREAD\",\"+15551234567\",,\"24/01/01,12:00:00\"\r\n\"Hello\"\r\n\r\nOK\r\n";
    let messages = parse_message_list(response, Storage::Sim);
    assert_eq!(messages.len(), 1);
    let m = &messages[0];
    assert_eq!(m.sender, "+15551234567");
    assert_eq!(m.index, 1);
    assert_eq!(m.text, "Hello");
    assert_eq!(m.status, "REC UNREAD");
    assert_eq!(m.timestamp, "24/01/01,12:00:00");
    assert_eq!(m.id(), "SM_1_+15551234567_24/01/01,12:00:00");
}

#[test]
fn malformed_headers_do_not_hide_later_records() {
    let response = concat!(
        "AT+CMGL=\"ALL\"\r\r\n",
        "+CMGL: 1,\"REC READ\",\"+111\",,\"t1\"\r\n",
        "first\r\n",
        "+CMGL: garbage\r\n",
        "lost body\r\n",
        "+CMGL: x,\"REC READ\",\"+222\",,\"t2\"\r\n",
        "bad index\r\n",
        "+CMGL: 3,\"REC UNREAD\",\"+333\",,\"t3\"\r\n",
        "third\r\n",
        "+CMGL: 4,\"REC UNREAD\",\"+444\",,\"t4\"\r\n",
        "\r\n",
        "OK\r\n"
    );
    let messages = parse_message_list(response, Storage::Device);
    let indexes: Vec<u32> = messages.iter().map(|m| m.index).collect();
    assert_eq!(indexes, vec![1, 3]);
    assert!(messages.iter().all(|m| m.storage == Storage::Device));
    assert_eq!(messages[1].text, "third");
}

#[test]
fn identifiers_depend_on_every_field() {
    let a = parse_message_list("+CMGL: 5,\"REC READ\",\"+1\",,\"t\"\r\nx\r\n", Storage::Sim);
    let b = parse_message_list("+CMGL: 5,\"REC READ\",\"+1\",,\"t\"\r\ny\r\n", Storage::Sim);
    let c = parse_message_list("+CMGL: 5,\"REC READ\",\"+1\",,\"u\"\r\nx\r\n", Storage::Sim);
    let d = parse_message_list("+CMGL: 5,\"REC READ\",\"+1\",,\"t\"\r\nx\r\n", Storage::Device);
    // Body is not part of the key
    assert_eq!(a[0].id(), b[0].id());
    assert_ne!(a[0].id(), c[0].id());
    assert_ne!(a[0].id(), d[0].id());
}

#[test]
fn signal_scenario_and_boundaries() {
    assert_eq!(parse_signal("\r\n+CSQ: 31,99\r\n\r\nOK\r\n").to_string(), "Excellent (RSSI: 31)");

    let band = |rssi| match classify_rssi(rssi) {
        SignalReport::Quality { band, .. } => Some(band),
        _ => None,
    };
    assert_eq!(band(20), Some(SignalBand::Excellent));
    assert_eq!(band(19), Some(SignalBand::Good));
    assert_eq!(band(15), Some(SignalBand::Good));
    assert_eq!(band(14), Some(SignalBand::Fair));
    assert_eq!(band(10), Some(SignalBand::Fair));
    assert_eq!(band(9), Some(SignalBand::Poor));
    assert_eq!(band(0), Some(SignalBand::Poor));
    assert_eq!(classify_rssi(99), SignalReport::NoSignal);
    assert_eq!(classify_rssi(99).to_string(), "No signal");
}

#[test]
fn unparseable_signal_passes_raw_text_through() {
    assert_eq!(
        parse_signal("+CSQ: ??\r\nOK").to_string(),
        "Raw response: +CSQ: ??\r\nOK"
    );
    assert_eq!(parse_signal("ERROR").to_string(), "No signal data (raw: ERROR)");
}

#[test]
fn clip_scenario() {
    let raw = "\r\nRING\r\n\r\n+CLIP: \"+15559876543\",145,\"\",0,\"\",0\r\n";
    assert_eq!(parse_caller_id(raw), "+15559876543");
    let event = CallEvent::from_trigger(raw);
    assert_eq!(event.caller, "+15559876543");
    assert!(event.caller_known());
    assert_eq!(event.raw, raw);
}

#[test]
fn ring_without_clip_is_unknown_caller() {
    let event = CallEvent::from_trigger("\r\nRING\r\n");
    assert_eq!(event.caller, "Unknown");
    assert!(!event.caller_known());
}

#[test]
fn decoders_are_total_over_junk() {
    let junk = [
        "",
        "\u{0}\u{1}\u{2}",
        "+CMGL:",
        "+CMGL: ,,,,",
        "+CSQ:",
        "+CLIP",
        "+CLIP: ,",
        "\u{FFFD}\u{FFFD}+CMGL: 1",
    ];
    for input in junk {
        let _ = parse_message_list(input, Storage::Sim);
        let _ = parse_signal(input);
        assert!(!parse_caller_id(input).is_empty());
    }
}
