//! Analog station (FXS) hook supervision and dialplan-driven dialing.

mod common;

use std::sync::Arc;

use common::{HostAction, MockHardware, MockHost};
use trunkline_channel_core::cause::Cause;
use trunkline_channel_core::config::Options;
use trunkline_channel_core::host::SessionId;
use trunkline_channel_core::hw::{EventCode, HardwareEvent, Signaling};
use trunkline_channel_core::Driver;

fn station_driver(options: Options) -> (Driver, Arc<MockHardware>, Arc<MockHost>) {
    let hw = MockHardware::single(Signaling::AnalogStation, 1);
    let host = MockHost::new();
    let driver = Driver::start(hw.clone(), host.clone(), options).unwrap();
    (driver, hw, host)
}

fn digit(d: char) -> HardwareEvent {
    HardwareEvent::with_info(EventCode::DtmfDetected, d as i32)
}

#[test]
fn offhook_dial_route_answer_onhook() {
    let mut options = Options::default();
    options.dialplan = vec!["411".to_string()];
    let (driver, hw, host) = station_driver(options);
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.handle_event(&HardwareEvent::new(EventCode::Offhook)).unwrap();
    assert!(hw.command_names(0, 0).contains(&"MixerSetup"));
    assert!(!chan.is_free());

    for d in ['4', '1', '1'] {
        chan.handle_event(&digit(d)).unwrap();
    }
    let session = host.last_session().unwrap();
    let names = hw.command_names(0, 0);
    assert!(names.contains(&"StartListen"));
    assert!(names.contains(&"StartStream"));

    chan.do_channel_answer().unwrap();
    assert!(hw.command_names(0, 0).contains(&"Connect"));
    chan.handle_event(&HardwareEvent::new(EventCode::Connect)).unwrap();
    assert!(host.actions().contains(&HostAction::Answered(session)));

    chan.handle_event(&HardwareEvent::new(EventCode::Onhook)).unwrap();
    assert!(host
        .actions()
        .contains(&HostAction::Hangup(session, Cause::NormalClearing)));
    assert!(chan.is_free());
}

#[test]
fn dead_end_number_plays_fast_busy() {
    let mut options = Options::default();
    options.dialplan = vec!["411".to_string()];
    let (driver, hw, host) = station_driver(options);
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.handle_event(&HardwareEvent::new(EventCode::Offhook)).unwrap();
    chan.handle_event(&digit('8')).unwrap();

    assert!(hw.command_names(0, 0).contains(&"StartCadence"));
    assert!(host.last_session().is_none());

    // hanging up clears the error tone without a call to tear down
    chan.handle_event(&HardwareEvent::new(EventCode::Onhook)).unwrap();
    assert!(hw.command_names(0, 0).contains(&"StopCadence"));
    assert!(chan.is_free());
}

#[test]
fn inter_digit_silence_routes_the_partial_number() {
    let mut options = Options::default();
    options.dialplan = vec!["9XXXX".to_string()];
    options.dial_timeout_ms = 30;
    let (driver, _hw, host) = station_driver(options);
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.handle_event(&HardwareEvent::new(EventCode::Offhook)).unwrap();
    chan.handle_event(&digit('9')).unwrap();
    chan.handle_event(&digit('1')).unwrap();

    // nothing routed yet; the timer fires and routes what was dialed
    assert!(host.last_session().is_none());
    assert!(host.wait_until(|a| a.iter().any(|x| matches!(x, HostAction::Allocated(_)))));
}

#[test]
fn call_towards_the_station_rings_the_set() {
    let (driver, hw, host) = station_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.start_outgoing(SessionId(5), "200", "0", false).unwrap();
    assert!(hw.command_names(0, 0).contains(&"RingGenerate"));

    // picking up answers
    chan.handle_event(&HardwareEvent::new(EventCode::Offhook)).unwrap();
    let names = hw.command_names(0, 0);
    assert!(names.contains(&"RingStop"));
    assert!(host.actions().contains(&HostAction::MarkedAnswered(SessionId(5))));
}

#[test]
fn hook_flash_is_surfaced_to_the_session() {
    let (driver, _hw, host) = station_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.start_outgoing(SessionId(7), "200", "0", false).unwrap();
    chan.handle_event(&HardwareEvent::new(EventCode::Offhook)).unwrap();

    chan.handle_event(&HardwareEvent::new(EventCode::FlashDetected)).unwrap();
    assert!(host.actions().contains(&HostAction::Variable(
        SessionId(7),
        "flash".into(),
        "received".into()
    )));
}

#[test]
fn offhook_station_refuses_calls_towards_it() {
    let (driver, _hw, _host) = station_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.handle_event(&HardwareEvent::new(EventCode::Offhook)).unwrap();
    assert!(chan.start_outgoing(SessionId(6), "200", "0", false).is_err());
}

#[test]
fn abandoned_dialing_leaves_no_trace() {
    let (driver, hw, host) = station_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.handle_event(&HardwareEvent::new(EventCode::Offhook)).unwrap();
    chan.handle_event(&HardwareEvent::new(EventCode::Onhook)).unwrap();

    // dialtone dropped, no session, no hangup reported
    let mixer_setups = hw
        .command_names(0, 0)
        .iter()
        .filter(|n| **n == "MixerSetup")
        .count();
    assert_eq!(mixer_setups, 2);
    assert!(host.actions().is_empty());
    assert!(chan.is_free());
}
