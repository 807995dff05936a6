//! End-to-end call scenarios on an ISDN trunk channel.

mod common;

use std::sync::Arc;

use common::{HostAction, MockHardware, MockHost};
use trunkline_channel_core::cause::Cause;
use trunkline_channel_core::config::Options;
use trunkline_channel_core::host::SessionId;
use trunkline_channel_core::hw::{EventCode, HardwareEvent, Signaling};
use trunkline_channel_core::Driver;

fn isdn_driver(options: Options) -> (Driver, Arc<MockHardware>, Arc<MockHost>) {
    let hw = MockHardware::single(Signaling::Isdn, 2);
    let host = MockHost::new();
    let driver = Driver::start(hw.clone(), host.clone(), options).unwrap();
    (driver, hw, host)
}

fn new_call() -> HardwareEvent {
    HardwareEvent::new(EventCode::NewCall)
        .with_param("orig_addr", "5551234")
        .with_param("dest_addr", "100")
}

#[test]
fn incoming_call_allocates_session_and_rings() {
    let (driver, hw, host) = isdn_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();
    assert!(chan.is_free());

    chan.handle_event(&new_call()).unwrap();
    assert!(host.last_session().is_some());
    assert!(!chan.is_free());

    chan.indicate_ringing().unwrap();
    let names = hw.command_names(0, 0);
    assert!(names.contains(&"PreConnect"));
    assert!(names.contains(&"RingBack"));
    assert!(names.contains(&"StartListen"));
    assert!(names.contains(&"StartStream"));
}

#[test]
fn answer_then_connect_reports_answered_once() {
    let (driver, hw, host) = isdn_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.handle_event(&new_call()).unwrap();
    let session = host.last_session().unwrap();

    chan.do_channel_answer().unwrap();
    assert!(hw.command_names(0, 0).contains(&"Connect"));

    chan.handle_event(&HardwareEvent::new(EventCode::Connect)).unwrap();
    assert!(host.actions().contains(&HostAction::Answered(session)));

    // a duplicate connect must not answer the session twice
    chan.handle_event(&HardwareEvent::new(EventCode::Connect)).unwrap();
    let answered = host
        .actions()
        .iter()
        .filter(|a| matches!(a, HostAction::Answered(_)))
        .count();
    assert_eq!(answered, 1);
}

#[test]
fn far_end_disconnect_hangs_up_and_channel_free_resets() {
    let (driver, hw, host) = isdn_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.handle_event(&new_call()).unwrap();
    let session = host.last_session().unwrap();
    chan.do_channel_answer().unwrap();
    chan.handle_event(&HardwareEvent::new(EventCode::Connect)).unwrap();

    // Q.850 cause 16: normal clearing
    chan.handle_event(&HardwareEvent::with_info(EventCode::Disconnect, 16))
        .unwrap();
    assert!(host
        .actions()
        .contains(&HostAction::Variable(session, "isdn_cause".into(), "16".into())));
    assert!(host
        .actions()
        .contains(&HostAction::Hangup(session, Cause::NormalClearing)));
    assert!(hw.command_names(0, 0).contains(&"Disconnect"));

    chan.handle_event(&HardwareEvent::new(EventCode::ChannelFree)).unwrap();
    assert!(chan.is_free());
    assert_eq!(chan.statistics().unwrap().calls_incoming, 1);
}

#[test]
fn refused_when_no_session_is_available() {
    let (driver, hw, host) = isdn_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();
    host.refuse_allocations(true);

    assert!(chan.handle_event(&new_call()).is_err());

    // the refusal goes out as signaling, not as a host hangup
    assert!(hw.command_names(0, 0).contains(&"RingBack"));
    assert!(!host.actions().iter().any(|a| matches!(a, HostAction::Hangup(..))));
    assert!(chan.is_free());
}

#[test]
fn outgoing_call_success_and_connect() {
    let (driver, hw, host) = isdn_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.start_outgoing(SessionId(7), "100", "5559876", false).unwrap();
    assert!(hw.command_names(0, 0).contains(&"MakeCall"));

    // a second call on a dialing channel is refused
    assert!(chan.start_outgoing(SessionId(8), "100", "5550000", false).is_err());

    chan.handle_event(&HardwareEvent::new(EventCode::CallSuccess)).unwrap();
    assert!(host.actions().contains(&HostAction::RingReady(SessionId(7))));

    chan.handle_event(&HardwareEvent::new(EventCode::Connect)).unwrap();
    assert!(host.actions().contains(&HostAction::MarkedAnswered(SessionId(7))));
    assert_eq!(chan.statistics().unwrap().calls_outgoing, 1);
}

#[test]
fn call_fail_maps_the_isdn_cause() {
    let (driver, _hw, host) = isdn_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.start_outgoing(SessionId(9), "100", "5550001", false).unwrap();
    // Q.850 cause 17: user busy
    chan.handle_event(&HardwareEvent::with_info(EventCode::CallFail, 17))
        .unwrap();
    assert!(host
        .actions()
        .contains(&HostAction::Hangup(SessionId(9), Cause::UserBusy)));

    chan.handle_event(&HardwareEvent::new(EventCode::ChannelFree)).unwrap();
    assert!(chan.is_free());
}

#[test]
fn progress_indicator_opens_early_media() {
    let (driver, hw, host) = isdn_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.start_outgoing(SessionId(3), "100", "5550002", false).unwrap();
    chan.handle_event(&HardwareEvent::with_info(EventCode::IsdnProgressIndicator, 8))
        .unwrap();

    let names = hw.command_names(0, 0);
    assert!(names.contains(&"StartListen"));
    assert!(names.contains(&"StartStream"));
    assert!(host.actions().contains(&HostAction::PreAnswered(SessionId(3))));

    // repeated indicators do not re-report progress
    chan.handle_event(&HardwareEvent::with_info(EventCode::IsdnProgressIndicator, 8))
        .unwrap();
    let progressed = host
        .actions()
        .iter()
        .filter(|a| matches!(a, HostAction::PreAnswered(_)))
        .count();
    assert_eq!(progressed, 1);
}

#[test]
fn host_hangup_of_unanswered_incoming_refuses_politely() {
    let (driver, hw, host) = isdn_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.handle_event(&new_call()).unwrap();
    let session = host.last_session().unwrap();
    chan.indicate_ringing().unwrap();

    host.set_cause(session, Cause::UserBusy);
    chan.do_channel_hangup().unwrap();

    // the refusal went back as signaling on top of the initial ringback
    let ringbacks = hw
        .command_names(0, 0)
        .iter()
        .filter(|n| **n == "RingBack")
        .count();
    assert_eq!(ringbacks, 2);
    assert!(hw.command_names(0, 0).contains(&"Disconnect"));
    // the host initiated this hangup; it is not reported back
    assert!(!host.actions().iter().any(|a| matches!(a, HostAction::Hangup(..))));
}

#[test]
fn user_information_is_exported_to_the_session() {
    let (driver, _hw, host) = isdn_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.handle_event(&new_call()).unwrap();
    let session = host.last_session().unwrap();

    let ev = HardwareEvent::with_info(EventCode::UserInformation, 4)
        .with_param("uui_data", "os-trunk-7");
    chan.handle_event(&ev).unwrap();

    assert!(host
        .actions()
        .contains(&HostAction::Variable(session, "uui_descriptor".into(), "4".into())));
    assert!(host
        .actions()
        .contains(&HostAction::Variable(session, "uui_data".into(), "os-trunk-7".into())));
}

#[test]
fn repeated_channel_free_is_a_no_op() {
    let (driver, hw, host) = isdn_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.handle_event(&new_call()).unwrap();
    chan.do_channel_answer().unwrap();
    chan.handle_event(&HardwareEvent::new(EventCode::Connect)).unwrap();
    chan.handle_event(&HardwareEvent::new(EventCode::ChannelFree)).unwrap();
    assert!(chan.is_free());

    // a duplicate free on the now-idle channel touches nothing
    let actions = host.actions().len();
    hw.clear_commands();
    chan.handle_event(&HardwareEvent::new(EventCode::ChannelFree)).unwrap();
    assert!(chan.is_free());
    assert!(hw.command_names(0, 0).is_empty());
    assert_eq!(host.actions().len(), actions);
    assert_eq!(chan.statistics().unwrap().calls_incoming, 1);
}

#[test]
fn refused_dial_cleans_up_on_host_hangup() {
    let (driver, hw, host) = isdn_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();

    hw.refuse_next("MakeCall");
    assert!(chan.start_outgoing(SessionId(5), "100", "5559876", false).is_err());
    // the hardware never saw the call, so no ChannelFree will come
    assert!(!chan.is_free());

    chan.do_channel_hangup().unwrap();
    assert!(chan.is_free());
    // the host initiated the hangup; nothing is reported back
    assert!(!host.actions().iter().any(|a| matches!(a, HostAction::Hangup(..))));
}

#[test]
fn connect_suppresses_inband_dtmf_for_out_of_band_delivery() {
    let (driver, hw, _host) = isdn_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.start_outgoing(SessionId(2), "100", "5559876", false).unwrap();
    chan.handle_event(&HardwareEvent::new(EventCode::Connect)).unwrap();
    assert!(hw.command_names(0, 0).contains(&"DtmfSuppression"));

    // teardown restores inband delivery
    hw.clear_commands();
    chan.handle_event(&HardwareEvent::new(EventCode::ChannelFree)).unwrap();
    assert!(hw.command_names(0, 0).contains(&"DtmfSuppression"));
}

#[test]
fn inband_delivery_leaves_suppression_alone() {
    let mut options = Options::default();
    options.out_of_band_dtmfs = false;
    let (driver, hw, _host) = isdn_driver(options);
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.start_outgoing(SessionId(2), "100", "5559876", false).unwrap();
    chan.handle_event(&HardwareEvent::new(EventCode::Connect)).unwrap();
    chan.handle_event(&HardwareEvent::new(EventCode::ChannelFree)).unwrap();
    assert!(!hw.command_names(0, 0).contains(&"DtmfSuppression"));
}

#[test]
fn channel_fault_latches_until_free() {
    let (driver, hw, host) = isdn_driver(Options::default());
    let chan = driver.channel(0, 0).unwrap().clone();

    chan.handle_event(&HardwareEvent::with_info(EventCode::ChannelFail, 3))
        .unwrap();
    assert!(!chan.is_free());
    assert_eq!(chan.statistics().unwrap().channel_fails, 1);

    // incoming calls bounce off the latched fault
    assert!(chan.handle_event(&new_call()).is_err());
    assert!(host.last_session().is_none());
    assert!(hw.command_names(0, 0).contains(&"RingBack"));

    chan.handle_event(&HardwareEvent::new(EventCode::ChannelFree)).unwrap();
    assert!(chan.is_free());
}
