//! End-to-end session flows through `AppService` against the mock machine.
//!
//! Each test scripts a card, the bobbin sensors and the scanner answers,
//! then drives the control loop tick by tick and checks the relay, the
//! lamps and the published events.

use threadgate::app::events::AppEvent;
use threadgate::app::service::AppService;
use threadgate::config::{CardRemovalPolicy, SystemConfig};
use threadgate::error::{FaultReason, TransportError};
use threadgate::fsm::context::LampState;
use threadgate::fsm::StateId;
use threadgate::kanban::ThreadSpec;
use threadgate::scan::ScanChannelId;

use crate::mock_hw::{run_until, step, HwCall, MockMachine, RecordingSink};

fn make_app(config: SystemConfig) -> (AppService, MockMachine, RecordingSink) {
    let mut app = AppService::new(config);
    let mut hw = MockMachine::new();
    let mut sink = RecordingSink::new();
    app.start(&mut hw, &mut sink);
    (app, hw, sink)
}

/// Card TH-100 / TH-200 on the reader, both bobbins loaded.
fn loaded_machine(hw: &mut MockMachine) {
    hw.load_bobbins(true, true);
    hw.present_card(ThreadSpec::new("TH-100", "TH-200"));
}

// ── Startup ───────────────────────────────────────────────────

#[test]
fn start_reports_idle_with_outputs_safe() {
    let (app, hw, sink) = make_app(SystemConfig::default());

    assert_eq!(app.state(), StateId::Idle);
    assert_eq!(sink.events.first(), Some(&AppEvent::Started(StateId::Idle)));
    assert!(!hw.relay);
    assert_eq!(hw.lamps, LampState::OFF);
}

#[test]
fn idle_without_card_stays_idle_and_resets_reader_once() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());

    for _ in 0..20 {
        step(&mut app, &mut hw, &mut sink);
    }

    assert_eq!(app.state(), StateId::Idle);
    let resets = hw.calls.iter().filter(|c| **c == HwCall::ResetReader).count();
    assert_eq!(resets, 1);
    assert!(!hw.calls.contains(&HwCall::ReadCard));
}

// ── Verified session ──────────────────────────────────────────

#[test]
fn matching_threads_enable_machine_until_bobbin_removed() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());
    loaded_machine(&mut hw);
    hw.script_scan(ScanChannelId::One, "TH-100");
    hw.script_scan(ScanChannelId::Two, "TH-200");

    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Enabled, 50));
    assert!(hw.relay);
    assert_eq!(hw.lamps, LampState::READY);
    assert_eq!(
        sink.states(),
        vec![
            StateId::ReadingCard,
            StateId::AwaitingBobbins,
            StateId::ScanningChannel1,
            StateId::ScanningChannel2,
            StateId::Verifying,
            StateId::Enabled,
        ]
    );

    // Stays enabled while nothing changes.
    for _ in 0..30 {
        step(&mut app, &mut hw, &mut sink);
    }
    assert_eq!(app.state(), StateId::Enabled);

    hw.load_bobbins(false, true);
    step(&mut app, &mut hw, &mut sink);

    assert_eq!(app.state(), StateId::Idle);
    assert!(!hw.relay);
    assert_eq!(hw.lamps, LampState::OFF);
    assert_eq!(app.stats().verified, 1);
    assert_eq!(app.stats().cards_read, 1);
}

#[test]
fn verified_session_publishes_card_scans_and_report() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());
    loaded_machine(&mut hw);
    hw.script_scan(ScanChannelId::One, "TH-100");
    hw.script_scan(ScanChannelId::Two, "TH-200");

    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Enabled, 50));

    let card = sink.events.iter().find_map(|e| match e {
        AppEvent::CardRead { spec, .. } => Some(spec.clone()),
        _ => None,
    });
    assert_eq!(card, Some(ThreadSpec::new("TH-100", "TH-200")));

    let scans: Vec<_> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::ScanCompleted { channel, payload } => Some((*channel, payload.to_string())),
            _ => None,
        })
        .collect();
    assert_eq!(
        scans,
        vec![
            (ScanChannelId::One, "TH-100".to_string()),
            (ScanChannelId::Two, "TH-200".to_string()),
        ]
    );

    let report = sink.events.iter().find_map(|e| match e {
        AppEvent::Verified(r) => Some(r.clone()),
        _ => None,
    });
    assert!(report.is_some_and(|r| r.passed()));
}

#[test]
fn scans_run_in_channel_order_with_configured_timeout() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());
    loaded_machine(&mut hw);
    hw.script_scan(ScanChannelId::One, "TH-100");
    hw.script_scan(ScanChannelId::Two, "TH-200");

    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Enabled, 50));

    let scan_calls: Vec<_> = hw
        .calls
        .iter()
        .filter(|c| matches!(c, HwCall::Trigger(_) | HwCall::ReadPayload { .. }))
        .cloned()
        .collect();
    assert_eq!(
        scan_calls,
        vec![
            HwCall::Trigger(ScanChannelId::One),
            HwCall::ReadPayload {
                channel: ScanChannelId::One,
                timeout_ms: 5000
            },
            HwCall::Trigger(ScanChannelId::Two),
            HwCall::ReadPayload {
                channel: ScanChannelId::Two,
                timeout_ms: 5000
            },
        ]
    );
}

// ── Bypass ────────────────────────────────────────────────────

#[test]
fn bypass_card_enables_without_scanning_until_card_removed() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());
    hw.present_card(ThreadSpec::bypass());

    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::BypassEnabled, 10));
    assert!(hw.relay);
    assert_eq!(hw.lamps, LampState::READY);

    // Bobbins are irrelevant in bypass.
    for _ in 0..10 {
        step(&mut app, &mut hw, &mut sink);
    }
    assert_eq!(app.state(), StateId::BypassEnabled);
    assert_eq!(hw.triggers(), 0);

    hw.card_present = false;
    step(&mut app, &mut hw, &mut sink);

    assert_eq!(app.state(), StateId::Idle);
    assert!(!hw.relay);
    assert_eq!(app.stats().bypassed, 1);
    assert_eq!(app.stats().verified, 0);
}

#[test]
fn swapping_bypass_card_for_another_ends_bypass() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());
    hw.present_card(ThreadSpec::bypass());
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::BypassEnabled, 10));
    step(&mut app, &mut hw, &mut sink);
    assert!(hw.relay);

    // The new card answers in the same tick the old one leaves.
    hw.swap_card(&[0x01, 0x02, 0x03, 0x04]);
    step(&mut app, &mut hw, &mut sink);

    assert_eq!(app.state(), StateId::Idle);
    assert!(!hw.relay);
}

// ── Card read failures ────────────────────────────────────────

#[test]
fn read_failure_backs_off_and_retries_from_idle() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());
    hw.card_present = true;
    hw.card_reads.push_back(Err(TransportError::AuthFailed(4)));

    step(&mut app, &mut hw, &mut sink);
    assert_eq!(app.state(), StateId::ReadingCard);
    step(&mut app, &mut hw, &mut sink);

    assert_eq!(app.state(), StateId::Idle);
    assert_eq!(hw.delays(), vec![500]);
    assert!(sink
        .events
        .contains(&AppEvent::CardReadFailed(TransportError::AuthFailed(4))));
    assert!(sink.faults().is_empty());
    assert_eq!(app.stats().read_failures, 1);

    // Card still on the reader: a second read follows a fresh reader reset.
    hw.present_card(ThreadSpec::new("TH-100", "TH-200"));
    step(&mut app, &mut hw, &mut sink);
    assert_eq!(app.state(), StateId::ReadingCard);
    step(&mut app, &mut hw, &mut sink);
    assert_eq!(app.state(), StateId::AwaitingBobbins);

    let resets = hw.calls.iter().filter(|c| **c == HwCall::ResetReader).count();
    assert_eq!(resets, 2);
}

// ── Faults ────────────────────────────────────────────────────

#[test]
fn empty_thread_field_faults_as_invalid_kanban() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());
    hw.load_bobbins(true, true);
    hw.present_card(ThreadSpec::new("TH-100", ""));

    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Fault, 10));
    assert_eq!(sink.faults(), vec![FaultReason::InvalidKanban]);
    assert_eq!(app.context().fault, Some(FaultReason::InvalidKanban));
    assert!(!hw.relay_ever_closed);
    assert_eq!(hw.triggers(), 0);
}

#[test]
fn bobbins_not_loaded_in_time_fault_after_thirty_seconds() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());
    hw.load_bobbins(true, false);
    hw.present_card(ThreadSpec::new("TH-100", "TH-200"));

    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::AwaitingBobbins, 10));
    let entered = hw.now_ms;

    step(&mut app, &mut hw, &mut sink);
    assert_eq!(hw.lamps, LampState::new(true, false, false, true));
    assert!(sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::SensorSnapshot(s) if s.bobbin1 && !s.bobbin2)));

    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Fault, 400));
    assert!(hw.now_ms - entered > 30_000);
    assert_eq!(sink.faults(), vec![FaultReason::SensorTimeout]);
    assert!(!hw.relay_ever_closed);
}

#[test]
fn silent_scanner_one_faults_after_scan_window() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());
    loaded_machine(&mut hw);

    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::ScanningChannel1, 20));
    let before = hw.now_ms;
    step(&mut app, &mut hw, &mut sink);

    assert_eq!(app.state(), StateId::Fault);
    assert!(hw.now_ms - before >= 5000);
    assert_eq!(
        sink.faults(),
        vec![FaultReason::ScanTimeout(ScanChannelId::One)]
    );
    assert_eq!(hw.lamps, LampState::new(false, false, true, false));
    assert_eq!(hw.triggers(), 1);
    assert!(!hw.relay_ever_closed);
}

#[test]
fn silent_scanner_two_faults_after_first_succeeds() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());
    loaded_machine(&mut hw);
    hw.script_scan(ScanChannelId::One, "TH-100");

    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Fault, 30));
    assert_eq!(
        sink.faults(),
        vec![FaultReason::ScanTimeout(ScanChannelId::Two)]
    );
    assert_eq!(hw.lamps, LampState::new(true, false, false, true));
    assert_eq!(hw.triggers(), 2);
    assert_eq!(app.context().scan(ScanChannelId::One).as_str(), "TH-100");
}

#[test]
fn wrong_second_thread_faults_with_mismatch_report() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());
    loaded_machine(&mut hw);
    hw.script_scan(ScanChannelId::One, "TH-100");
    hw.script_scan(ScanChannelId::Two, "TH-999");

    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Fault, 30));
    assert_eq!(
        sink.faults(),
        vec![FaultReason::VerificationMismatch {
            thread1_ok: true,
            thread2_ok: false
        }]
    );
    let report = sink.events.iter().find_map(|e| match e {
        AppEvent::Verified(r) => Some(r.clone()),
        _ => None,
    });
    let report = report.expect("verification report published");
    assert!(report.thread1_ok());
    assert!(!report.thread2_ok());
    assert_eq!(report.scanned2.as_str(), "TH-999");
    assert!(!hw.relay_ever_closed);
}

#[test]
fn comparison_is_case_sensitive() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());
    hw.load_bobbins(true, true);
    hw.present_card(ThreadSpec::new("th-100", "TH-200"));
    hw.script_scan(ScanChannelId::One, "TH-100");
    hw.script_scan(ScanChannelId::Two, "TH-200");

    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Fault, 30));
    assert_eq!(
        sink.faults(),
        vec![FaultReason::VerificationMismatch {
            thread1_ok: false,
            thread2_ok: true
        }]
    );
}

#[test]
fn fault_blinks_alarm_lamps_and_holds_while_bobbins_loaded() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());
    hw.load_bobbins(true, true);
    hw.present_card(ThreadSpec::new("", "TH-200"));

    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Fault, 10));
    assert_eq!(hw.lamps, LampState::ALARM);

    let mut seen = Vec::new();
    for _ in 0..10 {
        step(&mut app, &mut hw, &mut sink);
        seen.push(hw.lamps);
        assert!(!hw.relay);
    }
    assert_eq!(app.state(), StateId::Fault);

    // 500 ms half period at 100 ms ticks: lit 100..400, dark 500..900, lit at 1000.
    let lit: Vec<bool> = seen.iter().map(|l| *l == LampState::ALARM).collect();
    assert_eq!(
        lit,
        vec![true, true, true, true, false, false, false, false, false, true]
    );
    assert!(seen.iter().all(|l| *l == LampState::ALARM || *l == LampState::OFF));
}

#[test]
fn removing_both_bobbins_clears_fault_after_reset_delay() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());
    loaded_machine(&mut hw);
    hw.script_scan(ScanChannelId::One, "TH-100");
    hw.script_scan(ScanChannelId::Two, "TH-999");
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Fault, 30));

    // One bobbin out is not enough.
    hw.load_bobbins(false, true);
    for _ in 0..5 {
        step(&mut app, &mut hw, &mut sink);
    }
    assert_eq!(app.state(), StateId::Fault);

    hw.card_present = false;
    hw.load_bobbins(false, false);
    step(&mut app, &mut hw, &mut sink);

    assert_eq!(app.state(), StateId::Idle);
    assert_eq!(hw.delays().last(), Some(&1000));
    assert_eq!(hw.lamps, LampState::OFF);
    assert_eq!(app.context().fault, None);
    assert!(app.context().spec.thread1.is_empty());
}

// ── Card removal policy ───────────────────────────────────────

#[test]
fn card_removal_is_ignored_while_enabled_by_default() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());
    loaded_machine(&mut hw);
    hw.script_scan(ScanChannelId::One, "TH-100");
    hw.script_scan(ScanChannelId::Two, "TH-200");
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Enabled, 50));

    hw.card_present = false;
    for _ in 0..10 {
        step(&mut app, &mut hw, &mut sink);
    }
    assert_eq!(app.state(), StateId::Enabled);
    assert!(hw.relay);
}

#[test]
fn card_removal_ends_session_under_reset_policy() {
    let config = SystemConfig {
        card_removal_policy: CardRemovalPolicy::ResetSession,
        ..SystemConfig::default()
    };
    let (mut app, mut hw, mut sink) = make_app(config);
    loaded_machine(&mut hw);
    hw.script_scan(ScanChannelId::One, "TH-100");
    hw.script_scan(ScanChannelId::Two, "TH-200");
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Enabled, 50));

    hw.card_present = false;
    step(&mut app, &mut hw, &mut sink);

    assert_eq!(app.state(), StateId::Idle);
    assert!(!hw.relay);
}

#[test]
fn swapped_card_ends_session_under_reset_policy() {
    let config = SystemConfig {
        card_removal_policy: CardRemovalPolicy::ResetSession,
        ..SystemConfig::default()
    };
    let (mut app, mut hw, mut sink) = make_app(config);
    loaded_machine(&mut hw);
    hw.script_scan(ScanChannelId::One, "TH-100");
    hw.script_scan(ScanChannelId::Two, "TH-200");
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Enabled, 50));
    step(&mut app, &mut hw, &mut sink);
    assert_eq!(app.state(), StateId::Enabled);

    hw.swap_card(&[0x01, 0x02, 0x03, 0x04]);
    step(&mut app, &mut hw, &mut sink);

    assert_eq!(app.state(), StateId::Idle);
    assert!(!hw.relay);
}

// ── Debounce ──────────────────────────────────────────────────

#[test]
fn bobbin_flicker_restarts_debounce_window() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());
    hw.present_card(ThreadSpec::new("TH-100", "TH-200"));
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::AwaitingBobbins, 10));

    hw.load_bobbins(true, true);
    for _ in 0..3 {
        step(&mut app, &mut hw, &mut sink);
    }
    hw.load_bobbins(true, false);
    step(&mut app, &mut hw, &mut sink);
    assert_eq!(app.state(), StateId::AwaitingBobbins);

    hw.load_bobbins(true, true);
    for _ in 0..5 {
        step(&mut app, &mut hw, &mut sink);
    }
    assert_eq!(app.state(), StateId::AwaitingBobbins);
    step(&mut app, &mut hw, &mut sink);
    assert_eq!(app.state(), StateId::ScanningChannel1);
}

// ── Configuration and statistics ──────────────────────────────

#[test]
fn site_profile_scan_timeout_reaches_the_scanner() {
    let config = SystemConfig::from_json(r#"{"scan_timeout_ms": 2000}"#).unwrap();
    let (mut app, mut hw, mut sink) = make_app(config);
    loaded_machine(&mut hw);

    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Fault, 30));
    assert!(hw.calls.contains(&HwCall::ReadPayload {
        channel: ScanChannelId::One,
        timeout_ms: 2000
    }));
}

#[test]
fn stats_accumulate_across_sessions() {
    let (mut app, mut hw, mut sink) = make_app(SystemConfig::default());

    // Session 1: verified.
    loaded_machine(&mut hw);
    hw.script_scan(ScanChannelId::One, "TH-100");
    hw.script_scan(ScanChannelId::Two, "TH-200");
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Enabled, 50));
    hw.card_present = false;
    hw.load_bobbins(false, false);
    step(&mut app, &mut hw, &mut sink);
    assert_eq!(app.state(), StateId::Idle);

    // Session 2: mismatch, then cleared.
    loaded_machine(&mut hw);
    hw.script_scan(ScanChannelId::One, "TH-100");
    hw.script_scan(ScanChannelId::Two, "TH-201");
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Fault, 50));
    hw.card_present = false;
    hw.load_bobbins(false, false);
    step(&mut app, &mut hw, &mut sink);
    assert_eq!(app.state(), StateId::Idle);

    let stats = app.stats();
    assert_eq!(stats.cards_read, 2);
    assert_eq!(stats.verified, 1);
    assert_eq!(stats.mismatches, 1);
    assert_eq!(stats.faults(), 1);
}
