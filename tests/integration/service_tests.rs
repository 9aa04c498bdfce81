//! Integration tests for the wake cycle: init → FSM steps → report →
//! deep sleep, over the radio transport with mock adapters.
//!
//! Each simulated boot builds a fresh service over the same retained
//! region, the way the device re-enters `main` after every wake-up.

use std::cell::RefCell;
use std::rc::Rc;

use crate::mock_hw::{
    DEVICE_MAC, EPOCH, FixedBattery, GATEWAY, MemSource, MockPlatform, MockRadioLink,
    RecordingSink, SharedPeerCache,
};

use simple_iot::app::context::StepContext;
use simple_iot::app::events::AppEvent;
use simple_iot::app::ports::PeerCache;
use simple_iot::app::service::{Cycle, IotService};
use simple_iot::error::{ConfigError, Error, TransportError};
use simple_iot::fsm::{State, UserResult};
use simple_iot::power::WakeSource;
use simple_iot::retained::{BootClass, RetainedRegion, WakeCause};
use simple_iot::transport::radio::decode_frame;
use simple_iot::transport::{ConfirmationQueue, RadioTransport, SendConfirmation, Transport};

const CONFIG: &str = r#"{
    "device_name": "porch",
    "topic_name": "home/porch",
    "watchdog_interval": 600,
    "esp_now": { "channel": 6, "gateway_ssid_prefix": "IOT_GW" }
}"#;

type Radio<'q> = RadioTransport<'q, MockRadioLink<'q>, SharedPeerCache>;

fn radio<'q>(queue: &'q ConfirmationQueue, cache: &SharedPeerCache) -> Radio<'q> {
    RadioTransport::new(MockRadioLink::with_gateway(queue), cache.clone(), queue)
}

/// Completes everything except waiting for an event.
fn idle_app(state: State, _ctx: &mut StepContext) -> UserResult {
    match state {
        State::WaitForEvent => UserResult::NotCompleted,
        _ => UserResult::Completed,
    }
}

fn payload_text(frame: &[u8]) -> String {
    let payload = decode_frame(frame).expect("frame checksum");
    String::from_utf8(payload.to_vec()).unwrap()
}

/// Power on at `EPOCH` and run until the first suspension.
fn first_boot(
    region: &mut RetainedRegion,
    queue: &ConfirmationQueue,
    cache: &SharedPeerCache,
    source: &mut MemSource,
) {
    let mut sink = RecordingSink::new();
    let mut iot = IotService::new(MockPlatform::cold(EPOCH), radio(queue, cache), region)
        .with_handler(idle_app);
    iot.init(source, &mut sink).unwrap();
    assert_eq!(iot.run(&mut sink), 600);
}

// ── Cold boot ─────────────────────────────────────────────────

#[test]
fn cold_boot_reports_startup_and_sleeps_until_watchdog() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    let mut sink = RecordingSink::new();

    let mut iot = IotService::new(MockPlatform::cold(EPOCH), radio(&queue, &cache), &mut region)
        .with_handler(idle_app);
    iot.init(&mut source, &mut sink).unwrap();

    assert!(iot.was_reset());
    assert_eq!(iot.state(), State::Startup);
    assert_eq!(iot.next_watchdog_at(), EPOCH + 600);

    assert_eq!(iot.process(&mut sink), Cycle::Suspended { secs: 600 });
    assert_eq!(iot.state(), State::WaitForEvent);
    assert_eq!(iot.sequence_number(), 1);
    assert_eq!(iot.error_count(), 0);
    assert_eq!(sink.sent(), vec![("STARTUP", 0)]);
    assert_eq!(iot.platform().last_sleep(), Some((600, WakeSource::Timer)));

    let link = iot.transport().link();
    assert_eq!(link.scans, 1);
    assert_eq!(link.opened, vec![(GATEWAY, 6, false)]);
    assert_eq!(link.closes, 1, "radio released before sleep");
    assert_eq!(link.frames.len(), 1);
    assert_eq!(
        payload_text(&link.frames[0]),
        "home/porch;{name:porch,type:STARTUP,seq:0,dur:0,mac:\"24:0a:c4:12:34:56\",\
         err:0,rssi:-55,st:2,rst:2,heap:200000}"
    );
    assert_eq!(cache.get().map(|p| p.address), Some(GATEWAY));
    assert_eq!(source.reads, 1);
    assert_eq!(iot.transport().link_identity(), DEVICE_MAC);
}

#[test]
fn missing_configuration_is_fatal_on_cold_boot() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::missing();
    let mut sink = RecordingSink::new();

    let mut iot = IotService::new(MockPlatform::cold(EPOCH), radio(&queue, &cache), &mut region)
        .with_handler(idle_app);
    assert_eq!(
        iot.init(&mut source, &mut sink),
        Err(Error::Config(ConfigError::FileNotFound))
    );
    // Not initialised: stepping does nothing.
    assert_eq!(iot.process(&mut sink), Cycle::Awake);
    assert!(sink.events.is_empty());
    assert!(iot.transport().link().frames.is_empty());
}

// ── Timer wake and watchdog ───────────────────────────────────

#[test]
fn timer_wake_sends_watchdog_and_reschedules() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    first_boot(&mut region, &queue, &cache, &mut source);

    let mut sink = RecordingSink::new();
    let platform = MockPlatform::woken(EPOCH + 600, WakeCause::Timer);
    let mut iot =
        IotService::new(platform, radio(&queue, &cache), &mut region).with_handler(idle_app);
    iot.init(&mut source, &mut sink).unwrap();
    assert!(iot.was_deep_sleep_timeout());
    assert_eq!(iot.transport().link().scans, 0, "cached gateway reused");

    assert_eq!(iot.process(&mut sink), Cycle::Awake);
    assert_eq!(iot.state(), State::Watchdog);
    assert_eq!(iot.return_state(), State::WaitForEvent);

    assert_eq!(iot.process(&mut sink), Cycle::Suspended { secs: 600 });
    assert_eq!(iot.state(), State::WaitForEvent);
    assert_eq!(sink.sent(), vec![("WATCHDOG", 1)]);
    assert_eq!(iot.next_watchdog_at(), EPOCH + 1200);
    assert_eq!(iot.sequence_number(), 2);
    assert_eq!(source.reads, 1, "valid retained record is not rebuilt");
}

#[test]
fn watchdog_interrupts_processing_and_resumes_it() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    first_boot(&mut region, &queue, &cache, &mut source);

    let mut sink = RecordingSink::new();
    let platform = MockPlatform::woken(EPOCH + 100, WakeCause::External);
    let app = |state: State, _ctx: &mut StepContext| match state {
        State::WaitForEvent => UserResult::NewEvent,
        State::ProcessEvent => UserResult::NotCompleted,
        _ => UserResult::Completed,
    };
    let mut iot = IotService::new(platform, radio(&queue, &cache), &mut region).with_handler(app);
    iot.init(&mut source, &mut sink).unwrap();

    assert_eq!(iot.process(&mut sink), Cycle::Awake);
    assert_eq!(iot.state(), State::ProcessEvent);
    assert_eq!(iot.process(&mut sink), Cycle::Awake);
    assert_eq!(iot.state(), State::ProcessEvent);

    iot.platform_mut().wall_ms = (EPOCH + 600) * 1000;
    assert_eq!(iot.process(&mut sink), Cycle::Awake);
    assert_eq!(iot.state(), State::Watchdog);
    assert_eq!(iot.return_state(), State::ProcessEvent);

    assert_eq!(iot.process(&mut sink), Cycle::Awake);
    assert_eq!(iot.state(), State::ProcessEvent);
    assert_eq!(sink.sent(), vec![("WATCHDOG", 1)]);
    assert_eq!(iot.next_watchdog_at(), EPOCH + 1200);

    let text = payload_text(&iot.transport().link().frames[0]);
    assert!(text.contains(",st:4,rst:4,"), "{text}");
}

// ── Event handling and sleep overrides ────────────────────────

#[test]
fn new_event_is_processed_without_report() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    first_boot(&mut region, &queue, &cache, &mut source);

    let mut sink = RecordingSink::new();
    let platform = MockPlatform::woken(EPOCH + 30, WakeCause::External);
    let app = |state: State, _ctx: &mut StepContext| match state {
        State::WaitForEvent => UserResult::NewEvent,
        _ => UserResult::Completed,
    };
    let mut iot = IotService::new(platform, radio(&queue, &cache), &mut region).with_handler(app);
    iot.init(&mut source, &mut sink).unwrap();
    assert!(!iot.was_deep_sleep_timeout());
    assert_eq!(iot.wake_cause(), WakeCause::External);

    assert_eq!(iot.process(&mut sink), Cycle::Awake);
    assert_eq!(iot.state(), State::ProcessEvent);
    assert!(sink.sent().is_empty());

    // WAIT_END_EVENT may suspend: sleep for what is left of the interval.
    assert_eq!(iot.process(&mut sink), Cycle::Suspended { secs: 570 });
    assert_eq!(iot.state(), State::WaitEndEvent);
    assert_eq!(iot.platform().last_sleep(), Some((570, WakeSource::Timer)));
    assert!(iot.transport().link().frames.is_empty());
}

#[test]
fn new_event_takes_precedence_over_due_watchdog() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    first_boot(&mut region, &queue, &cache, &mut source);

    let mut sink = RecordingSink::new();
    let platform = MockPlatform::woken(EPOCH + 700, WakeCause::External);
    let app = |state: State, _ctx: &mut StepContext| match state {
        State::WaitForEvent => UserResult::NewEvent,
        _ => UserResult::NotCompleted,
    };
    let mut iot = IotService::new(platform, radio(&queue, &cache), &mut region).with_handler(app);
    iot.init(&mut source, &mut sink).unwrap();

    assert_eq!(iot.process(&mut sink), Cycle::Awake);
    assert_eq!(iot.state(), State::ProcessEvent);
    // Still due on the next step: the event is interrupted, not lost.
    assert_eq!(iot.process(&mut sink), Cycle::Awake);
    assert_eq!(iot.state(), State::Watchdog);
    assert_eq!(iot.return_state(), State::ProcessEvent);
}

#[test]
fn aborted_event_sleeps_for_requested_duration() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    first_boot(&mut region, &queue, &cache, &mut source);

    let mut sink = RecordingSink::new();
    let platform = MockPlatform::woken(EPOCH + 30, WakeCause::External);
    let app = |state: State, ctx: &mut StepContext| match state {
        State::WaitForEvent => UserResult::NewEvent,
        State::ProcessEvent => {
            ctx.set_deep_sleep_duration(50);
            UserResult::Aborted
        }
        _ => UserResult::Completed,
    };
    let mut iot = IotService::new(platform, radio(&queue, &cache), &mut region).with_handler(app);
    iot.init(&mut source, &mut sink).unwrap();

    assert_eq!(iot.process(&mut sink), Cycle::Awake);
    assert_eq!(iot.process(&mut sink), Cycle::Suspended { secs: 50 });
    assert_eq!(iot.state(), State::WaitForEvent);
    assert_eq!(
        iot.platform().last_sleep(),
        Some((50, WakeSource::TimerOrExternal))
    );
}

#[test]
fn aborted_event_without_override_sleeps_until_watchdog() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    first_boot(&mut region, &queue, &cache, &mut source);

    // Watchdog due at EPOCH + 600, so 50 s remain.
    let mut sink = RecordingSink::new();
    let platform = MockPlatform::woken(EPOCH + 550, WakeCause::External);
    let app = |state: State, _ctx: &mut StepContext| match state {
        State::WaitForEvent => UserResult::NewEvent,
        State::ProcessEvent => UserResult::Aborted,
        _ => UserResult::Completed,
    };
    let mut iot = IotService::new(platform, radio(&queue, &cache), &mut region).with_handler(app);
    iot.init(&mut source, &mut sink).unwrap();
    assert_eq!(iot.next_watchdog_at(), EPOCH + 600);

    assert_eq!(iot.process(&mut sink), Cycle::Awake);
    assert_eq!(iot.state(), State::ProcessEvent);
    assert_eq!(iot.process(&mut sink), Cycle::Suspended { secs: 50 });
    assert_eq!(iot.state(), State::WaitForEvent);
    assert_eq!(iot.platform().last_sleep(), Some((50, WakeSource::Timer)));
    assert!(sink.sent().is_empty());
}

#[test]
fn negative_override_keeps_device_awake_for_one_step() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    first_boot(&mut region, &queue, &cache, &mut source);

    let mut sink = RecordingSink::new();
    let platform = MockPlatform::woken(EPOCH + 30, WakeCause::External);
    let mut calls = 0;
    let app = move |_state: State, ctx: &mut StepContext| {
        calls += 1;
        if calls == 1 {
            ctx.set_deep_sleep_duration(-1);
        }
        UserResult::NotCompleted
    };
    let mut iot = IotService::new(platform, radio(&queue, &cache), &mut region).with_handler(app);
    iot.init(&mut source, &mut sink).unwrap();

    assert_eq!(iot.process(&mut sink), Cycle::Awake);
    assert!(iot.platform().sleeps.is_empty());
    // The override applied to one step only.
    assert_eq!(iot.process(&mut sink), Cycle::Suspended { secs: 570 });
}

#[test]
fn application_report_carries_extra_field() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    first_boot(&mut region, &queue, &cache, &mut source);

    let mut sink = RecordingSink::new();
    let platform = MockPlatform::woken(EPOCH + 30, WakeCause::External);
    let app = |_state: State, ctx: &mut StepContext| {
        assert!(ctx.send_msg("DOOR", Some("open:1")));
        ctx.increment_error_count();
        UserResult::NotCompleted
    };
    let mut iot = IotService::new(platform, radio(&queue, &cache), &mut region).with_handler(app);
    iot.init(&mut source, &mut sink).unwrap();

    assert_eq!(iot.process(&mut sink), Cycle::Suspended { secs: 570 });
    assert_eq!(sink.sent(), vec![("DOOR", 1)]);
    let text = payload_text(&iot.transport().link().frames[0]);
    assert!(text.starts_with("home/porch;{name:porch,type:DOOR,seq:1,"), "{text}");
    assert!(text.contains(",err:1,"), "{text}");
    assert!(text.ends_with(",open:1}"), "{text}");
}

// ── Delivery failures ─────────────────────────────────────────

#[test]
fn missing_confirmation_counts_an_error() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    let mut sink = RecordingSink::new();

    let mut link = MockRadioLink::with_gateway(&queue);
    link.deliver = None;
    let transport = RadioTransport::new(link, cache.clone(), &queue);
    let mut iot =
        IotService::new(MockPlatform::cold(EPOCH), transport, &mut region).with_handler(idle_app);
    iot.init(&mut source, &mut sink).unwrap();

    assert!(matches!(iot.process(&mut sink), Cycle::Suspended { .. }));
    assert_eq!(iot.error_count(), 1);
    assert_eq!(iot.sequence_number(), 1, "sequence advances on failure");
    assert_eq!(
        sink.failed(),
        vec![("STARTUP", TransportError::ConfirmationTimeout)]
    );
    assert!(iot.platform().uptime_ms >= 200);
}

#[test]
fn negative_confirmation_counts_an_error() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    let mut sink = RecordingSink::new();

    let mut link = MockRadioLink::with_gateway(&queue);
    link.deliver = Some(false);
    let transport = RadioTransport::new(link, cache.clone(), &queue);
    let mut iot =
        IotService::new(MockPlatform::cold(EPOCH), transport, &mut region).with_handler(idle_app);
    iot.init(&mut source, &mut sink).unwrap();
    iot.process(&mut sink);

    assert_eq!(sink.failed(), vec![("STARTUP", TransportError::NotDelivered)]);
    assert_eq!(iot.error_count(), 1);
}

#[test]
fn stale_confirmations_are_drained_before_sending() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    let mut sink = RecordingSink::new();

    let mut iot = IotService::new(MockPlatform::cold(EPOCH), radio(&queue, &cache), &mut region)
        .with_handler(idle_app);
    iot.init(&mut source, &mut sink).unwrap();
    for _ in 0..5 {
        queue.post(SendConfirmation {
            peer: GATEWAY,
            delivered: false,
        });
    }
    iot.process(&mut sink);

    assert_eq!(sink.sent(), vec![("STARTUP", 0)]);
    assert_eq!(iot.error_count(), 0);
    assert!(queue.is_empty());
}

#[test]
fn confirmations_from_other_peers_do_not_count() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    let mut sink = RecordingSink::new();

    let mut link = MockRadioLink::with_gateway(&queue);
    link.stray = Some([0x10; 6]);
    let transport = RadioTransport::new(link, cache.clone(), &queue);
    let mut iot =
        IotService::new(MockPlatform::cold(EPOCH), transport, &mut region).with_handler(idle_app);
    iot.init(&mut source, &mut sink).unwrap();

    assert_eq!(iot.send_msg("TEST", None, &mut sink), Ok(()));

    // Without the gateway's own confirmation the stray one is not enough.
    iot.transport_mut().link_mut().deliver = None;
    assert_eq!(
        iot.send_msg("TEST", None, &mut sink),
        Err(TransportError::ConfirmationTimeout)
    );
    assert_eq!(iot.error_count(), 1);
    assert!(queue.is_empty());
}

// ── Discovery backoff ─────────────────────────────────────────

#[test]
fn discovery_backoff_grows_and_caps_at_one_day() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    let expected = [10, 160, 810, 2560, 6250, 12_960, 24_010, 40_960, 65_610, 86_400, 86_400];

    for (boot, secs) in expected.into_iter().enumerate() {
        let platform = if boot == 0 {
            MockPlatform::cold(EPOCH)
        } else {
            MockPlatform::woken(EPOCH + 60 * boot as i64, WakeCause::Timer)
        };
        let mut sink = RecordingSink::new();
        let transport = RadioTransport::new(MockRadioLink::new(&queue), cache.clone(), &queue);
        let mut iot = IotService::new(platform, transport, &mut region).with_handler(idle_app);

        assert_eq!(
            iot.init(&mut source, &mut sink),
            Err(Error::Transport(TransportError::GatewayUnreachable {
                retry_in_secs: secs
            }))
        );
        assert_eq!(iot.platform().last_sleep(), Some((secs, WakeSource::Timer)));
        assert!(sink.events.contains(&AppEvent::DiscoveryBackoff {
            failures: boot as u32 + 1,
            secs,
        }));
        // Discovery failures are not reported and do not count as errors.
        assert!(iot.transport().link().frames.is_empty());
        assert_eq!(iot.error_count(), 0);
    }
    assert_eq!(region.radio.gateway_failures, 11);
    assert_eq!(region.radio.discovery_failed, 1);
    assert!(!cache.is_valid());
}

#[test]
fn successful_discovery_clears_backoff() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);

    {
        let mut sink = RecordingSink::new();
        let transport = RadioTransport::new(MockRadioLink::new(&queue), cache.clone(), &queue);
        let mut iot = IotService::new(MockPlatform::cold(EPOCH), transport, &mut region);
        assert!(iot.init(&mut source, &mut sink).is_err());
    }
    assert_eq!(region.radio.gateway_failures, 1);

    let mut sink = RecordingSink::new();
    let platform = MockPlatform::woken(EPOCH + 10, WakeCause::Timer);
    let mut iot =
        IotService::new(platform, radio(&queue, &cache), &mut region).with_handler(idle_app);
    iot.init(&mut source, &mut sink).unwrap();
    assert_eq!(iot.transport().link().scans, 1);
    drop(iot);

    assert_eq!(region.radio.gateway_failures, 0);
    assert_eq!(region.radio.discovery_failed, 0);
}

#[test]
fn cold_boot_rediscovers_despite_cached_gateway() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    first_boot(&mut region, &queue, &cache, &mut source);
    assert!(cache.is_valid());

    let mut sink = RecordingSink::new();
    let mut iot = IotService::new(MockPlatform::cold(EPOCH + 5), radio(&queue, &cache), &mut region)
        .with_handler(idle_app);
    iot.init(&mut source, &mut sink).unwrap();
    assert_eq!(iot.transport().link().scans, 1);
}

#[test]
fn failed_rediscovery_drops_cached_gateway() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    first_boot(&mut region, &queue, &cache, &mut source);
    assert!(cache.is_valid());

    {
        let mut sink = RecordingSink::new();
        let transport = RadioTransport::new(MockRadioLink::new(&queue), cache.clone(), &queue);
        let mut iot = IotService::new(MockPlatform::cold(EPOCH + 5), transport, &mut region);
        assert!(iot.init(&mut source, &mut sink).is_err());
    }
    assert!(!cache.is_valid(), "gateway gone from cache");
    assert_eq!(cache.get(), None);

    // The next timer wake scans again instead of trusting a stale peer.
    let mut sink = RecordingSink::new();
    let platform = MockPlatform::woken(EPOCH + 15, WakeCause::Timer);
    let mut iot =
        IotService::new(platform, radio(&queue, &cache), &mut region).with_handler(idle_app);
    iot.init(&mut source, &mut sink).unwrap();
    assert_eq!(iot.transport().link().scans, 1);
    assert_eq!(iot.transport().peer().map(|p| p.address), Some(GATEWAY));
}

// ── Retained memory integrity ─────────────────────────────────

#[test]
fn checksum_gate_rebuilds_only_damaged_record() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    first_boot(&mut region, &queue, &cache, &mut source);
    assert_eq!(source.reads, 1);

    let wake = |region: &mut RetainedRegion, source: &mut MemSource| {
        let mut sink = RecordingSink::new();
        let platform = MockPlatform::woken(EPOCH + 30, WakeCause::External);
        let mut iot = IotService::new(platform, radio(&queue, &cache), region);
        iot.init(source, &mut sink).unwrap();
        assert_eq!(iot.config().device_name.as_str(), "porch");
    };

    wake(&mut region, &mut source);
    assert_eq!(source.reads, 1);

    region.config.as_bytes_mut()[10] ^= 0x01;
    wake(&mut region, &mut source);
    assert_eq!(source.reads, 2);
    assert!(region.config.is_valid());
}

#[test]
fn corrupt_retained_state_is_treated_as_cold_boot() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    first_boot(&mut region, &queue, &cache, &mut source);

    region.core.state = 0x03;
    region.core.sequence_number = 77;

    let mut sink = RecordingSink::new();
    let platform = MockPlatform::woken(EPOCH + 30, WakeCause::Timer);
    let mut iot =
        IotService::new(platform, radio(&queue, &cache), &mut region).with_handler(idle_app);
    iot.init(&mut source, &mut sink).unwrap();

    assert_eq!(iot.boot_class(), BootClass::Cold);
    assert_eq!(iot.state(), State::Startup);
    assert_eq!(iot.sequence_number(), 0);
    assert_eq!(source.reads, 2, "cold path forces a rebuild");
    assert_eq!(
        sink.events.last(),
        Some(&AppEvent::Started {
            boot: BootClass::Cold,
            state: State::Startup
        })
    );
}

// ── Battery ───────────────────────────────────────────────────

#[test]
fn battery_voltage_is_reported_and_released_before_sleep() {
    let queue = ConfirmationQueue::new();
    let cache = SharedPeerCache::default();
    let mut region = RetainedRegion::ZEROED;
    let mut source = MemSource::new(CONFIG);
    let mut sink = RecordingSink::new();
    let prepared = Rc::new(RefCell::new(0));

    let mut iot = IotService::new(MockPlatform::cold(EPOCH), radio(&queue, &cache), &mut region)
        .with_handler(idle_app)
        .with_battery(FixedBattery {
            volts: 4.1,
            prepared: Rc::clone(&prepared),
        });
    iot.init(&mut source, &mut sink).unwrap();
    iot.process(&mut sink);

    let text = payload_text(&iot.transport().link().frames[0]);
    assert!(text.ends_with(",vbat:4.10}"), "{text}");
    assert_eq!(*prepared.borrow(), 1);
}
