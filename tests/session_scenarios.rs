//! End-to-end session scenarios against the simulated provider.

use proptest::prelude::*;
use quick_daq::provider::Operation;
use quick_daq::{
    ErrorCode, IoMode, QuickDaqError, SamplingMode, Session, SimulatedDevice, SimulatedProvider,
    Status, TriggerEdge,
};

// =============================================================================
// Helpers
// =============================================================================

fn session_over(devices: Vec<SimulatedDevice>) -> (SimulatedProvider, Session<SimulatedProvider>) {
    let provider = SimulatedProvider::new(devices);
    let mut session = Session::with_defaults(provider.clone());
    session.initialize().expect("initialize");
    (provider, session)
}

fn configure_and_start(session: &mut Session<SimulatedProvider>) {
    session
        .configure_sampling(SamplingMode::HwClocked, 1000.0, None, TriggerEdge::Rising, 1)
        .expect("configure sampling");
    session.start().expect("start");
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_two_device_analog_scenario() {
    let (_, mut session) = session_over(vec![
        SimulatedDevice::new("PXI1Slot0").channels(IoMode::AnalogIn, 4),
        SimulatedDevice::new("PXI1Slot1").channels(IoMode::AnalogOut, 2),
    ]);

    for pin in 0..4 {
        session.set_pin_mode(0, IoMode::AnalogIn, pin).expect("bind AI");
    }
    for pin in 0..2 {
        session.set_pin_mode(1, IoMode::AnalogOut, pin).expect("bind AO");
    }
    configure_and_start(&mut session);

    assert_eq!(session.status(), Status::Running);
    let tasks = session.tasks();
    let ai = tasks.singleton(IoMode::AnalogIn).expect("AI task");
    let ao = tasks.singleton(IoMode::AnalogOut).expect("AO task");
    assert_eq!(tasks[ai].pin_count(), 4);
    assert_eq!(tasks[ao].pin_count(), 2);
    assert_eq!(session.clock_source().terminal(), "PXI1Slot0/ai/SampleClock");
    assert_eq!(session.registry().first(), Some(ai));
}

#[test]
fn test_counter_only_scenario() {
    let (provider, mut session) = session_over(vec![
        SimulatedDevice::new("PXI1Slot3").channels(IoMode::CounterAngleIn, 4),
        SimulatedDevice::new("PXI1Slot4").channels(IoMode::CounterAngleIn, 4),
    ]);

    session.set_pin_mode(3, IoMode::CounterAngleIn, 0).expect("bind ctr0");
    session.set_pin_mode(4, IoMode::CounterAngleIn, 1).expect("bind ctr1");
    configure_and_start(&mut session);

    assert_eq!(session.registry().len(), 2);
    for id in session.registry().iter() {
        let task = &session.tasks()[id];
        assert_eq!(task.io_mode(), IoMode::CounterAngleIn);
        assert_eq!(task.pin_count(), 1);
        assert!(provider.is_running(task.handle()));
    }
    assert_eq!(session.clock_source().terminal(), "OnboardClock");
}

#[test]
fn test_loopback_round_trip() {
    let (_, mut session) = session_over(vec![SimulatedDevice::new("PXI1Slot2")
        .channels(IoMode::AnalogIn, 8)
        .channels(IoMode::AnalogOut, 4)
        .loopback(true)]);

    for pin in 0..4 {
        session.set_pin_mode(2, IoMode::AnalogIn, pin).expect("bind AI");
        session.set_pin_mode(2, IoMode::AnalogOut, pin).expect("bind AO");
    }
    configure_and_start(&mut session);

    session.set_analog_out_pin(2, 3, -4.75).expect("stage AO3");
    session.write_analog(2).expect("write");
    session.read_analog(2).expect("read");
    assert_eq!(session.get_analog_in_pin(2, 3).expect("AI3"), Some(-4.75));
}

#[test]
fn test_stop_twice_keeps_ready() {
    let (provider, mut session) = session_over(vec![
        SimulatedDevice::new("PXI1Slot2").channels(IoMode::AnalogIn, 2)
    ]);
    session.set_pin_mode(2, IoMode::AnalogIn, 0).expect("bind");
    configure_and_start(&mut session);

    session.stop().expect("first stop");
    session.stop().expect("second stop");
    assert_eq!(session.status(), Status::Ready);
    assert_eq!(provider.calls(Operation::StopTask), 1);

    let ai = session.tasks().singleton(IoMode::AnalogIn).expect("AI task");
    assert!(session.tasks()[ai].buffer().is_none());
}

#[test]
fn test_restart_after_stop_reallocates_buffers() {
    let (_, mut session) = session_over(vec![SimulatedDevice::new("PXI1Slot2")
        .channels(IoMode::AnalogIn, 2)
        .channels(IoMode::AnalogOut, 2)
        .loopback(true)]);
    session.set_pin_mode(2, IoMode::AnalogOut, 0).expect("bind");
    configure_and_start(&mut session);
    session.set_analog_out_pin(2, 0, 3.0).expect("stage");
    session.stop().expect("stop");

    session.start().expect("restart");
    let ao = session.tasks().singleton(IoMode::AnalogOut).expect("AO task");
    let buffer = session.tasks()[ao].buffer().expect("buffer");
    assert_eq!(buffer.as_float(), Some(&[0.0][..]));
}

#[test]
fn test_terminate_releases_everything() {
    let (provider, mut session) = session_over(vec![SimulatedDevice::new("PXI1Slot2")
        .channels(IoMode::AnalogIn, 2)
        .channels(IoMode::DigitalOut, 1)
        .channels(IoMode::CounterAngleIn, 2)]);
    session.set_pin_mode(2, IoMode::AnalogIn, 1).expect("bind AI");
    session.set_pin_mode(2, IoMode::DigitalOut, 0).expect("bind DO");
    session.set_pin_mode(2, IoMode::CounterAngleIn, 1).expect("bind CI");
    configure_and_start(&mut session);
    assert_eq!(provider.live_tasks(), 3);

    session.terminate().expect("terminate");
    assert_eq!(session.status(), Status::Nascent);
    assert_eq!(provider.live_tasks(), 0);
    assert!(session.catalog().is_none());
    assert!(session.tasks().is_empty());

    // a terminated session can be brought up again
    session.initialize().expect("re-initialize");
    assert_eq!(session.status(), Status::Initialized);
}

#[test]
fn test_dropping_session_clears_tasks() {
    let provider = SimulatedProvider::new(vec![
        SimulatedDevice::new("PXI1Slot2").channels(IoMode::AnalogOut, 2)
    ]);
    {
        let mut session = Session::with_defaults(provider.clone());
        session.initialize().expect("initialize");
        session.set_pin_mode(2, IoMode::AnalogOut, 0).expect("bind");
        configure_and_start(&mut session);
        assert_eq!(provider.live_tasks(), 1);
    }
    assert_eq!(provider.live_tasks(), 0);
}

// =============================================================================
// Fatal paths
// =============================================================================

#[test]
fn test_hardware_fault_during_start() {
    let (provider, mut session) = session_over(vec![
        SimulatedDevice::new("PXI1Slot2").channels(IoMode::AnalogIn, 2)
    ]);
    session.set_pin_mode(2, IoMode::AnalogIn, 0).expect("bind");
    session.configure_sampling_from_config().expect("configure");

    provider.fail_on(Operation::StartTask, -50103, "The specified resource is reserved.");
    let err = session.start().expect_err("start must fail");

    assert!(matches!(err, QuickDaqError::Hardware(_)));
    assert_eq!(err.exit_code(), -50103);
    assert_eq!(session.status(), Status::Unknown);
    assert_eq!(session.error_code(), ErrorCode::Hardware);
    assert_eq!(provider.live_tasks(), 0);
}

#[test]
fn test_sync_timeout_is_hardware_fault() {
    let (provider, mut session) = session_over(vec![
        SimulatedDevice::new("PXI1Slot2").channels(IoMode::AnalogIn, 2)
    ]);
    session.set_pin_mode(2, IoMode::AnalogIn, 0).expect("bind");
    configure_and_start(&mut session);

    provider.fail_on(
        Operation::WaitForNextSampleClock,
        -209802,
        "Wait for next sample clock timed out.",
    );
    let err = session.sync_sampling().expect_err("sync must fail");
    assert!(err.is_hardware());
    assert_eq!(session.status(), Status::Unknown);
}

#[test]
fn test_cleanup_failures_are_collected() {
    let (provider, mut session) = session_over(vec![SimulatedDevice::new("PXI1Slot2")
        .channels(IoMode::AnalogIn, 2)
        .channels(IoMode::AnalogOut, 2)]);
    session.set_pin_mode(2, IoMode::AnalogIn, 0).expect("bind AI");
    session.set_pin_mode(2, IoMode::AnalogOut, 0).expect("bind AO");
    configure_and_start(&mut session);

    provider.fail_on(Operation::ClearTask, -200088, "Task specified is invalid");
    match session.terminate() {
        Err(QuickDaqError::ShutdownFailed(errors)) => assert_eq!(errors.len(), 1),
        other => panic!("expected ShutdownFailed, got {other:?}"),
    }
    // cleanup still ran to completion
    assert_eq!(session.status(), Status::Nascent);
    assert!(session.tasks().is_empty());
}

// =============================================================================
// Properties
// =============================================================================

fn mixed_rig() -> Vec<SimulatedDevice> {
    vec![
        SimulatedDevice::new("PXI1Slot1")
            .channels(IoMode::AnalogIn, 4)
            .channels(IoMode::AnalogOut, 4)
            .channels(IoMode::DigitalOut, 2)
            .channels(IoMode::CounterAngleIn, 2),
        SimulatedDevice::new("PXI1Slot2")
            .channels(IoMode::AnalogIn, 4)
            .channels(IoMode::AnalogOut, 4)
            .channels(IoMode::DigitalOut, 2)
            .channels(IoMode::CounterAngleIn, 2),
    ]
}

fn bindable_mode() -> impl Strategy<Value = IoMode> {
    prop_oneof![
        Just(IoMode::AnalogIn),
        Just(IoMode::AnalogOut),
        Just(IoMode::DigitalOut),
        Just(IoMode::CounterAngleIn),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_clock_owner_is_order_independent(
        binds in prop::collection::vec((1u32..3, bindable_mode(), 0u32..2), 1..10)
    ) {
        let (_, mut forward) = session_over(mixed_rig());
        for (device, mode, pin) in &binds {
            forward.set_pin_mode(*device, *mode, *pin).expect("bind");
        }
        let (_, mut backward) = session_over(mixed_rig());
        for (device, mode, pin) in binds.iter().rev() {
            backward.set_pin_mode(*device, *mode, *pin).expect("bind");
        }

        let best = binds.iter().map(|(_, mode, _)| *mode).min();
        prop_assert_eq!(forward.clock_source().owner_mode(), best);
        prop_assert_eq!(backward.clock_source().owner_mode(), best);
    }

    #[test]
    fn prop_pin_count_counts_distinct_pins(
        pins in prop::collection::vec(0u32..4, 1..16)
    ) {
        let (_, mut session) = session_over(mixed_rig());
        for pin in &pins {
            session.set_pin_mode(1, IoMode::AnalogIn, *pin).expect("bind");
        }
        configure_and_start(&mut session);

        let mut distinct = pins.clone();
        distinct.sort_unstable();
        distinct.dedup();
        let ai = session.tasks().singleton(IoMode::AnalogIn).expect("AI task");
        prop_assert_eq!(session.tasks()[ai].pin_count(), distinct.len());
        for pin in distinct {
            let bound = session.pin(1, IoMode::AnalogIn, pin).expect("pin");
            prop_assert!(bound.is_bound());
        }
    }

    #[test]
    fn prop_one_past_last_channel_is_fatal(count in 1u32..32) {
        let (_, mut session) = session_over(vec![
            SimulatedDevice::new("PXI1Slot5").channels(IoMode::AnalogIn, count)
        ]);
        let err = session
            .set_pin_mode(5, IoMode::AnalogIn, count)
            .expect_err("one past the end");
        let is_invalid_io = matches!(err, QuickDaqError::InvalidIo { .. });
        prop_assert!(is_invalid_io);
        prop_assert_eq!(session.status(), Status::Shutdown);
        prop_assert_eq!(session.error_code(), ErrorCode::InvalidIo);
    }
}
