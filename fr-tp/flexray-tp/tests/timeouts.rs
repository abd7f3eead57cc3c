use core::time::Duration;

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
use flexray_tp::{
    ConnectionConfig, ConnectionId, FrTpError, FrameType, PciSizes, Progress, SlotTimers,
    TimeoutKind, TxEngine, TxState,
};
use flexray_tp_mock::{MockLink, MockUpper};

const A: ConnectionId = 0x10;

type Timers = SlotTimers<NoopRawMutex, 1>;
type Engine<'t> =
    TxEngine<'t, NoopRawMutex, [(ConnectionId, ConnectionConfig); 1], MockUpper, MockLink, 1>;

/// 5 ms cycle: N_As = 4 ticks, N_Bs = 10 ticks, N_Cs = 6 ticks.
fn cfg() -> ConnectionConfig {
    ConnectionConfig {
        payload_size: 8,
        address_size: 0,
        pci: PciSizes {
            start: 1,
            consecutive: 2,
            max_message_len: 4095,
        },
        n_as: Duration::from_millis(20),
        n_bs: Duration::from_millis(50),
        n_cs: Duration::from_millis(30),
        tick_period: Duration::from_millis(5),
        flow_control: true,
        wft_max: None,
    }
}

fn engine_with(timers: &Timers, cfg: ConnectionConfig) -> Engine<'_> {
    let mut e = TxEngine::new([(A, cfg)], MockUpper::new(), MockLink::new(), timers);
    let data: Vec<u8> = (0..40).collect();
    e.upper_mut().load(A, &data);
    e
}

fn tick_n(e: &mut Engine<'_>, n: usize) {
    for _ in 0..n {
        e.tick(A);
    }
}

#[test]
fn data_timeout_when_upper_layer_never_stages() {
    let timers = Timers::new();
    let mut e = engine_with(&timers, cfg());
    e.upper_mut().set_busy(A, true);
    e.transmit(A, 40, FrameType::First).unwrap();

    for _ in 0..5 {
        assert_eq!(e.is_data_pending(A), 0);
        e.tick(A);
    }
    assert_eq!(e.state(A), TxState::WaitingForData);
    e.tick(A);
    assert_eq!(e.state(A), TxState::Idle);
    assert_eq!(
        e.upper().results_for(A),
        vec![Err(FrTpError::Timeout(TimeoutKind::NCs))]
    );

    tick_n(&mut e, 10);
    assert_eq!(e.upper().confirmations().len(), 1);
}

#[test]
fn confirmation_timeout_cancels_the_copied_frame() {
    let timers = Timers::new();
    let mut e = engine_with(&timers, cfg());
    e.transmit(A, 40, FrameType::First).unwrap();
    assert_eq!(e.is_data_pending(A), 1);
    let mut buf = [0u8; 8];
    assert!(e.copy_data(A, &mut buf).is_some());

    tick_n(&mut e, 3);
    assert_eq!(e.state(A), TxState::Sending);
    e.tick(A);
    assert_eq!(e.state(A), TxState::Idle);
    assert_eq!(e.link().cancels(), &[A]);
    assert_eq!(
        e.upper().results_for(A),
        vec![Err(FrTpError::Timeout(TimeoutKind::NAs))]
    );

    e.tx_confirmation(A);
    assert_eq!(e.upper().confirmations().len(), 1);
}

#[test]
fn confirmation_timeout_without_copy_cancels_nothing() {
    let timers = Timers::new();
    let mut e = engine_with(&timers, cfg());
    e.transmit(A, 40, FrameType::First).unwrap();
    assert_eq!(e.is_data_pending(A), 1);

    tick_n(&mut e, 4);
    assert_eq!(e.state(A), TxState::Idle);
    assert!(e.link().cancels().is_empty());
    assert_eq!(
        e.upper().results_for(A),
        vec![Err(FrTpError::Timeout(TimeoutKind::NAs))]
    );
}

#[test]
fn flow_control_timeout() {
    let timers = Timers::new();
    let mut e = engine_with(&timers, cfg());
    e.transmit(A, 40, FrameType::First).unwrap();
    let mut buf = [0u8; 8];
    assert!(matches!(e.poll_send(A, &mut buf), Progress::Sent(_)));
    e.tx_confirmation(A);
    assert_eq!(e.state(A), TxState::WaitingForFlowControl);

    tick_n(&mut e, 9);
    assert_eq!(e.state(A), TxState::WaitingForFlowControl);
    e.tick(A);
    assert_eq!(e.state(A), TxState::Idle);
    assert_eq!(
        e.upper().results_for(A),
        vec![Err(FrTpError::Timeout(TimeoutKind::NBs))]
    );
}

#[test]
fn separation_expiry_resumes_without_notification() {
    let timers = Timers::new();
    let mut e = engine_with(&timers, cfg());
    e.transmit(A, 40, FrameType::First).unwrap();
    let mut buf = [0u8; 8];
    assert!(matches!(e.poll_send(A, &mut buf), Progress::Sent(_)));
    e.tx_confirmation(A);
    e.received_clear_to_send(A, 5, 20);
    assert!(matches!(e.poll_send(A, &mut buf), Progress::Sent(_)));
    e.tx_confirmation(A);
    assert_eq!(e.state(A), TxState::WaitingForSeparation);

    tick_n(&mut e, 4);
    assert_eq!(e.state(A), TxState::WaitingForData);
    assert!(e.upper().confirmations().is_empty());

    // The data timer starts fresh once the separation wait is over.
    e.upper_mut().set_busy(A, true);
    tick_n(&mut e, 5);
    assert_eq!(e.state(A), TxState::WaitingForData);
    e.tick(A);
    assert_eq!(
        e.upper().results_for(A),
        vec![Err(FrTpError::Timeout(TimeoutKind::NCs))]
    );
}

#[test]
fn zero_timeout_never_expires() {
    let timers = Timers::new();
    let mut e = engine_with(
        &timers,
        ConnectionConfig {
            n_cs: Duration::ZERO,
            ..cfg()
        },
    );
    e.upper_mut().set_busy(A, true);
    e.transmit(A, 40, FrameType::First).unwrap();
    tick_n(&mut e, 1000);
    assert_eq!(e.state(A), TxState::WaitingForData);
    assert!(e.upper().confirmations().is_empty());
}

#[test]
fn ticking_an_idle_connection_is_harmless() {
    let timers = Timers::new();
    let mut e = engine_with(&timers, cfg());
    tick_n(&mut e, 3);
    e.tick_all();
    assert_eq!(e.state(A), TxState::Idle);
    assert!(e.upper().confirmations().is_empty());
}

#[test]
fn critical_section_mutex_drives_a_full_transfer() {
    let timers: SlotTimers<CriticalSectionRawMutex, 1> = SlotTimers::new();
    let mut e = TxEngine::new([(A, cfg())], MockUpper::new(), MockLink::new(), &timers);
    let data: Vec<u8> = (0..40).collect();
    e.upper_mut().load(A, &data);
    e.transmit(A, 40, FrameType::First).unwrap();

    let mut buf = [0u8; 8];
    for _ in 0..50 {
        e.tick_all();
        match e.poll_send(A, &mut buf) {
            Progress::Sent(_) => e.tx_confirmation(A),
            Progress::WaitingForFlowControl => e.received_clear_to_send(A, 2, 10),
            Progress::WouldBlock => {}
            Progress::Idle => break,
        }
    }
    assert_eq!(e.state(A), TxState::Idle);
    assert_eq!(e.link().payload_for(A), data);
    assert_eq!(e.upper().results_for(A), vec![Ok(())]);
}

#[test]
fn timers_tick_from_another_thread_while_the_engine_is_live() {
    let timers: SlotTimers<CriticalSectionRawMutex, 1> = SlotTimers::new();
    let mut e = TxEngine::new([(A, cfg())], MockUpper::new(), MockLink::new(), &timers);
    e.upper_mut().load(A, &[7; 40]);
    e.transmit(A, 40, FrameType::First).unwrap();
    let mut buf = [0u8; 8];
    assert!(matches!(e.poll_send(A, &mut buf), Progress::Sent(_)));
    e.tx_confirmation(A);
    assert_eq!(e.state(A), TxState::WaitingForFlowControl);

    std::thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..10 {
                timers.tick();
            }
        });
    });

    // Expiry is only flagged until the event context handles it.
    assert!(timers.is_expired(0));
    assert_eq!(e.state(A), TxState::WaitingForFlowControl);
    assert!(e.upper().confirmations().is_empty());

    e.process_timeouts();
    assert_eq!(e.state(A), TxState::Idle);
    assert!(!timers.is_expired(0));
    assert_eq!(
        e.upper().results_for(A),
        vec![Err(FrTpError::Timeout(TimeoutKind::NBs))]
    );
}

#[test]
fn event_handled_before_the_flagged_expiry_wins() {
    let timers = Timers::new();
    let mut e = engine_with(&timers, cfg());
    e.transmit(A, 40, FrameType::First).unwrap();
    let mut buf = [0u8; 8];
    assert!(matches!(e.poll_send(A, &mut buf), Progress::Sent(_)));

    for _ in 0..4 {
        e.timers().tick();
    }
    assert!(e.timers().is_expired(0));

    e.tx_confirmation(A);
    assert_eq!(e.state(A), TxState::WaitingForFlowControl);
    e.process_timeouts();
    assert_eq!(e.state(A), TxState::WaitingForFlowControl);
    assert!(e.upper().confirmations().is_empty());
    assert!(e.link().cancels().is_empty());
}
