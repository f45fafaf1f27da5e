//! End-to-end lifecycle tests against the mock camera.

use camera_lifecycle::capture::MockHandle;
use camera_lifecycle::hotplug::{channel_source, makedev, HotplugEvent, HotplugFilter};
use camera_lifecycle::manager::SHUTDOWN_TIMEOUT;
use camera_lifecycle::{
    CameraError, CameraManager, CaptureDevice, Frame, FrameMailbox, MailboxEvent, ManagerState,
    MockCamera, SessionExit, StartOutcome,
};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Records every availability notification.
#[derive(Clone, Default)]
struct StatusLog(Arc<Mutex<Vec<bool>>>);

impl StatusLog {
    fn sink(&self) -> impl Fn(bool) + Send + Sync + 'static {
        let log = Arc::clone(&self.0);
        move |available: bool| log.lock().unwrap().push(available)
    }

    fn events(&self) -> Vec<bool> {
        self.0.lock().unwrap().clone()
    }
}

/// Camera whose driver takes a long time to open.
struct SlowOpenCamera {
    inner: MockCamera,
    open_delay: Duration,
}

impl CaptureDevice for SlowOpenCamera {
    type Handle = MockHandle;

    fn open(&self) -> Result<MockHandle, CameraError> {
        thread::sleep(self.open_delay);
        self.inner.open()
    }
}

fn usb_camera_bound() -> HotplugEvent {
    HotplugEvent::bound("usb", makedev(189, 3))
}

#[test]
fn test_enable_with_device_present_delivers_frames() {
    let camera = MockCamera::new().read_delay(Duration::from_millis(1));
    let mailbox = FrameMailbox::new();
    let manager = CameraManager::new(camera.clone(), 100.0, mailbox.clone()).unwrap();
    let status = StatusLog::default();
    manager.set_status_sink(status.sink());

    manager.set_enabled(true);
    assert!(wait_for(|| manager.state() == ManagerState::Capturing));
    assert!(wait_for(|| mailbox.accepted() >= 3));
    assert_eq!(status.events(), vec![true]);
    assert!(manager.is_available());

    match mailbox.wait(Duration::from_secs(1)) {
        MailboxEvent::Frame(frame) => {
            assert_eq!((frame.width(), frame.height()), (8, 6));
            assert!(frame.is_valid());
        }
        other => panic!("expected a frame, got {:?}", other),
    }

    manager.stop();
    assert!(wait_for(|| status.events() == vec![true, false]));
    assert_eq!(camera.successful_opens(), 1);
    assert_eq!(camera.release_calls(), 1);
}

#[test]
fn test_rate_limit_delivers_latest_frame_at_most_every_interval() {
    let camera = MockCamera::new().read_delay(Duration::from_millis(1));
    let deliveries: Arc<Mutex<Vec<(Instant, bool)>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = {
        let deliveries = Arc::clone(&deliveries);
        let camera = camera.clone();
        move |frame: Frame| {
            // The loop reads again only after the sink returns, so the
            // delivered frame must be the newest one produced.
            let freshest = frame.sequence() == camera.frames_produced();
            deliveries.lock().unwrap().push((Instant::now(), freshest));
        }
    };
    let manager = CameraManager::new(camera.clone(), 20.0, sink).unwrap();

    let started = Instant::now();
    manager.set_enabled(true);
    thread::sleep(Duration::from_millis(600));
    manager.stop();
    let elapsed = started.elapsed();

    let deliveries = deliveries.lock().unwrap().clone();
    assert!(deliveries.len() >= 4, "only {} frames delivered", deliveries.len());
    let ceiling = (elapsed.as_millis() / 50) as usize + 1;
    assert!(
        deliveries.len() <= ceiling,
        "{} frames delivered in {:?}",
        deliveries.len(),
        elapsed
    );
    for pair in deliveries.windows(2) {
        let gap = pair[1].0.duration_since(pair[0].0);
        assert!(gap >= Duration::from_millis(45), "frames {:?} apart", gap);
    }
    assert!(deliveries.iter().all(|(_, freshest)| *freshest));

    let stats = manager.stats();
    assert!(stats.frames_dropped > 0);
    assert_eq!(stats.frames_accepted as usize, deliveries.len());
    assert_eq!(stats.frames_read, stats.frames_accepted + stats.frames_dropped);
}

#[test]
fn test_read_failure_signals_unavailable_and_releases() {
    let camera = MockCamera::new()
        .read_delay(Duration::from_millis(1))
        .fail_after(10);
    let mailbox = FrameMailbox::new();
    let manager = CameraManager::new(camera.clone(), 1000.0, mailbox.clone()).unwrap();
    let status = StatusLog::default();
    manager.set_status_sink(status.sink());

    manager.set_enabled(true);
    assert!(wait_for(|| status.events() == vec![true, false]));
    assert!(wait_for(|| manager.state() == ManagerState::Idle));

    assert!(matches!(manager.last_exit(), Some(SessionExit::ReadFailed(_))));
    assert!(!manager.is_available());
    assert_eq!(camera.successful_opens(), 1);
    assert_eq!(camera.release_calls(), 1);
    assert_eq!(camera.open_handles(), 0);
    assert_eq!(manager.stats().read_failures, 1);

    // Still enabled, but a failed session is not retried on its own.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(camera.open_calls(), 1);
    assert_eq!(status.events(), vec![true, false]);
}

#[test]
fn test_injected_read_failure_mid_stream() {
    let camera = MockCamera::new().read_delay(Duration::from_millis(1));
    let manager = CameraManager::new(camera.clone(), 1000.0, FrameMailbox::new()).unwrap();
    let status = StatusLog::default();
    manager.set_status_sink(status.sink());

    manager.set_enabled(true);
    assert!(wait_for(|| camera.frames_produced() >= 5));
    camera.fail_next_read();

    assert!(wait_for(|| status.events() == vec![true, false]));
    assert!(wait_for(|| camera.open_handles() == 0));
    assert_eq!(camera.release_calls(), camera.successful_opens());
}

#[test]
fn test_missing_device_stays_idle_without_status() {
    let camera = MockCamera::new().absent();
    let manager = CameraManager::new(camera.clone(), 20.0, FrameMailbox::new()).unwrap();
    let status = StatusLog::default();
    manager.set_status_sink(status.sink());

    manager.set_enabled(true);

    assert_eq!(manager.state(), ManagerState::Idle);
    assert_eq!(camera.open_calls(), 1);
    assert_eq!(camera.successful_opens(), 0);
    assert!(status.events().is_empty());
    assert_eq!(manager.stats().open_failures, 1);
    assert_eq!(manager.last_exit(), None);
}

#[test]
fn test_disable_mid_stream_stops_within_one_read() {
    let camera = MockCamera::new().read_delay(Duration::from_millis(5));
    let mailbox = FrameMailbox::new();
    let manager = CameraManager::new(camera.clone(), 1000.0, mailbox.clone()).unwrap();
    let status = StatusLog::default();
    manager.set_status_sink(status.sink());

    manager.set_enabled(true);
    assert!(wait_for(|| mailbox.accepted() >= 2));

    let disabled_at = Instant::now();
    manager.set_enabled(false);
    assert!(wait_for(|| status.events() == vec![true, false]));
    assert!(disabled_at.elapsed() < Duration::from_millis(500));

    assert!(wait_for(|| manager.state() == ManagerState::Idle));
    assert_eq!(manager.last_exit(), Some(SessionExit::Disabled));
    assert_eq!(camera.open_handles(), 0);
    assert_eq!(camera.release_calls(), 1);

    // The preview is told to drop its last frame.
    let mut cleared = false;
    for _ in 0..3 {
        if let MailboxEvent::Cleared = mailbox.wait(Duration::from_millis(50)) {
            cleared = true;
            break;
        }
    }
    assert!(cleared);
}

#[test]
fn test_reenable_starts_new_session() {
    let camera = MockCamera::new().read_delay(Duration::from_millis(1));
    let manager = CameraManager::new(camera.clone(), 1000.0, FrameMailbox::new()).unwrap();
    let status = StatusLog::default();
    manager.set_status_sink(status.sink());

    manager.set_enabled(true);
    assert!(wait_for(|| manager.state() == ManagerState::Capturing));
    manager.set_enabled(false);
    assert!(wait_for(|| manager.state() == ManagerState::Idle));
    manager.set_enabled(true);
    assert!(wait_for(|| manager.state() == ManagerState::Capturing));

    assert_eq!(status.events(), vec![true, false, true]);
    assert_eq!(camera.successful_opens(), 2);
    assert_eq!(camera.max_concurrent_handles(), 1);
    assert_eq!(manager.stats().sessions_started, 2);
}

#[test]
fn test_quick_toggle_restarts_after_stopping_session() {
    let camera = MockCamera::new().read_delay(Duration::from_millis(20));
    let manager = CameraManager::new(camera.clone(), 1000.0, FrameMailbox::new()).unwrap();

    manager.set_enabled(true);
    assert!(wait_for(|| manager.state() == ManagerState::Capturing));

    // Flip off and straight back on while the session is still in a read.
    manager.set_enabled(false);
    manager.set_enabled(true);

    assert!(wait_for(|| camera.successful_opens() == 2
        && manager.state() == ManagerState::Capturing));
    assert_eq!(camera.max_concurrent_handles(), 1);
    assert_eq!(camera.open_handles(), 1);

    manager.stop();
    assert_eq!(camera.open_handles(), 0);
}

#[test]
fn test_enable_is_idempotent() {
    let camera = MockCamera::new().read_delay(Duration::from_millis(1));
    let manager = CameraManager::new(camera.clone(), 20.0, FrameMailbox::new()).unwrap();
    let status = StatusLog::default();
    manager.set_status_sink(status.sink());

    for _ in 0..5 {
        manager.set_enabled(true);
    }
    assert!(wait_for(|| manager.state() == ManagerState::Capturing));

    assert_eq!(camera.open_calls(), 1);
    assert_eq!(status.events(), vec![true]);
}

#[test]
fn test_hotplug_while_capturing_does_not_open_twice() {
    let camera = MockCamera::new().read_delay(Duration::from_millis(1));
    let manager = CameraManager::new(camera.clone(), 20.0, FrameMailbox::new()).unwrap();
    let (injector, source) = channel_source();
    manager
        .watch_hotplug(source, HotplugFilter::default())
        .unwrap();

    manager.set_enabled(true);
    assert!(wait_for(|| manager.state() == ManagerState::Capturing));

    for _ in 0..3 {
        assert!(injector.send(usb_camera_bound()));
    }
    thread::sleep(Duration::from_millis(100));

    assert_eq!(camera.open_calls(), 1);
    assert_eq!(camera.max_concurrent_handles(), 1);
    assert_eq!(manager.stats().sessions_started, 1);
    assert_eq!(manager.state(), ManagerState::Capturing);
}

#[test]
fn test_hotplug_arrival_recovers_missing_device() {
    let camera = MockCamera::new()
        .absent()
        .read_delay(Duration::from_millis(1));
    let manager = CameraManager::new(camera.clone(), 20.0, FrameMailbox::new()).unwrap();
    let status = StatusLog::default();
    manager.set_status_sink(status.sink());
    let (injector, source) = channel_source();
    manager
        .watch_hotplug(source, HotplugFilter::default())
        .unwrap();

    manager.set_enabled(true);
    assert_eq!(manager.state(), ManagerState::Idle);

    camera.set_present(true);
    injector.send(usb_camera_bound());

    assert!(wait_for(|| manager.state() == ManagerState::Capturing));
    assert_eq!(status.events(), vec![true]);
    assert_eq!(camera.open_calls(), 2);
}

#[test]
fn test_hotplug_ignores_removal_and_non_arrivals() {
    let camera = MockCamera::new().read_delay(Duration::from_millis(1));
    let manager = CameraManager::new(camera.clone(), 20.0, FrameMailbox::new()).unwrap();
    let (injector, source) = channel_source();
    manager
        .watch_hotplug(source, HotplugFilter::default())
        .unwrap();

    // Enable switch is on but nothing has started yet.
    injector.send(HotplugEvent::bound("usb", 0));
    injector.send(HotplugEvent::bound("sound", makedev(116, 7)));
    injector.send(HotplugEvent::unbound("usb", makedev(189, 3)));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(camera.open_calls(), 0);
    assert_eq!(manager.state(), ManagerState::Idle);

    injector.send(usb_camera_bound());
    assert!(wait_for(|| manager.state() == ManagerState::Capturing));

    injector.send(HotplugEvent::unbound("usb", makedev(189, 3)));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(manager.state(), ManagerState::Capturing);
    assert_eq!(camera.open_calls(), 1);
}

#[test]
fn test_hotplug_while_disabled_does_not_open() {
    let camera = MockCamera::new();
    let manager = CameraManager::new(camera.clone(), 20.0, FrameMailbox::new()).unwrap();
    let (injector, source) = channel_source();
    manager
        .watch_hotplug(source, HotplugFilter::default())
        .unwrap();

    manager.set_enabled(false);
    injector.send(usb_camera_bound());
    thread::sleep(Duration::from_millis(100));

    assert_eq!(camera.open_calls(), 0);
    assert_eq!(manager.state(), ManagerState::Idle);
}

#[test]
fn test_second_hotplug_source_rejected() {
    let manager = CameraManager::new(MockCamera::new(), 20.0, FrameMailbox::new()).unwrap();
    let (_first_injector, first) = channel_source();
    let (_second_injector, second) = channel_source();

    manager.watch_hotplug(first, HotplugFilter::default()).unwrap();
    assert!(manager
        .watch_hotplug(second, HotplugFilter::default())
        .is_err());
}

#[test]
fn test_stop_is_terminal() {
    let camera = MockCamera::new().read_delay(Duration::from_millis(1));
    let manager = CameraManager::new(camera.clone(), 20.0, FrameMailbox::new()).unwrap();
    let (injector, source) = channel_source();
    manager
        .watch_hotplug(source, HotplugFilter::default())
        .unwrap();

    manager.set_enabled(true);
    assert!(wait_for(|| manager.state() == ManagerState::Capturing));

    manager.stop();
    manager.stop();
    assert!(manager.is_stopped());
    assert_eq!(manager.state(), ManagerState::Idle);
    assert_eq!(manager.last_exit(), Some(SessionExit::Stopped));
    assert_eq!(camera.open_handles(), 0);

    manager.set_enabled(true);
    let _ = injector.send(usb_camera_bound());
    thread::sleep(Duration::from_millis(50));
    assert_eq!(camera.open_calls(), 1);
    assert!(manager.watch_hotplug(channel_source().1, HotplugFilter::default()).is_err());
}

#[test]
fn test_stop_does_not_wait_for_slow_open() {
    let camera = MockCamera::new().read_delay(Duration::from_millis(1));
    let device = SlowOpenCamera {
        inner: camera.clone(),
        open_delay: Duration::from_secs(3),
    };
    let manager = Arc::new(CameraManager::new(device, 20.0, FrameMailbox::new()).unwrap());
    let status = StatusLog::default();
    manager.set_status_sink(status.sink());

    let starter = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || manager.try_start())
    };
    thread::sleep(Duration::from_millis(200));

    let stopping = Instant::now();
    manager.stop();
    let took = stopping.elapsed();
    assert!(took < Duration::from_secs(1), "stop() took {:?}", took);
    assert_eq!(manager.state(), ManagerState::Idle);
    assert!(matches!(starter.join().unwrap(), StartOutcome::ShutDown));

    // The abandoned open still completes and is released by its own thread.
    assert!(wait_for(|| camera.successful_opens() == 1));
    assert!(wait_for(|| camera.open_handles() == 0));
    assert_eq!(camera.release_calls(), 1);
    assert!(status.events().is_empty());
}

#[test]
fn test_stop_is_bounded_when_read_hangs() {
    let camera = MockCamera::new().read_delay(SHUTDOWN_TIMEOUT + Duration::from_secs(1));
    let manager = CameraManager::new(camera.clone(), 20.0, FrameMailbox::new()).unwrap();

    manager.set_enabled(true);
    assert!(wait_for(|| manager.state() == ManagerState::Capturing));

    let stopping = Instant::now();
    manager.stop();
    let took = stopping.elapsed();
    assert!(took >= SHUTDOWN_TIMEOUT - Duration::from_millis(100), "stop() took {:?}", took);
    assert!(took < SHUTDOWN_TIMEOUT + Duration::from_millis(800), "stop() took {:?}", took);
    assert_eq!(manager.state(), ManagerState::Idle);

    // The stuck read returns later and the session still releases.
    assert!(wait_for(|| camera.open_handles() == 0));
    assert_eq!(camera.release_calls(), camera.successful_opens());
    assert_eq!(camera.successful_opens(), 1);
}

#[test]
fn test_capture_panic_releases_and_signals() {
    let camera = MockCamera::new()
        .read_delay(Duration::from_millis(1))
        .panic_after(3);
    let manager = CameraManager::new(camera.clone(), 1000.0, FrameMailbox::new()).unwrap();
    let status = StatusLog::default();
    manager.set_status_sink(status.sink());

    manager.set_enabled(true);
    assert!(wait_for(|| status.events() == vec![true, false]));
    assert!(wait_for(|| manager.state() == ManagerState::Idle));

    assert!(matches!(manager.last_exit(), Some(SessionExit::Panicked(_))));
    assert_eq!(camera.open_handles(), 0);
    assert_eq!(camera.release_calls(), 1);
    assert_eq!(manager.stats().loop_panics, 1);
}

#[test]
fn test_drop_releases_camera() {
    let camera = MockCamera::new().read_delay(Duration::from_millis(1));
    {
        let manager = CameraManager::new(camera.clone(), 20.0, FrameMailbox::new()).unwrap();
        manager.set_enabled(true);
        assert!(wait_for(|| camera.open_handles() == 1));
    }
    assert_eq!(camera.open_handles(), 0);
    assert_eq!(camera.release_calls(), 1);
}

#[derive(Debug, Clone)]
enum Op {
    Enable(bool),
    Hotplug,
    FailRead,
    Unplug,
    Replug,
    Pause(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<bool>().prop_map(Op::Enable),
        2 => Just(Op::Hotplug),
        1 => Just(Op::FailRead),
        1 => Just(Op::Unplug),
        1 => Just(Op::Replug),
        2 => (0u64..8).prop_map(Op::Pause),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_never_two_sessions_and_every_open_released(
        ops in prop::collection::vec(op_strategy(), 1..25)
    ) {
        let camera = MockCamera::new().read_delay(Duration::from_millis(1));
        let manager = CameraManager::new(camera.clone(), 200.0, FrameMailbox::new()).unwrap();
        let status = StatusLog::default();
        manager.set_status_sink(status.sink());
        let (injector, source) = channel_source();
        manager.watch_hotplug(source, HotplugFilter::default()).unwrap();

        for op in ops {
            match op {
                Op::Enable(on) => manager.set_enabled(on),
                Op::Hotplug => {
                    injector.send(usb_camera_bound());
                }
                Op::FailRead => camera.fail_next_read(),
                Op::Unplug => camera.set_present(false),
                Op::Replug => camera.set_present(true),
                Op::Pause(ms) => thread::sleep(Duration::from_millis(ms)),
            }
            prop_assert!(camera.open_handles() <= 1);
        }

        manager.stop();
        prop_assert!(wait_for(|| camera.open_handles() == 0));
        prop_assert!(camera.max_concurrent_handles() <= 1);
        prop_assert_eq!(camera.release_calls(), camera.successful_opens());

        // Availability alternates and ends unavailable.
        prop_assert!(wait_for(|| status.events().last() != Some(&true)));
        let events = status.events();
        for (i, available) in events.iter().enumerate() {
            prop_assert_eq!(*available, i % 2 == 0);
        }
    }
}
