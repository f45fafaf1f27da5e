//! In-process hot-plug source.

use super::{HotplugError, HotplugEvent, HotplugSource};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Sending half of a [`ChannelHotplugSource`].
#[derive(Debug, Clone)]
pub struct HotplugInjector {
    tx: Sender<HotplugEvent>,
}

impl HotplugInjector {
    /// Delivers an event to the source. Returns false if the listener is gone.
    pub fn send(&self, event: HotplugEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Hot-plug source fed from an [`HotplugInjector`].
///
/// The stream closes once every injector has been dropped.
#[derive(Debug)]
pub struct ChannelHotplugSource {
    rx: Receiver<HotplugEvent>,
}

/// Creates a connected injector and source.
pub fn channel_source() -> (HotplugInjector, ChannelHotplugSource) {
    let (tx, rx) = mpsc::channel();
    (HotplugInjector { tx }, ChannelHotplugSource { rx })
}

impl HotplugSource for ChannelHotplugSource {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<HotplugEvent>, HotplugError> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(HotplugError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivers_then_closes() {
        let (injector, mut source) = channel_source();
        assert!(injector.send(HotplugEvent::bound("usb", 5)));

        let event = source.next_event(Duration::from_millis(10)).unwrap();
        assert_eq!(event, Some(HotplugEvent::bound("usb", 5)));
        assert_eq!(source.next_event(Duration::from_millis(1)).unwrap(), None);

        drop(injector);
        assert!(matches!(
            source.next_event(Duration::from_millis(1)),
            Err(HotplugError::Closed)
        ));
    }
}
