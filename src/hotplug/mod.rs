//! Hot-plug notifications.
//!
//! A [`HotplugSource`] yields device events from the operating system.
//! The [`HotplugBridge`] runs one listener thread per manager, filters
//! the events down to real device arrivals and hands them to the manager.
//! Removals are only logged; a removed camera is detected by the next
//! failed read in the capture loop.

mod bridge;
mod channel;
#[cfg(all(target_os = "linux", feature = "hotplug"))]
#[allow(unsafe_code)]
mod netlink;
mod uevent;

pub use bridge::{HotplugBridge, HotplugFilter};
pub use channel::{channel_source, ChannelHotplugSource, HotplugInjector};
#[cfg(all(target_os = "linux", feature = "hotplug"))]
pub use netlink::NetlinkHotplugSource;
pub use uevent::{makedev, parse_uevent};

use std::time::Duration;
use thiserror::Error;

/// Errors raised by hot-plug sources.
#[derive(Debug, Error)]
pub enum HotplugError {
    #[error("hot-plug socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("hot-plug event stream closed")]
    Closed,
    #[error("failed to spawn hot-plug listener: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Kind of device event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotplugAction {
    /// A driver was bound to the device; it is usable.
    Bound,
    /// The driver was unbound from the device.
    Unbound,
    /// Device node created.
    Added,
    /// Device node removed.
    Removed,
    /// Anything else the kernel reports (`change`, `move`, ...).
    Other(String),
}

impl HotplugAction {
    /// Maps a kernel uevent `ACTION` value.
    pub fn from_kernel(action: &str) -> Self {
        match action {
            "bind" => HotplugAction::Bound,
            "unbind" => HotplugAction::Unbound,
            "add" => HotplugAction::Added,
            "remove" => HotplugAction::Removed,
            other => HotplugAction::Other(other.to_string()),
        }
    }
}

/// One device notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotplugEvent {
    /// What happened to the device.
    pub action: HotplugAction,
    /// Kernel subsystem, e.g. `usb`.
    pub subsystem: String,
    /// `dev_t` of the device node; 0 for bus-level pseudo devices.
    pub device_number: u64,
    /// Sysfs path of the device, if known.
    pub devpath: String,
}

impl HotplugEvent {
    /// Creates an event with no sysfs path.
    pub fn new(action: HotplugAction, subsystem: impl Into<String>, device_number: u64) -> Self {
        Self {
            action,
            subsystem: subsystem.into(),
            device_number,
            devpath: String::new(),
        }
    }

    /// Shorthand for a `bind` event.
    pub fn bound(subsystem: impl Into<String>, device_number: u64) -> Self {
        Self::new(HotplugAction::Bound, subsystem, device_number)
    }

    /// Shorthand for an `unbind` event.
    pub fn unbound(subsystem: impl Into<String>, device_number: u64) -> Self {
        Self::new(HotplugAction::Unbound, subsystem, device_number)
    }
}

/// Blocking source of hot-plug events.
pub trait HotplugSource: Send + 'static {
    /// Waits up to `timeout` for the next event.
    ///
    /// `Ok(None)` means nothing arrived in time. [`HotplugError::Closed`]
    /// ends the subscription.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<HotplugEvent>, HotplugError>;
}

impl HotplugSource for Box<dyn HotplugSource> {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<HotplugEvent>, HotplugError> {
        (**self).next_event(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_mapping() {
        assert_eq!(HotplugAction::from_kernel("bind"), HotplugAction::Bound);
        assert_eq!(HotplugAction::from_kernel("unbind"), HotplugAction::Unbound);
        assert_eq!(HotplugAction::from_kernel("remove"), HotplugAction::Removed);
        assert_eq!(
            HotplugAction::from_kernel("change"),
            HotplugAction::Other("change".into())
        );
    }
}
