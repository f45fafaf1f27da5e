//! Kernel uevent parsing.
//!
//! A uevent datagram is a header `action@devpath` followed by
//! NUL-separated `KEY=value` pairs. Messages re-broadcast by udevd start
//! with `libudev` and carry a binary header; they are not handled here.

use super::{HotplugAction, HotplugEvent};

/// Combines major and minor numbers the way glibc's `makedev` does.
pub fn makedev(major: u64, minor: u64) -> u64 {
    ((major & 0xffff_f000) << 32)
        | ((major & 0x0000_0fff) << 8)
        | ((minor & 0xffff_ff00) << 12)
        | (minor & 0x0000_00ff)
}

/// Parses a raw kernel uevent. Returns `None` for anything that is not one.
pub fn parse_uevent(raw: &[u8]) -> Option<HotplugEvent> {
    let mut fields = raw.split(|b| *b == 0).filter(|f| !f.is_empty());
    let header = std::str::from_utf8(fields.next()?).ok()?;
    if header.starts_with("libudev") || !header.contains('@') {
        return None;
    }

    let mut action = None;
    let mut subsystem = String::new();
    let mut devpath = String::new();
    let mut major = None;
    let mut minor = None;

    for field in fields {
        let Ok(field) = std::str::from_utf8(field) else {
            continue;
        };
        let Some((key, value)) = field.split_once('=') else {
            continue;
        };
        match key {
            "ACTION" => action = Some(HotplugAction::from_kernel(value)),
            "SUBSYSTEM" => subsystem = value.to_string(),
            "DEVPATH" => devpath = value.to_string(),
            "MAJOR" => major = value.parse::<u64>().ok(),
            "MINOR" => minor = value.parse::<u64>().ok(),
            _ => {}
        }
    }

    let device_number = match (major, minor) {
        (Some(major), Some(minor)) => makedev(major, minor),
        _ => 0,
    };

    Some(HotplugEvent {
        action: action?,
        subsystem,
        device_number,
        devpath,
    })
}
