//! Hardware-link seam for the modulator electronics.

use log::info;

/// Narrow command interface to the device electronics.
///
/// Commands are fire-and-observe: each returns a raw integer status,
/// zero or positive on success, negative on failure. Callers log
/// failures and move on; retry policy belongs to implementations, not
/// to the sequencing engine. The display loop calls `play` exactly
/// once per sequence start and `stop` exactly once per sequence end.
pub trait DeviceLink {
    fn open(&mut self) -> i32;
    fn close(&mut self) -> i32;
    fn is_connected(&self) -> bool;
    fn play(&mut self) -> i32;
    fn stop(&mut self) -> i32;
    /// Sets the device play mode and video connector selection.
    fn configure(&mut self, play_mode: i32, connector: i32) -> i32;
}

/// Link used when no hardware is attached: logs every command and
/// reports success.
#[derive(Debug, Default)]
pub struct NullDeviceLink {
    connected: bool,
}

impl DeviceLink for NullDeviceLink {
    fn open(&mut self) -> i32 {
        info!("device link: open");
        self.connected = true;
        0
    }

    fn close(&mut self) -> i32 {
        info!("device link: close");
        self.connected = false;
        0
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn play(&mut self) -> i32 {
        info!("device link: play");
        0
    }

    fn stop(&mut self) -> i32 {
        info!("device link: stop");
        0
    }

    fn configure(&mut self, play_mode: i32, connector: i32) -> i32 {
        info!("device link: configure play_mode={play_mode} connector={connector}");
        0
    }
}
