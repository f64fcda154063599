//! Runtime diagnostics.
//!
//! A panic hook that gets the reason into the log stream before the
//! watchdog resets the device. Heap figures live in `adapters::mem`; the
//! telemetry heartbeat is the periodic diagnostics channel.

/// Install a panic hook that logs the panic reason.
///
/// Must be called once during init, before any task spawns.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };

        match info.location() {
            Some(loc) => log::error!("PANIC at {}:{}: {}", loc.file(), loc.line(), reason),
            None => log::error!("PANIC: {}", reason),
        }
    }));
}
