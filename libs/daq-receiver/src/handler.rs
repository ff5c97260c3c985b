use daq_api::PluginError;
use serde_json::Value;

/// The hook surface of a Receiver, grounded on
/// `online_monitor/receiver/receiver.py`'s `Receiver` base class:
/// `handle_data` runs once per arriving message (when active),
/// `refresh_data` runs either immediately after `handle_data` (when no
/// refresh rate is set) or on its own timer (when one is).
pub trait ReceiverHandler: Send {
    /// One-time setup, analogous to `setup_receiver`.
    fn setup(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called once per decoded message while the receiver is active.
    fn handle_data(&mut self, data: Value) -> Result<(), PluginError>;

    /// Called to (re)draw/export the receiver's current state. Default:
    /// no-op, matching the original's `pass`.
    fn refresh_data(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}
