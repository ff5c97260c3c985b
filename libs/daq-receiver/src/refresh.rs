use std::time::Duration;

/// How often `ReceiverHandler::refresh_data` fires, mirroring the three
/// states of the original `refresh_rate` property: unset (go as fast as
/// data arrives), explicitly zero (disabled — "data is not buffered"),
/// or a positive rate (periodic timer).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefreshRate {
    AsFastAsData,
    Disabled,
    Periodic(Duration),
}

impl Default for RefreshRate {
    fn default() -> Self {
        RefreshRate::AsFastAsData
    }
}

impl RefreshRate {
    /// `rate` is in messages/second, matching the original's `1e3/rate`
    /// millisecond timer period. `None` resets to go-as-fast-as-data;
    /// `Some(0.0)` disables refresh entirely.
    pub fn from_messages_per_second(rate: Option<f64>) -> Self {
        match rate {
            None => RefreshRate::AsFastAsData,
            Some(r) if r <= 0.0 => RefreshRate::Disabled,
            Some(r) => RefreshRate::Periodic(Duration::from_secs_f64(1.0 / r)),
        }
    }
}
