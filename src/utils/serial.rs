use std::sync::atomic::{AtomicU32, Ordering};

/// A serial type, whose comparison takes into account the wrapping-around behavior of the
/// underlying counter.
///
/// Serials identify input events and configure sequences. Clients echo them back in
/// requests such as `xdg_popup.grab` or `xdg_surface.ack_configure`.
#[derive(Debug, Copy, Clone, Hash)]
pub struct Serial(pub(crate) u32);

impl PartialEq for Serial {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Serial {}

impl PartialOrd for Serial {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        let distance = self.0.abs_diff(other.0);
        if distance < u32::MAX / 2 {
            self.0.partial_cmp(&other.0)
        } else {
            // wrap-around occurred, invert comparison
            other.0.partial_cmp(&self.0)
        }
    }
}

impl From<u32> for Serial {
    fn from(n: u32) -> Self {
        Serial(n)
    }
}

impl From<Serial> for u32 {
    fn from(serial: Serial) -> u32 {
        serial.0
    }
}

impl Serial {
    /// Checks if a serial was generated after or is equal to another given serial
    pub fn is_no_older_than(&self, other: &Serial) -> bool {
        other <= self
    }
}

/// A counter for generating serials, for use in the client protocol
///
/// Every [`Compositor`](crate::compositor::Compositor) owns one counter and hands out
/// serials from it. The counter wraps around on overflow and never yields `0`.
#[derive(Debug)]
pub struct SerialCounter {
    serial: AtomicU32,
}

impl Default for SerialCounter {
    fn default() -> Self {
        SerialCounter::new()
    }
}

impl SerialCounter {
    /// Create a counter starting at `1`
    pub const fn new() -> SerialCounter {
        SerialCounter {
            serial: AtomicU32::new(1),
        }
    }

    /// Retrieve the next serial from the counter
    pub fn next_serial(&self) -> Serial {
        let _ = self
            .serial
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::SeqCst);
        Serial(self.serial.fetch_add(1, Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_serial_counter(initial_value: u32) -> SerialCounter {
        SerialCounter {
            serial: AtomicU32::new(initial_value),
        }
    }

    #[test]
    fn consecutive_serials() {
        let counter = SerialCounter::new();
        let serial1 = counter.next_serial();
        let serial2 = counter.next_serial();
        assert!(serial1 < serial2);
        assert!(serial2.is_no_older_than(&serial1));
    }

    #[test]
    fn zero_is_skipped() {
        let counter = create_serial_counter(0);
        assert_eq!(u32::from(counter.next_serial()), 1);
    }

    #[test]
    fn serial_wrap_around() {
        let counter = create_serial_counter(u32::MAX);
        let serial1 = counter.next_serial();
        let serial2 = counter.next_serial();

        assert!(serial1 == u32::MAX.into());
        assert!(serial2 == 1.into());

        assert!(serial1 < serial2);
    }
}
