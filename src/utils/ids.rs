/// Declares an opaque, copyable handle type backed by a per-type atomic counter.
///
/// Handles are never reused within a process, so a stale handle can only miss a lookup,
/// it can never alias a newer object.
macro_rules! handle_id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Allocate a new handle, never returned before in this process
            pub fn next() -> Self {
                static COUNTER: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(1);
                $name(COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
            }

            /// The raw numeric value of this handle
            pub fn as_u32(&self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

pub(crate) use handle_id;
