// Identity tokens for captured state
//
// Request states, tracebacks and frames are keyed by monotonic integers
// handed out by the engine that owns them. Each id renders as a plain decimal
// string so it can travel through URLs and SSE `id:` lines and be parsed back
// from whatever the client sends.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }
    };
}

id_type!(
    /// Identity of one instrumented request
    RequestId
);
id_type!(
    /// Identity of one captured traceback
    TracebackId
);
id_type!(
    /// Identity of one captured frame
    FrameId
);

/// Monotonic id source, one per engine
///
/// Ids start at 1 so that the `Last-Event-Id: 0` a fresh client sends never
/// names a real request.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn request(&self) -> RequestId {
        RequestId(self.bump())
    }

    pub fn traceback(&self) -> TracebackId {
        TracebackId(self.bump())
    }

    pub fn frame(&self) -> FrameId {
        FrameId(self.bump())
    }

    fn bump(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
