//! Transaction, log-sequence, and timestamp identifiers.
//!
//! All three are strictly-monotonic 64-bit counters, kept as distinct types
//! so the compiler catches mixing a `TxnId` into a `Lsn` slot or vice versa.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! monotonic_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(serde::Serialize, serde::Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            #[inline]
            pub fn new(v: u64) -> Self {
                $name(v)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

monotonic_id!(TxnId, "Transaction id, assigned strictly increasing at `Begin`.");
monotonic_id!(Lsn, "Log Sequence Number, assigned strictly increasing by the WAL.");
monotonic_id!(
    Timestamp,
    "Logical commit/snapshot timestamp used by the MVCC manager."
);

/// A strictly-monotonic counter shared by `TxnId`, `Lsn`, and `Timestamp`
/// allocation.
///
/// Using `fetch_add` with `Ordering::SeqCst` keeps allocation total-ordered
/// across threads, matching the "strictly increasing" invariant the WAL and
/// MVCC manager both require.
#[derive(Debug, Default)]
pub struct Counter {
    next: AtomicU64,
}

impl Counter {
    pub fn starting_at(value: u64) -> Self {
        Self {
            next: AtomicU64::new(value),
        }
    }

    /// Allocate the next value and advance the counter.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Current value without advancing (the next id that will be handed out).
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Advance the counter to at least `value`, used during WAL/recovery
    /// replay so post-recovery allocation never collides with replayed ids.
    pub fn advance_to_at_least(&self, value: u64) {
        self.next.fetch_max(value, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_strictly_increasing() {
        let c = Counter::default();
        let a = c.next();
        let b = c.next();
        assert!(b > a);
    }

    #[test]
    fn test_counter_advance() {
        let c = Counter::default();
        c.advance_to_at_least(100);
        assert_eq!(c.next(), 100);
        c.advance_to_at_least(50); // no-op, already past 50
        assert_eq!(c.peek(), 101);
    }

    #[test]
    fn test_id_ordering() {
        assert!(TxnId::new(1) < TxnId::new(2));
        assert!(Lsn::new(5) > Lsn::new(3));
    }
}
