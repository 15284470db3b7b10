//! IdGenerator port.

use std::sync::Mutex;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use ulid::{Generator, Ulid};

use crate::domain::MessageId;
use crate::ports::Clock;

/// Generates fresh, globally unique record ids.
pub trait IdGenerator: Send + Sync {
    fn generate_message_id(&self) -> MessageId;
}

/// ULID generator driven by a [`Clock`].
///
/// Ids generated within the same millisecond are strictly increasing, so id
/// order matches creation order even when timestamps tie.
pub struct UlidGenerator<C> {
    clock: C,
    monotonic: Mutex<Generator>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            monotonic: Mutex::new(Generator::new()),
        }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_message_id(&self) -> MessageId {
        let now = self.clock.now();
        let generated = match self.monotonic.lock() {
            Ok(mut generator) => generator.generate_from_datetime(SystemTime::from(now)).ok(),
            Err(_) => None,
        };
        // Random bits overflowed within one millisecond (or the lock was
        // poisoned): fall back to a plain ULID for the same instant.
        let ulid = generated.unwrap_or_else(|| fallback_ulid(now));
        MessageId::from(ulid)
    }
}

/// Instants before the epoch clamp to timestamp zero.
fn fallback_ulid(now: DateTime<Utc>) -> Ulid {
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    Ulid::from_parts(millis, rand::random())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::TimeZone;

    #[test]
    fn generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_message_id();
        let id2 = id_gen.generate_message_id();
        let id3 = id_gen.generate_message_id();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn fallback_clamps_pre_epoch_instants_to_zero() {
        let before_epoch = Utc.with_ymd_and_hms(1969, 7, 20, 20, 17, 0).unwrap();
        assert_eq!(fallback_ulid(before_epoch).timestamp_ms(), 0);

        let later = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(
            fallback_ulid(later).timestamp_ms(),
            later.timestamp_millis() as u64
        );
    }

    #[test]
    fn same_millisecond_ids_are_increasing() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let ids: Vec<_> = (0..50).map(|_| id_gen.generate_message_id()).collect();

        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        for id in &ids {
            assert_eq!(
                id.as_ulid().timestamp_ms(),
                fixed_time.timestamp_millis() as u64
            );
        }
    }
}
