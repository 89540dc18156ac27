use core::fmt;

use crate::error::{Error, Result};

/// A 64-bit fleet Snowflake ID.
///
/// - 1 bit reserved (always zero, so IDs stay positive as signed integers)
/// - 41 bits timestamp (ms since the generator's epoch)
/// - 10 bits worker ID
/// - 12 bits sequence
///
/// ```text
///  Bit Index:  63           63 62            22 21            12 11             0
///              +--------------+----------------+----------------+---------------+
///  Field:      | reserved (1) | timestamp (41) | worker ID (10) | sequence (12) |
///              +--------------+----------------+----------------+---------------+
///              |<----------- MSB ---------- 64 bits ----------- LSB ----------->|
/// ```
///
/// The timestamp field stores an *offset* from the epoch, not an absolute
/// time. Use [`FlakeId::decode`] to recover the absolute millisecond.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlakeId {
    id: u64,
}

/// The fields of a [`FlakeId`] with the timestamp made absolute again.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DecodedId {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub worker_id: u64,
    pub sequence: u64,
}

impl FlakeId {
    /// Bitmask for extracting the 41-bit timestamp field. Occupies bits 22
    /// through 62.
    pub const TIMESTAMP_MASK: u64 = (1 << 41) - 1;

    /// Bitmask for extracting the 10-bit worker ID field. Occupies bits 12
    /// through 21.
    pub const WORKER_ID_MASK: u64 = (1 << 10) - 1;

    /// Bitmask for extracting the 12-bit sequence field. Occupies bits 0
    /// through 11.
    pub const SEQUENCE_MASK: u64 = (1 << 12) - 1;

    /// Number of bits to shift the timestamp to its correct position (bit 22).
    pub const TIMESTAMP_SHIFT: u64 = 22;

    /// Number of bits to shift the worker ID to its correct position (bit 12).
    pub const WORKER_ID_SHIFT: u64 = 12;

    /// Number of bits to shift the sequence field (bit 0).
    pub const SEQUENCE_SHIFT: u64 = 0;

    /// Packs already-validated fields. Out-of-range values are masked.
    const fn pack(timestamp: u64, worker_id: u64, sequence: u64) -> Self {
        let timestamp = (timestamp & Self::TIMESTAMP_MASK) << Self::TIMESTAMP_SHIFT;
        let worker_id = (worker_id & Self::WORKER_ID_MASK) << Self::WORKER_ID_SHIFT;
        let sequence = (sequence & Self::SEQUENCE_MASK) << Self::SEQUENCE_SHIFT;
        Self {
            id: timestamp | worker_id | sequence,
        }
    }

    /// Encodes a timestamp offset, worker ID and sequence into an ID.
    ///
    /// `offset` is the number of milliseconds since the epoch, not an
    /// absolute time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldOverflow`] naming the first field that does not
    /// fit its bit width.
    ///
    /// # Example
    /// ```
    /// use flakeid::FlakeId;
    ///
    /// let id = FlakeId::encode(1000, 2, 1).unwrap();
    /// assert_eq!(id.timestamp(), 1000);
    /// assert_eq!(id.worker_id(), 2);
    /// assert_eq!(id.sequence(), 1);
    ///
    /// assert!(FlakeId::encode(0, 1024, 0).is_err());
    /// ```
    pub const fn encode(offset: u64, worker_id: u64, sequence: u64) -> Result<Self> {
        if offset > Self::TIMESTAMP_MASK {
            return Err(Error::FieldOverflow {
                field: "timestamp",
                value: offset,
                max: Self::TIMESTAMP_MASK,
            });
        }
        if worker_id > Self::WORKER_ID_MASK {
            return Err(Error::FieldOverflow {
                field: "worker_id",
                value: worker_id,
                max: Self::WORKER_ID_MASK,
            });
        }
        if sequence > Self::SEQUENCE_MASK {
            return Err(Error::FieldOverflow {
                field: "sequence",
                value: sequence,
                max: Self::SEQUENCE_MASK,
            });
        }
        Ok(Self::pack(offset, worker_id, sequence))
    }

    /// Constructs an ID from components the caller has already range
    /// checked.
    ///
    /// Overflowing components trip a debug assertion; in release builds they
    /// are masked.
    pub fn from_components(offset: u64, worker_id: u64, sequence: u64) -> Self {
        debug_assert!(offset <= Self::TIMESTAMP_MASK, "timestamp overflow");
        debug_assert!(worker_id <= Self::WORKER_ID_MASK, "worker_id overflow");
        debug_assert!(sequence <= Self::SEQUENCE_MASK, "sequence overflow");
        Self::pack(offset, worker_id, sequence)
    }

    /// Extracts the timestamp offset from the packed ID.
    pub const fn timestamp(&self) -> u64 {
        (self.id >> Self::TIMESTAMP_SHIFT) & Self::TIMESTAMP_MASK
    }

    /// Extracts the worker ID from the packed ID.
    pub const fn worker_id(&self) -> u64 {
        (self.id >> Self::WORKER_ID_SHIFT) & Self::WORKER_ID_MASK
    }

    /// Extracts the sequence number from the packed ID.
    pub const fn sequence(&self) -> u64 {
        (self.id >> Self::SEQUENCE_SHIFT) & Self::SEQUENCE_MASK
    }

    pub const fn max_timestamp() -> u64 {
        Self::TIMESTAMP_MASK
    }

    pub const fn max_worker_id() -> u64 {
        Self::WORKER_ID_MASK
    }

    pub const fn max_sequence() -> u64 {
        Self::SEQUENCE_MASK
    }

    /// Returns the raw `u64` value.
    pub const fn to_raw(&self) -> u64 {
        self.id
    }

    /// Wraps a raw `u64` value without validation.
    pub const fn from_raw(raw: u64) -> Self {
        Self { id: raw }
    }

    /// Splits the ID back into its fields, turning the timestamp offset into
    /// milliseconds since the Unix epoch.
    pub const fn decode(&self, epoch: u64) -> DecodedId {
        DecodedId {
            timestamp: epoch + self.timestamp(),
            worker_id: self.worker_id(),
            sequence: self.sequence(),
        }
    }

    /// Returns the ID as a zero-padded 20-digit string.
    pub fn to_padded_string(&self) -> String {
        format!("{:020}", self.id)
    }
}

impl From<FlakeId> for u64 {
    fn from(id: FlakeId) -> Self {
        id.to_raw()
    }
}

impl fmt::Display for FlakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for FlakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlakeId")
            .field("id", &self.id)
            .field("timestamp", &self.timestamp())
            .field("worker_id", &self.worker_id())
            .field("sequence", &self.sequence())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flake_id_fields_and_bounds() {
        let ts = FlakeId::max_timestamp();
        let wid = FlakeId::max_worker_id();
        let seq = FlakeId::max_sequence();

        let id = FlakeId::encode(ts, wid, seq).unwrap();
        assert_eq!(id.timestamp(), ts);
        assert_eq!(id.worker_id(), wid);
        assert_eq!(id.sequence(), seq);
        assert_eq!(FlakeId::from_components(ts, wid, seq), id);
        // reserved bit stays clear
        assert_eq!(id.to_raw() >> 63, 0);
        assert_eq!(id.to_raw(), u64::MAX >> 1);
    }

    #[test]
    fn layout_matches_shift_arithmetic() {
        let id = FlakeId::encode(5, 3, 7).unwrap();
        assert_eq!(id.to_raw(), (5 << 22) | (3 << 12) | 7);
    }

    #[test]
    fn decode_restores_absolute_timestamp() {
        let epoch = 1_546_272_000_000;
        let samples = [
            (epoch, 0, 0),
            (epoch + 1, 1023, 4095),
            (epoch + 123_456_789, 512, 100),
            (epoch + FlakeId::max_timestamp(), 7, 1),
        ];
        for (timestamp, worker_id, sequence) in samples {
            let id = FlakeId::encode(timestamp - epoch, worker_id, sequence).unwrap();
            assert_eq!(
                id.decode(epoch),
                DecodedId {
                    timestamp,
                    worker_id,
                    sequence
                }
            );
            assert_eq!(FlakeId::from_raw(u64::from(id)), id);
        }
    }

    #[test]
    fn ordering_follows_timestamp_then_worker_then_sequence() {
        let a = FlakeId::encode(10, 1023, 4095).unwrap();
        let b = FlakeId::encode(11, 0, 0).unwrap();
        let c = FlakeId::encode(11, 0, 1).unwrap();
        let d = FlakeId::encode(11, 1, 0).unwrap();
        assert!(a < b && b < c && c < d);
        assert!(a.to_raw() < b.to_raw());
    }

    #[test]
    fn encode_rejects_overflowing_fields() {
        assert_eq!(
            FlakeId::encode(FlakeId::max_timestamp() + 1, 0, 0),
            Err(Error::FieldOverflow {
                field: "timestamp",
                value: FlakeId::max_timestamp() + 1,
                max: FlakeId::max_timestamp(),
            })
        );
        assert!(matches!(
            FlakeId::encode(0, 1024, 0),
            Err(Error::FieldOverflow {
                field: "worker_id",
                ..
            })
        ));
        assert!(matches!(
            FlakeId::encode(0, 0, 4096),
            Err(Error::FieldOverflow {
                field: "sequence",
                ..
            })
        ));
    }

    #[test]
    fn padded_string_is_fixed_width() {
        let id = FlakeId::encode(1, 0, 0).unwrap();
        assert_eq!(id.to_padded_string(), "00000000000004194304");
        assert_eq!(id.to_string(), "4194304");
    }

    #[test]
    #[should_panic(expected = "timestamp overflow")]
    fn timestamp_overflow_panics() {
        let ts = FlakeId::max_timestamp() + 1;
        FlakeId::from_components(ts, 0, 0);
    }

    #[test]
    #[should_panic(expected = "worker_id overflow")]
    fn worker_id_overflow_panics() {
        let wid = FlakeId::max_worker_id() + 1;
        FlakeId::from_components(0, wid, 0);
    }

    #[test]
    #[should_panic(expected = "sequence overflow")]
    fn sequence_overflow_panics() {
        let seq = FlakeId::max_sequence() + 1;
        FlakeId::from_components(0, 0, seq);
    }
}
