//! Epoch timestamp codec with a build-time resolution.
//!
//! # Design
//! Panel releases disagree on the unit of epoch fields such as `expiryTime`:
//! older ones send seconds, newer ones milliseconds. Small values are
//! ambiguous between the two, so the unit is never guessed from magnitude.
//! It is a type parameter (`EpochTime<Seconds>` / `EpochTime<Millis>`), and
//! the entities use the `PanelTime` alias whose unit is picked with the
//! `seconds-epoch` cargo feature.
//!
//! The integer `0` means "unset" (no expiry) and is not 1970-01-01.

use std::fmt;
use std::marker::PhantomData;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

const NANOS_PER_SECOND: i128 = 1_000_000_000;
const NANOS_PER_MILLI: i128 = 1_000_000;

/// Unit of an integer epoch field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Millis,
}

impl TimeUnit {
    fn nanos(self) -> i128 {
        match self {
            TimeUnit::Seconds => NANOS_PER_SECOND,
            TimeUnit::Millis => NANOS_PER_MILLI,
        }
    }
}

/// Decode an epoch integer. `0` is unset; anything else is a UTC instant.
pub fn decode(raw: i64, unit: TimeUnit) -> Result<Option<OffsetDateTime>, time::error::ComponentRange> {
    if raw == 0 {
        return Ok(None);
    }
    match unit {
        TimeUnit::Seconds => OffsetDateTime::from_unix_timestamp(raw).map(Some),
        TimeUnit::Millis => {
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(raw) * NANOS_PER_MILLI).map(Some)
        }
    }
}

/// Encode an instant as an epoch integer, truncating toward zero.
/// Unset encodes as `0`.
pub fn encode(at: Option<OffsetDateTime>, unit: TimeUnit) -> i64 {
    match at {
        None => 0,
        // Every `OffsetDateTime` fits: its range is far narrower than i64 millis.
        Some(t) => (t.unix_timestamp_nanos() / unit.nanos()) as i64,
    }
}

/// Compile-time choice of epoch unit.
pub trait Resolution {
    const UNIT: TimeUnit;
}

/// Epoch seconds, as sent by older panel releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Seconds;

/// Epoch milliseconds, as sent by current panel releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Millis;

impl Resolution for Seconds {
    const UNIT: TimeUnit = TimeUnit::Seconds;
}

impl Resolution for Millis {
    const UNIT: TimeUnit = TimeUnit::Millis;
}

/// Resolution used by the entity types.
#[cfg(feature = "seconds-epoch")]
pub type PanelResolution = Seconds;
#[cfg(not(feature = "seconds-epoch"))]
pub type PanelResolution = Millis;

/// Epoch field as the configured panel release encodes it.
pub type PanelTime = EpochTime<PanelResolution>;

/// An optional UTC instant that travels as an epoch integer in unit `R`.
pub struct EpochTime<R> {
    at: Option<OffsetDateTime>,
    _unit: PhantomData<R>,
}

impl<R: Resolution> EpochTime<R> {
    pub const UNSET: Self = Self {
        at: None,
        _unit: PhantomData,
    };

    pub fn at(at: OffsetDateTime) -> Self {
        Self {
            at: Some(at),
            _unit: PhantomData,
        }
    }

    /// Build from a raw wire integer.
    pub fn from_epoch(raw: i64) -> Result<Self, time::error::ComponentRange> {
        Ok(Self {
            at: decode(raw, R::UNIT)?,
            _unit: PhantomData,
        })
    }

    /// The wire integer for this value.
    pub fn to_epoch(&self) -> i64 {
        encode(self.at, R::UNIT)
    }

    pub fn get(&self) -> Option<OffsetDateTime> {
        self.at
    }

    pub fn is_unset(&self) -> bool {
        self.at.is_none()
    }
}

impl<R: Resolution> Default for EpochTime<R> {
    fn default() -> Self {
        Self::UNSET
    }
}

impl<R: Resolution> From<Option<OffsetDateTime>> for EpochTime<R> {
    fn from(at: Option<OffsetDateTime>) -> Self {
        Self {
            at,
            _unit: PhantomData,
        }
    }
}

// Manual impls keep the marker type out of the trait bounds.
impl<R> Clone for EpochTime<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for EpochTime<R> {}

impl<R> PartialEq for EpochTime<R> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}

impl<R> Eq for EpochTime<R> {}

impl<R> fmt::Debug for EpochTime<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.at {
            None => f.write_str("EpochTime(unset)"),
            Some(t) => write!(f, "EpochTime({t})"),
        }
    }
}

impl<R: Resolution> Serialize for EpochTime<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.to_epoch())
    }
}

impl<'de, R: Resolution> Deserialize<'de> for EpochTime<R> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Self::from_epoch(raw).map_err(|e| D::Error::custom(format!("epoch value {raw} out of range: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant(nanos: i128) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap()
    }

    #[test]
    fn zero_is_unset_in_both_units() {
        assert_eq!(decode(0, TimeUnit::Seconds).unwrap(), None);
        assert_eq!(decode(0, TimeUnit::Millis).unwrap(), None);
        assert!(EpochTime::<Millis>::from_epoch(0).unwrap().is_unset());
    }

    #[test]
    fn unset_encodes_to_zero() {
        assert_eq!(encode(None, TimeUnit::Seconds), 0);
        assert_eq!(EpochTime::<Millis>::UNSET.to_epoch(), 0);
        assert_eq!(serde_json::to_string(&EpochTime::<Seconds>::default()).unwrap(), "0");
    }

    #[test]
    fn seconds_roundtrip() {
        let t = instant(1_700_000_000 * NANOS_PER_SECOND);
        let raw = EpochTime::<Seconds>::at(t).to_epoch();
        assert_eq!(raw, 1_700_000_000);
        assert_eq!(EpochTime::<Seconds>::from_epoch(raw).unwrap().get(), Some(t));
    }

    #[test]
    fn millis_split_into_seconds_and_remainder() {
        let decoded = decode(1_700_000_000_123, TimeUnit::Millis).unwrap().unwrap();
        assert_eq!(decoded.unix_timestamp(), 1_700_000_000);
        assert_eq!(decoded.millisecond(), 123);
        assert_eq!(encode(Some(decoded), TimeUnit::Millis), 1_700_000_000_123);
    }

    #[test]
    fn encode_truncates_toward_zero() {
        let t = instant(1_700_000_000 * NANOS_PER_SECOND + 999_999_999);
        assert_eq!(encode(Some(t), TimeUnit::Seconds), 1_700_000_000);
        assert_eq!(encode(Some(t), TimeUnit::Millis), 1_700_000_000_999);

        let before_epoch = instant(-1_500_000_000);
        assert_eq!(encode(Some(before_epoch), TimeUnit::Seconds), -1);
    }

    #[test]
    fn same_integer_means_different_instants_per_unit() {
        let secs = decode(1_700_000_000, TimeUnit::Seconds).unwrap().unwrap();
        let millis = decode(1_700_000_000, TimeUnit::Millis).unwrap().unwrap();
        assert_ne!(secs, millis);
        assert_eq!(millis.unix_timestamp(), 1_700_000);
    }

    #[test]
    fn serde_uses_the_configured_unit() {
        let t: EpochTime<Millis> = serde_json::from_str("1700000000500").unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "1700000000500");

        let s: EpochTime<Seconds> = serde_json::from_str("1700000000").unwrap();
        assert_eq!(s.get().unwrap().unix_timestamp(), 1_700_000_000);
    }

    #[test]
    fn out_of_range_seconds_fail_to_decode() {
        let err = serde_json::from_str::<EpochTime<Seconds>>(&i64::MAX.to_string()).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn negative_millis_decode() {
        let t = EpochTime::<Millis>::from_epoch(-86_400_000).unwrap();
        assert_eq!(t.get().unwrap().unix_timestamp(), -86_400);
        assert_eq!(t.to_epoch(), -86_400_000);
    }

    #[test]
    fn roundtrip_law_over_a_range_of_values() {
        for raw in [1_i64, 59, 1_000, 946_684_800, 4_102_444_800] {
            let s = EpochTime::<Seconds>::from_epoch(raw).unwrap();
            assert_eq!(s.to_epoch(), raw);
            let m = EpochTime::<Millis>::from_epoch(raw * 1_000 + 7).unwrap();
            assert_eq!(m.to_epoch(), raw * 1_000 + 7);
        }
    }
}
