use core::fmt;

use crate::{ConfigError, DEFAULT_EPOCH};

/// Total bits available to an ID. Bit 63 stays clear so every ID is a
/// non-negative `i64`.
pub const USABLE_BITS: u32 = 63;

/// Largest allowed `node_bits + process_bits + sequence_bits`. Leaves at
/// least 41 timestamp bits, roughly 69 years of milliseconds.
pub const MAX_DISCRIMINATOR_BITS: u32 = 22;

/// Default width of the node field (8 nodes).
pub const DEFAULT_NODE_BITS: u32 = 3;

/// Default width of the process field (128 processes per node).
pub const DEFAULT_PROCESS_BITS: u32 = 7;

/// Default width of the sequence field (4096 IDs per millisecond).
pub const DEFAULT_SEQUENCE_BITS: u32 = 12;

/// The bit partition of a generated ID together with its epoch.
///
/// Fields are packed from the least significant bit upward:
///
/// ```text
///  Bit Index:  63           63 62            22 21          19 18             12 11             0
///              +--------------+----------------+--------------+-----------------+---------------+
///  Field:      | reserved (1) | timestamp (41) | node id (3)  | process id (7)  | sequence (12) |
///              +--------------+----------------+--------------+-----------------+---------------+
///              |<----------- MSB ------------------ 64 bits ------------------- LSB ----------->|
/// ```
///
/// The widths above are the defaults. The timestamp takes whatever remains of
/// the 63 usable bits once the other three fields are allocated.
///
/// A `Layout` is validated on construction and never changes afterwards, so
/// [`compose`](Self::compose) and [`decompose`](Self::decompose) perform no
/// bounds checks of their own.
///
/// # Example
///
/// ```
/// use snowgen::Layout;
///
/// let layout = Layout::new(3, 7, 12, snowgen::DEFAULT_EPOCH).unwrap();
/// assert_eq!(layout.timestamp_bits(), 41);
/// assert_eq!(layout.max_sequence(), 4095);
///
/// let id = layout.compose(snowgen::DEFAULT_EPOCH + 1_000, 5, 100, 7);
/// let parts = layout.decompose(id);
/// assert_eq!(parts.node_id, 5);
/// assert_eq!(parts.process_id, 100);
/// assert_eq!(parts.sequence, 7);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Layout {
    node_bits: u32,
    process_bits: u32,
    sequence_bits: u32,
    epoch_millis: u64,

    max_timestamp: u64,
    max_node_id: u64,
    max_process_id: u64,
    max_sequence: u64,

    process_shift: u32,
    node_shift: u32,
    timestamp_shift: u32,
}

impl Layout {
    /// Validates the widths and precomputes masks and shifts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TooManyBits`] if the three widths add up to more
    /// than [`MAX_DISCRIMINATOR_BITS`].
    pub fn new(
        node_bits: u32,
        process_bits: u32,
        sequence_bits: u32,
        epoch_millis: u64,
    ) -> Result<Self, ConfigError> {
        let total = node_bits
            .checked_add(process_bits)
            .and_then(|sum| sum.checked_add(sequence_bits))
            .unwrap_or(u32::MAX);
        if total > MAX_DISCRIMINATOR_BITS {
            return Err(ConfigError::TooManyBits {
                total,
                max: MAX_DISCRIMINATOR_BITS,
            });
        }

        Ok(Self::from_widths(
            node_bits,
            process_bits,
            sequence_bits,
            epoch_millis,
        ))
    }

    /// Precomputes masks and shifts. Callers must have checked that the widths
    /// fit in [`MAX_DISCRIMINATOR_BITS`].
    const fn from_widths(
        node_bits: u32,
        process_bits: u32,
        sequence_bits: u32,
        epoch_millis: u64,
    ) -> Self {
        let process_shift = sequence_bits;
        let node_shift = process_shift + process_bits;
        let timestamp_shift = node_shift + node_bits;

        Self {
            node_bits,
            process_bits,
            sequence_bits,
            epoch_millis,
            max_timestamp: mask(USABLE_BITS - timestamp_shift),
            max_node_id: mask(node_bits),
            max_process_id: mask(process_bits),
            max_sequence: mask(sequence_bits),
            process_shift,
            node_shift,
            timestamp_shift,
        }
    }

    /// Returns the same widths anchored to a different epoch.
    #[must_use]
    pub fn with_epoch(self, epoch_millis: u64) -> Self {
        Self {
            epoch_millis,
            ..self
        }
    }

    /// Width of the node field.
    pub const fn node_bits(&self) -> u32 {
        self.node_bits
    }

    /// Width of the process field.
    pub const fn process_bits(&self) -> u32 {
        self.process_bits
    }

    /// Width of the sequence field.
    pub const fn sequence_bits(&self) -> u32 {
        self.sequence_bits
    }

    /// Width of the timestamp field (`63 - node - process - sequence`).
    pub const fn timestamp_bits(&self) -> u32 {
        USABLE_BITS - self.timestamp_shift
    }

    /// Reference point, in milliseconds since the Unix epoch, that encoded
    /// timestamps are measured from.
    pub const fn epoch_millis(&self) -> u64 {
        self.epoch_millis
    }

    /// Largest encodable offset from the epoch, in milliseconds.
    pub const fn max_timestamp(&self) -> u64 {
        self.max_timestamp
    }

    /// Largest node id the layout can encode.
    pub const fn max_node_id(&self) -> u64 {
        self.max_node_id
    }

    /// Largest process id the layout can encode.
    pub const fn max_process_id(&self) -> u64 {
        self.max_process_id
    }

    /// Largest sequence value; one millisecond holds `max_sequence() + 1` IDs.
    pub const fn max_sequence(&self) -> u64 {
        self.max_sequence
    }

    /// Bit offset of the process field.
    pub const fn process_shift(&self) -> u32 {
        self.process_shift
    }

    /// Bit offset of the node field.
    pub const fn node_shift(&self) -> u32 {
        self.node_shift
    }

    /// Bit offset of the timestamp field.
    pub const fn timestamp_shift(&self) -> u32 {
        self.timestamp_shift
    }

    /// Checks that `node_id` and `process_id` fit their fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NodeIdOutOfRange`] or
    /// [`ConfigError::ProcessIdOutOfRange`].
    pub fn check_discriminators(
        &self,
        node_id: u64,
        process_id: u64,
    ) -> Result<(), ConfigError> {
        if node_id > self.max_node_id {
            return Err(ConfigError::NodeIdOutOfRange {
                node_id,
                max: self.max_node_id,
            });
        }
        if process_id > self.max_process_id {
            return Err(ConfigError::ProcessIdOutOfRange {
                process_id,
                max: self.max_process_id,
            });
        }
        Ok(())
    }

    /// Returns the offset of `timestamp_millis` from the epoch if it fits the
    /// timestamp field.
    pub const fn offset_of(&self, timestamp_millis: u64) -> Option<u64> {
        match timestamp_millis.checked_sub(self.epoch_millis) {
            Some(offset) if offset <= self.max_timestamp => Some(offset),
            _ => None,
        }
    }

    /// Packs the four fields into an ID.
    ///
    /// `timestamp_millis` is absolute (milliseconds since the Unix epoch).
    /// Every field is masked to its width; callers are expected to pass
    /// in-range values, which debug builds assert.
    pub fn compose(
        &self,
        timestamp_millis: u64,
        node_id: u64,
        process_id: u64,
        sequence: u64,
    ) -> i64 {
        debug_assert!(
            self.offset_of(timestamp_millis).is_some(),
            "timestamp overflow"
        );
        debug_assert!(node_id <= self.max_node_id, "node_id overflow");
        debug_assert!(process_id <= self.max_process_id, "process_id overflow");
        debug_assert!(sequence <= self.max_sequence, "sequence overflow");

        let offset = timestamp_millis.wrapping_sub(self.epoch_millis) & self.max_timestamp;
        let raw = (offset << self.timestamp_shift)
            | ((node_id & self.max_node_id) << self.node_shift)
            | ((process_id & self.max_process_id) << self.process_shift)
            | (sequence & self.max_sequence);

        // Bit 63 is never set: offset is masked to the remaining 63 bits.
        raw as i64
    }

    /// Splits an ID back into its fields.
    ///
    /// IDs produced under a different layout decode to meaningless values;
    /// this is not detected.
    pub fn decompose(&self, id: i64) -> Decomposed {
        let raw = id as u64;
        let offset = (raw >> self.timestamp_shift) & self.max_timestamp;
        Decomposed {
            timestamp_millis: offset.wrapping_add(self.epoch_millis) as i64,
            node_id: (raw >> self.node_shift) & self.max_node_id,
            process_id: (raw >> self.process_shift) & self.max_process_id,
            sequence: raw & self.max_sequence,
        }
    }

    fn fields(&self) -> [FieldLayout; 5] {
        [
            FieldLayout {
                name: "reserved",
                bits: 1,
                shift: USABLE_BITS,
            },
            FieldLayout {
                name: "timestamp",
                bits: self.timestamp_bits(),
                shift: self.timestamp_shift,
            },
            FieldLayout {
                name: "node_id",
                bits: self.node_bits,
                shift: self.node_shift,
            },
            FieldLayout {
                name: "process_id",
                bits: self.process_bits,
                shift: self.process_shift,
            },
            FieldLayout {
                name: "sequence",
                bits: self.sequence_bits,
                shift: 0,
            },
        ]
    }
}

impl Default for Layout {
    /// 3 node bits, 7 process bits, 12 sequence bits, [`DEFAULT_EPOCH`].
    fn default() -> Self {
        Self::from_widths(
            DEFAULT_NODE_BITS,
            DEFAULT_PROCESS_BITS,
            DEFAULT_SEQUENCE_BITS,
            DEFAULT_EPOCH,
        )
    }
}

const fn mask(bits: u32) -> u64 {
    if bits >= u64::BITS {
        u64::MAX
    } else {
        (1 << bits) - 1
    }
}

struct FieldLayout {
    name: &'static str,
    bits: u32,
    shift: u32,
}

impl fmt::Display for Layout {
    /// Renders the layout as a bit diagram, one column per non-empty field.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn center(s: &str, width: usize) -> String {
            let pad = width.saturating_sub(s.len());
            let left = pad / 2;
            format!("{}{}{}", " ".repeat(left), s, " ".repeat(pad - left))
        }

        let visible: Vec<(String, String)> = self
            .fields()
            .into_iter()
            .filter(|field| field.bits > 0)
            .map(|field| {
                let hi = field.shift + field.bits - 1;
                let range = if hi == field.shift {
                    format!("{hi}")
                } else {
                    format!("{hi}..{}", field.shift)
                };
                (format!("{} ({})", field.name, field.bits), range)
            })
            .collect();

        let widths: Vec<usize> = visible
            .iter()
            .map(|(label, range)| label.len().max(range.len()) + 2)
            .collect();

        fn border(f: &mut fmt::Formatter<'_>, widths: &[usize]) -> fmt::Result {
            write!(f, "+")?;
            for &w in widths {
                write!(f, "{}+", "-".repeat(w))?;
            }
            Ok(())
        }

        writeln!(f, "epoch: {} ms", self.epoch_millis)?;
        border(f, &widths)?;
        write!(f, "\n|")?;
        for ((_, range), &w) in visible.iter().zip(&widths) {
            write!(f, "{}|", center(range, w))?;
        }
        writeln!(f)?;
        border(f, &widths)?;
        write!(f, "\n|")?;
        for ((label, _), &w) in visible.iter().zip(&widths) {
            write!(f, "{}|", center(label, w))?;
        }
        writeln!(f)?;
        border(f, &widths)
    }
}

/// The four logical fields of an ID.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Decomposed {
    /// Absolute creation time in milliseconds since the Unix epoch.
    pub timestamp_millis: i64,
    /// Node discriminator.
    pub node_id: u64,
    /// Process discriminator.
    pub process_id: u64,
    /// Position within the millisecond.
    pub sequence: u64,
}

impl fmt::Display for Decomposed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timestamp={} node={} process={} sequence={}",
            self.timestamp_millis, self.node_id, self.process_id, self.sequence
        )
    }
}

/// Unvalidated, serializable form of a [`Layout`].
///
/// Missing keys take the defaults, so an empty object deserializes to
/// [`Layout::default`]. Convert with [`Layout::try_from`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LayoutConfig {
    /// Width of the node field.
    pub node_bits: u32,
    /// Width of the process field.
    pub process_bits: u32,
    /// Width of the sequence field.
    pub sequence_bits: u32,
    /// Epoch in milliseconds since the Unix epoch.
    pub epoch_millis: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_bits: DEFAULT_NODE_BITS,
            process_bits: DEFAULT_PROCESS_BITS,
            sequence_bits: DEFAULT_SEQUENCE_BITS,
            epoch_millis: DEFAULT_EPOCH,
        }
    }
}

impl TryFrom<LayoutConfig> for Layout {
    type Error = ConfigError;

    fn try_from(config: LayoutConfig) -> Result<Self, Self::Error> {
        Self::new(
            config.node_bits,
            config.process_bits,
            config.sequence_bits,
            config.epoch_millis,
        )
    }
}

impl From<Layout> for LayoutConfig {
    fn from(layout: Layout) -> Self {
        Self {
            node_bits: layout.node_bits,
            process_bits: layout.process_bits,
            sequence_bits: layout.sequence_bits,
            epoch_millis: layout.epoch_millis,
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Layout {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&LayoutConfig::from(*self), serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Layout {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let config = <LayoutConfig as serde::Deserialize>::deserialize(deserializer)?;
        Self::try_from(config).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_matches_validated_defaults() {
        let validated = Layout::new(
            DEFAULT_NODE_BITS,
            DEFAULT_PROCESS_BITS,
            DEFAULT_SEQUENCE_BITS,
            DEFAULT_EPOCH,
        )
        .unwrap();
        assert_eq!(Layout::default(), validated);
        assert_eq!(validated.timestamp_bits(), 41);
        assert_eq!(validated.max_node_id(), 7);
        assert_eq!(validated.max_process_id(), 127);
        assert_eq!(validated.max_sequence(), 4095);
        assert_eq!(validated.process_shift(), 12);
        assert_eq!(validated.node_shift(), 19);
        assert_eq!(validated.timestamp_shift(), 22);
    }

    #[test]
    fn derived_fields_follow_the_widths() {
        const WIDE_SEQUENCE: Layout = Layout::from_widths(1, 1, 20, 0);
        assert_eq!(WIDE_SEQUENCE.max_sequence(), (1 << 20) - 1);
        assert_eq!(WIDE_SEQUENCE.process_shift(), 20);
        assert_eq!(WIDE_SEQUENCE.node_shift(), 21);
        assert_eq!(WIDE_SEQUENCE.timestamp_shift(), 22);
        assert_eq!(WIDE_SEQUENCE.timestamp_bits(), 41);
        assert_eq!(Layout::new(1, 1, 20, 0).unwrap(), WIDE_SEQUENCE);
    }

    #[test]
    fn rejects_more_than_22_discriminator_bits() {
        let err = Layout::new(4, 9, 12, DEFAULT_EPOCH).unwrap_err();
        assert_eq!(err, ConfigError::TooManyBits { total: 25, max: 22 });
    }

    #[test]
    fn accepts_exactly_22_discriminator_bits() {
        let layout = Layout::new(5, 5, 12, DEFAULT_EPOCH).unwrap();
        assert_eq!(layout.timestamp_bits(), 41);
    }

    #[test]
    fn width_overflow_is_rejected_not_wrapped() {
        assert!(matches!(
            Layout::new(u32::MAX, 1, 0, DEFAULT_EPOCH),
            Err(ConfigError::TooManyBits { .. })
        ));
    }

    #[test]
    fn zero_width_fields_leave_a_63_bit_timestamp() {
        let layout = Layout::new(0, 0, 0, 0).unwrap();
        assert_eq!(layout.timestamp_bits(), 63);
        assert_eq!(layout.max_sequence(), 0);
        assert_eq!(layout.max_node_id(), 0);

        let id = layout.compose(12_345, 0, 0, 0);
        assert_eq!(id, 12_345);
        assert_eq!(layout.decompose(id).timestamp_millis, 12_345);
    }

    #[test]
    fn discriminator_ranges_are_checked() {
        let layout = Layout::default();
        assert!(layout.check_discriminators(7, 127).is_ok());
        assert_eq!(
            layout.check_discriminators(8, 0),
            Err(ConfigError::NodeIdOutOfRange { node_id: 8, max: 7 })
        );
        assert_eq!(
            layout.check_discriminators(0, 128),
            Err(ConfigError::ProcessIdOutOfRange {
                process_id: 128,
                max: 127
            })
        );
    }

    #[test]
    fn compose_places_fields_at_their_shifts() {
        let layout = Layout::default();
        let id = layout.compose(DEFAULT_EPOCH + 1, 1, 1, 1);
        assert_eq!(id, (1 << 22) | (1 << 19) | (1 << 12) | 1);
    }

    #[test]
    fn max_values_never_set_the_sign_bit() {
        let layout = Layout::default();
        let ts = DEFAULT_EPOCH + layout.max_timestamp();
        let id = layout.compose(
            ts,
            layout.max_node_id(),
            layout.max_process_id(),
            layout.max_sequence(),
        );
        assert_eq!(id, i64::MAX);

        let parts = layout.decompose(id);
        assert_eq!(parts.timestamp_millis, ts as i64);
        assert_eq!(parts.node_id, 7);
        assert_eq!(parts.process_id, 127);
        assert_eq!(parts.sequence, 4095);
    }

    #[test]
    fn offset_of_rejects_pre_epoch_and_overflowing_times() {
        let layout = Layout::default();
        assert_eq!(layout.offset_of(DEFAULT_EPOCH - 1), None);
        assert_eq!(layout.offset_of(DEFAULT_EPOCH), Some(0));
        assert_eq!(
            layout.offset_of(DEFAULT_EPOCH + layout.max_timestamp() + 1),
            None
        );
    }

    #[test]
    #[should_panic(expected = "sequence overflow")]
    fn compose_asserts_sequence_in_debug() {
        let layout = Layout::default();
        layout.compose(DEFAULT_EPOCH, 0, 0, layout.max_sequence() + 1);
    }

    #[test]
    fn display_lists_every_non_empty_field() {
        let rendered = Layout::new(0, 7, 12, 0).unwrap().to_string();
        assert!(rendered.contains("timestamp (44)"));
        assert!(rendered.contains("process_id (7)"));
        assert!(rendered.contains("18..12"));
        assert!(!rendered.contains("node_id"));
    }

    #[test]
    fn layout_config_round_trips_through_layout() {
        let config = LayoutConfig {
            node_bits: 2,
            process_bits: 4,
            sequence_bits: 10,
            epoch_millis: 42,
        };
        let layout = Layout::try_from(config).unwrap();
        assert_eq!(LayoutConfig::from(layout), config);
        assert_eq!(layout.with_epoch(7).epoch_millis(), 7);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializing_validates_and_fills_defaults() {
        let layout: Layout =
            serde_json::from_str(r#"{"node_bits": 3, "process_bits": 6}"#).unwrap();
        assert_eq!(layout.node_bits(), 3);
        assert_eq!(layout.process_bits(), 6);
        assert_eq!(layout.sequence_bits(), DEFAULT_SEQUENCE_BITS);
        assert_eq!(layout.epoch_millis(), DEFAULT_EPOCH);
        assert_eq!(layout.timestamp_bits(), 42);

        let err = serde_json::from_str::<Layout>(r#"{"node_bits": 5}"#).unwrap_err();
        assert!(err.to_string().contains("total 24, which exceeds the maximum of 22"));

        let err = serde_json::from_str::<Layout>(r#"{"node_bits": 10, "process_bits": 10}"#)
            .unwrap_err();
        assert!(err.to_string().contains("exceeds the maximum of 22"));
    }
}
