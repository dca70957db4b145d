use std::{iter::Copied, ops::BitOr, slice};

use crate::codec::{pack_fixed32, pack_fixed64_float, pack_short_string};

/// Type tag of the `addMetricsBatch` envelope.
pub const BATCH_TAG: u32 = 0x5658_0239;

/// Field-presence mask of a metric record.
///
/// Bits can be combined with `|`:
///
/// ```rust
/// # use metrics_exporter_statshouse::FieldsMask;
/// let mask = FieldsMask::VALUES | FieldsMask::COUNTER;
/// assert!(mask.contains(FieldsMask::COUNTER));
/// assert!(!mask.contains(FieldsMask::UNIQUES));
/// assert_eq!(mask.bits(), 0b11);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct FieldsMask(u32);

impl FieldsMask {
    /// No optional fields.
    pub const NONE: FieldsMask = FieldsMask(0);

    /// The record carries an explicit count.
    pub const COUNTER: FieldsMask = FieldsMask(1);

    /// The record carries an array of float values.
    pub const VALUES: FieldsMask = FieldsMask(1 << 1);

    /// The record carries an array of unique 64-bit values.
    pub const UNIQUES: FieldsMask = FieldsMask(1 << 2);

    /// The record carries a timestamp.
    pub const TIMESTAMP: FieldsMask = FieldsMask(1 << 4);

    /// Returns the raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set in `self`.
    pub const fn contains(self, other: FieldsMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FieldsMask {
    type Output = FieldsMask;

    fn bitor(self, rhs: FieldsMask) -> FieldsMask {
        FieldsMask(self.0 | rhs.0)
    }
}

/// Key of a tag.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TagKey<'a> {
    /// Zero-based position; it is sent as `index + 1`.
    Index(usize),

    /// Explicit key.
    ///
    /// A leading underscore followed by a digit is stripped, so `_1` is sent as `1`. Any other key, including `_s` and
    /// `_h`, is sent as-is.
    Name(&'a str),
}

impl<'a> From<&'a str> for TagKey<'a> {
    fn from(name: &'a str) -> Self {
        TagKey::Name(name)
    }
}

impl From<usize> for TagKey<'_> {
    fn from(index: usize) -> Self {
        TagKey::Index(index)
    }
}

impl TagKey<'_> {
    fn write(self, buf: &mut Vec<u8>) {
        match self {
            TagKey::Index(index) => {
                let mut int_writer = itoa::Buffer::new();
                pack_short_string(buf, int_writer.format(index + 1).as_bytes());
            }
            TagKey::Name(name) => {
                let bytes = name.as_bytes();
                let key = match bytes {
                    [b'_', next, ..] if next.is_ascii_digit() => &bytes[1..],
                    _ => bytes,
                };
                pack_short_string(buf, key);
            }
        }
    }
}

/// Ordered set of tags attached to a metric.
///
/// Positional and named tags produce the same wire output for numeric keys:
///
/// ```rust
/// # use metrics_exporter_statshouse::{build_header, FieldsMask, Tags};
/// fn encode(tags: &Tags<'_>) -> Vec<u8> {
///     let mut buf = Vec::new();
///     build_header(&mut buf, "requests", tags, 1.0, None, FieldsMask::COUNTER);
///     buf
/// }
///
/// let positional = Tags::from(&["GET", "200"][..]);
/// let named = Tags::from(&[("1", "GET"), ("_2", "200")][..]);
/// assert_eq!(encode(&positional), encode(&named));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Tags<'a> {
    tags: Vec<(TagKey<'a>, &'a str)>,
}

impl<'a> Tags<'a> {
    /// Creates an empty tag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a tag.
    #[must_use]
    pub fn with<K>(mut self, key: K, value: &'a str) -> Self
    where
        K: Into<TagKey<'a>>,
    {
        self.tags.push((key.into(), value));
        self
    }

    /// Returns the number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns `true` if there are no tags.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Returns an iterator over the tags, in order.
    pub fn iter(&self) -> Copied<slice::Iter<'_, (TagKey<'a>, &'a str)>> {
        self.tags.iter().copied()
    }
}

impl<'t, 'a> IntoIterator for &'t Tags<'a> {
    type Item = (TagKey<'a>, &'a str);
    type IntoIter = Copied<slice::Iter<'t, (TagKey<'a>, &'a str)>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> From<&[&'a str]> for Tags<'a> {
    fn from(values: &[&'a str]) -> Self {
        values.iter().enumerate().map(|(i, v)| (TagKey::Index(i), *v)).collect()
    }
}

impl<'a> From<&[(&'a str, &'a str)]> for Tags<'a> {
    fn from(pairs: &[(&'a str, &'a str)]) -> Self {
        pairs.iter().map(|&(k, v)| (TagKey::Name(k), v)).collect()
    }
}

impl<'a, K> FromIterator<(K, &'a str)> for Tags<'a>
where
    K: Into<TagKey<'a>>,
{
    fn from_iter<I: IntoIterator<Item = (K, &'a str)>>(iter: I) -> Self {
        Tags { tags: iter.into_iter().map(|(k, v)| (k.into(), v)).collect() }
    }
}

/// Builds the batch envelope and metric record header into `buf`, replacing its contents.
///
/// `base_mask` identifies the kind of the record. The count is written when `base_mask` has the counter bit, and the
/// timestamp bit is added when `timestamp` is non-zero. Nothing here limits the header size: callers compare the
/// result against their payload ceiling.
pub fn build_header(
    buf: &mut Vec<u8>,
    metric: &str,
    tags: &Tags<'_>,
    count: f64,
    timestamp: Option<u32>,
    base_mask: FieldsMask,
) {
    buf.clear();

    let timestamp = timestamp.filter(|ts| *ts != 0);
    let mask = match timestamp {
        Some(_) => base_mask | FieldsMask::TIMESTAMP,
        None => base_mask,
    };

    pack_fixed32(buf, BATCH_TAG);
    pack_fixed32(buf, 0);
    pack_fixed32(buf, 1);

    pack_fixed32(buf, mask.bits());
    pack_short_string(buf, metric.as_bytes());
    pack_fixed32(buf, tags.len() as u32);
    for (key, value) in tags {
        key.write(buf);
        pack_short_string(buf, value.as_bytes());
    }

    if mask.contains(FieldsMask::COUNTER) {
        pack_fixed64_float(buf, count);
    }
    if let Some(ts) = timestamp {
        pack_fixed32(buf, ts);
    }
}
