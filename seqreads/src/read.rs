//! The abstract read stream the matcher and pipeline consume.

use std::io;

/// One logical sequencing read: an identifier and its bases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Read {
    pub spot_id: String,
    pub bases: String,
}

impl Read {
    pub fn new(spot_id: impl Into<String>, bases: impl Into<String>) -> Self {
        Self {
            spot_id: spot_id.into(),
            bases: bases.into(),
        }
    }
}

/// A source of read chunks. Implementations own their underlying file
/// handle(s); `next` returns `None` once the source is exhausted.
pub trait Reader: Send {
    fn next(&mut self) -> io::Result<Option<Vec<Read>>>;
}

/// Implemented by the per-read output a pipeline `work` closure produces, so
/// `OrderingMode::Sort` can globally reorder results without the pipeline
/// itself knowing their shape.
pub trait SpotKeyed {
    fn spot_key(&self) -> &str;
}

impl SpotKeyed for String {
    fn spot_key(&self) -> &str {
        self.as_str()
    }
}

impl<T> SpotKeyed for (String, T) {
    fn spot_key(&self) -> &str {
        &self.0
    }
}

/// The legacy spot-id grammar `<acc>.FR<frag>[.<read>]`, used by
/// `OrderingMode::Sort` to order output by `{accession, read_num,
/// fragment_num}` instead of by arrival or source order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SpotIdKey {
    pub accession: String,
    pub fragment_num: u64,
    pub read_num: u64,
}

/// Parse a spot id of the form `<acc>.FR<frag>` or `<acc>.FR<frag>.<read>`.
/// Ids that don't match the grammar sort after all that do, keyed on the
/// raw string so the ordering stays total.
pub fn parse_spot_id(spot_id: &str) -> Option<SpotIdKey> {
    let (acc, rest) = spot_id.split_once(".FR")?;
    let (frag_part, read_part) = match rest.split_once('.') {
        Some((frag, read)) => (frag, Some(read)),
        None => (rest, None),
    };
    let fragment_num: u64 = frag_part.parse().ok()?;
    let read_num: u64 = match read_part {
        Some(r) => r.parse().ok()?,
        None => 0,
    };
    Some(SpotIdKey {
        accession: acc.to_string(),
        fragment_num,
        read_num,
    })
}

/// Strip a trailing `.<anything>` suffix, as used to normalize ids in a
/// spot-filter list against the raw spot ids on the read stream.
pub fn strip_trailing_suffix(id: &str) -> &str {
    match id.find('.') {
        Some(idx) => &id[..idx],
        None => id,
    }
}
