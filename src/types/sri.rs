//! Stream descriptors (SRI) and the comparison logic that decides when a
//! descriptor has to be announced again downstream.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use super::{Keyword, Value};

/// Descriptor of a logical data stream.
///
/// A published descriptor is never edited in place. The `with_*` and keyword
/// helpers all return a new descriptor, which the owner then swaps in wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct StreamDescriptor {
    pub hversion: i32,
    pub xstart: f64,
    /// Seconds between samples
    pub xdelta: f64,
    pub xunits: i16,
    /// Frame length for two-dimensional data, 0 for one-dimensional
    pub subsize: i32,
    pub ystart: f64,
    pub ydelta: f64,
    pub yunits: i16,
    /// 0 for scalar samples, 1 for complex
    pub mode: i16,
    pub stream_id: String,
    pub blocking: bool,
    /// `None` models a missing keyword list, which never compares equal
    pub keywords: Option<Vec<Keyword>>,
}

/// Unit code for time on the x axis.
pub const UNITS_TIME: i16 = 1;

impl StreamDescriptor {
    /// Default descriptor for a new stream.
    ///
    /// `xdelta` is `1 / sample_rate`; a rate that is zero or negative falls back to
    /// an `xdelta` of 1.0 instead of dividing by zero.
    pub fn create(stream_id: impl Into<String>, sample_rate: f64, unit: i16, blocking: bool) -> Self {
        let xdelta = if sample_rate > 0.0 { 1.0 / sample_rate } else { 1.0 };
        Self {
            hversion: 1,
            xstart: 0.0,
            xdelta,
            xunits: unit,
            subsize: 0,
            ystart: 0.0,
            ydelta: 0.0,
            yunits: 0,
            mode: 0,
            stream_id: stream_id.into(),
            blocking,
            keywords: Some(Vec::new()),
        }
    }

    pub fn is_complex(&self) -> bool {
        self.mode == 1
    }

    pub fn sample_rate(&self) -> f64 {
        if self.xdelta > 0.0 { 1.0 / self.xdelta } else { 0.0 }
    }

    pub fn with_mode(self, complex: bool) -> Self {
        Self { mode: i16::from(complex), ..self }
    }

    pub fn with_subsize(self, subsize: i32) -> Self {
        Self { subsize, ..self }
    }

    pub fn with_xstart(self, xstart: f64) -> Self {
        Self { xstart, ..self }
    }

    pub fn with_xdelta(self, xdelta: f64) -> Self {
        Self { xdelta, ..self }
    }

    pub fn with_blocking(self, blocking: bool) -> Self {
        Self { blocking, ..self }
    }

    pub fn with_y_axis(self, ystart: f64, ydelta: f64, yunits: i16) -> Self {
        Self { ystart, ydelta, yunits, ..self }
    }

    /// Append a keyword, keeping any existing keyword with the same id.
    pub fn with_keyword(mut self, id: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keywords.get_or_insert_with(Vec::new).push(Keyword::new(id, value));
        self
    }

    /// Replace the first keyword named `id`, or append it when absent.
    pub fn set_keyword(mut self, id: impl Into<String>, value: impl Into<Value>) -> Self {
        let id = id.into();
        let value = value.into();
        let keywords = self.keywords.get_or_insert_with(Vec::new);
        match keywords.iter_mut().find(|kw| kw.id == id) {
            Some(existing) => existing.value = value,
            None => keywords.push(Keyword { id, value }),
        }
        self
    }

    /// Remove every keyword named `id`.
    pub fn erase_keyword(mut self, id: &str) -> Self {
        if let Some(keywords) = self.keywords.as_mut() {
            keywords.retain(|kw| kw.id != id);
        }
        self
    }

    pub fn keyword(&self, id: &str) -> Option<&Value> {
        self.keywords.as_ref()?.iter().find(|kw| kw.id == id).map(|kw| &kw.value)
    }

    pub fn has_keyword(&self, id: &str) -> bool {
        self.keyword(id).is_some()
    }
}

/// Bitmask of descriptor fields that differ between two descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct SriChanges(pub u32);

impl SriChanges {
    pub const NONE: SriChanges = SriChanges(0);
    pub const HVERSION: SriChanges = SriChanges(1 << 0);
    pub const XSTART: SriChanges = SriChanges(1 << 1);
    pub const XDELTA: SriChanges = SriChanges(1 << 2);
    pub const XUNITS: SriChanges = SriChanges(1 << 3);
    pub const SUBSIZE: SriChanges = SriChanges(1 << 4);
    pub const YSTART: SriChanges = SriChanges(1 << 5);
    pub const YDELTA: SriChanges = SriChanges(1 << 6);
    pub const YUNITS: SriChanges = SriChanges(1 << 7);
    pub const MODE: SriChanges = SriChanges(1 << 8);
    pub const STREAMID: SriChanges = SriChanges(1 << 9);
    pub const BLOCKING: SriChanges = SriChanges(1 << 10);
    pub const KEYWORDS: SriChanges = SriChanges(1 << 11);
    pub const ALL: SriChanges = SriChanges((1 << 12) - 1);

    const NAMES: [(SriChanges, &'static str); 12] = [
        (Self::HVERSION, "hversion"),
        (Self::XSTART, "xstart"),
        (Self::XDELTA, "xdelta"),
        (Self::XUNITS, "xunits"),
        (Self::SUBSIZE, "subsize"),
        (Self::YSTART, "ystart"),
        (Self::YDELTA, "ydelta"),
        (Self::YUNITS, "yunits"),
        (Self::MODE, "mode"),
        (Self::STREAMID, "streamID"),
        (Self::BLOCKING, "blocking"),
        (Self::KEYWORDS, "keywords"),
    ];

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `flags` is set.
    pub fn contains(self, flags: SriChanges) -> bool {
        self.0 & flags.0 == flags.0
    }

    /// Names of the changed fields, in descriptor order.
    pub fn fields(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for SriChanges {
    type Output = SriChanges;

    fn bitor(self, rhs: SriChanges) -> SriChanges {
        SriChanges(self.0 | rhs.0)
    }
}

impl BitOrAssign for SriChanges {
    fn bitor_assign(&mut self, rhs: SriChanges) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for SriChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.fields().join(","))
    }
}

/// Signature of a descriptor equality check, so ports can swap in their own.
pub type SriComparator = fn(Option<&StreamDescriptor>, Option<&StreamDescriptor>) -> bool;

/// Strict field-by-field equality of two descriptors.
///
/// Returns false when either side is absent or has no keyword list. Keywords are
/// compared pairwise in stored order, so a reordered list is a different list.
pub fn equals(a: Option<&StreamDescriptor>, b: Option<&StreamDescriptor>) -> bool {
    let (Some(a), Some(b)) = (a, b) else {
        return false;
    };

    a.hversion == b.hversion
        && a.xstart == b.xstart
        && a.xdelta == b.xdelta
        && a.xunits == b.xunits
        && a.subsize == b.subsize
        && a.ystart == b.ystart
        && a.ydelta == b.ydelta
        && a.yunits == b.yunits
        && a.mode == b.mode
        && a.stream_id == b.stream_id
        && a.blocking == b.blocking
        && keywords_equal(a.keywords.as_deref(), b.keywords.as_deref())
}

/// Every field that differs between two descriptors.
///
/// An absent descriptor differs in every field.
pub fn diff(a: Option<&StreamDescriptor>, b: Option<&StreamDescriptor>) -> SriChanges {
    let (Some(a), Some(b)) = (a, b) else {
        return SriChanges::ALL;
    };

    let checks = [
        (a.hversion != b.hversion, SriChanges::HVERSION),
        (a.xstart != b.xstart, SriChanges::XSTART),
        (a.xdelta != b.xdelta, SriChanges::XDELTA),
        (a.xunits != b.xunits, SriChanges::XUNITS),
        (a.subsize != b.subsize, SriChanges::SUBSIZE),
        (a.ystart != b.ystart, SriChanges::YSTART),
        (a.ydelta != b.ydelta, SriChanges::YDELTA),
        (a.yunits != b.yunits, SriChanges::YUNITS),
        (a.mode != b.mode, SriChanges::MODE),
        (a.stream_id != b.stream_id, SriChanges::STREAMID),
        (a.blocking != b.blocking, SriChanges::BLOCKING),
        (
            !keywords_equal(a.keywords.as_deref(), b.keywords.as_deref()),
            SriChanges::KEYWORDS,
        ),
    ];

    checks
        .into_iter()
        .filter(|(differs, _)| *differs)
        .fold(SriChanges::NONE, |acc, (_, flag)| acc | flag)
}

fn keywords_equal(a: Option<&[Keyword]>, b: Option<&[Keyword]>) -> bool {
    let (Some(a), Some(b)) = (a, b) else {
        return false;
    };
    a.len() == b.len() && a.iter().zip(b).all(|(ka, kb)| ka.id == kb.id && ka.value == kb.value)
}
