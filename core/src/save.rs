//! Save-state codec: a sectioned snapshot of the machine's state root
//! (`spec.md` §6, "Save-state").
//!
//! No teacher counterpart — `rugby` has no save-state support at all. This
//! is built from the spec's own description: a 4-byte magic, a monotonic
//! version, then a sequence of independently versioned, length-prefixed
//! sections, so that a field added to the tail of one section doesn't
//! invalidate every other section's offset. [`Machine`](crate::Machine)
//! is the only thing with enough state to fill these sections in; this
//! module just owns the framing.

use std::collections::BTreeMap;

use thiserror::Error;

/// `sizeof(bool)` is always 1 in Rust, so the magic is always `SAME` — the
/// `S4ME` alternative `spec.md` describes for platforms where `bool` is
/// wider has no Rust equivalent, and is recorded here only as a comment,
/// not a second code path.
const MAGIC: [u8; 4] = *b"SAME";

/// Bumped whenever the section set or a section's meaning changes in a way
/// that isn't just "fields appended to the tail".
pub const FORMAT_VERSION: u32 = 1;

/// One of the nine labelled sections `spec.md` §6 names.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Section {
    Core,
    Dma,
    Mbc,
    Hram,
    Timing,
    Apu,
    Rtc,
    Video,
}

impl Section {
    const ALL: [Section; 8] = [
        Section::Core,
        Section::Dma,
        Section::Mbc,
        Section::Hram,
        Section::Timing,
        Section::Apu,
        Section::Rtc,
        Section::Video,
    ];

    fn tag(self) -> u8 {
        match self {
            Section::Core => 0,
            Section::Dma => 1,
            Section::Mbc => 2,
            Section::Hram => 3,
            Section::Timing => 4,
            Section::Apu => 5,
            Section::Rtc => 6,
            Section::Video => 7,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.tag() == tag)
    }
}

/// Assembles a save-state buffer one section at a time.
///
/// Sections may be written in any order; [`Builder::finish`] always emits
/// them in [`Section::ALL`] order so two builds of the same state produce
/// byte-identical output.
#[derive(Debug, Default)]
pub struct Builder {
    sections: BTreeMap<u8, (u16, Vec<u8>)>,
}

impl Builder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a section with its own version (independent of
    /// [`FORMAT_VERSION`], so a single section can evolve without bumping
    /// every other section's version).
    pub fn section(&mut self, id: Section, version: u16, bytes: Vec<u8>) -> &mut Self {
        self.sections.insert(id.tag(), (version, bytes));
        self
    }

    /// Serializes the header and every section added so far, in
    /// `Section::ALL` order.
    #[must_use]
    pub fn finish(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.sections.len() as u32).to_le_bytes());
        for (tag, (version, bytes)) in &self.sections {
            buf.push(*tag);
            buf.extend_from_slice(&version.to_le_bytes());
            buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(bytes);
        }
        buf
    }
}

/// A parsed save-state buffer, ready for section-by-section extraction.
#[derive(Debug)]
pub struct Reader {
    sections: BTreeMap<u8, (u16, Vec<u8>)>,
}

impl Reader {
    /// Parses `buf`'s header and section table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Magic`] if the 4-byte magic doesn't match, or
    /// [`Error::Version`] if the format version is newer than this crate
    /// understands. Malformed section framing returns [`Error::Truncated`].
    pub fn parse(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < 12 {
            return Err(Error::Truncated);
        }
        if buf[0..4] != MAGIC {
            return Err(Error::Magic);
        }
        let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if version > FORMAT_VERSION {
            return Err(Error::Version { found: version, supported: FORMAT_VERSION });
        }
        let count = u32::from_le_bytes(buf[8..12].try_into().unwrap());

        let mut sections = BTreeMap::new();
        let mut pos = 12;
        for _ in 0..count {
            let Some(&tag) = buf.get(pos) else {
                return Err(Error::Truncated);
            };
            pos += 1;
            let ver_bytes = buf.get(pos..pos + 2).ok_or(Error::Truncated)?;
            let ver = u16::from_le_bytes(ver_bytes.try_into().unwrap());
            pos += 2;
            let len_bytes = buf.get(pos..pos + 4).ok_or(Error::Truncated)?;
            let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
            pos += 4;
            let data = buf.get(pos..pos + len).ok_or(Error::Truncated)?;
            pos += len;
            sections.insert(tag, (ver, data.to_vec()));
        }
        Ok(Self { sections })
    }

    /// Looks up a section's version and bytes by label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingSection`] if `id` isn't present in the
    /// buffer — a save from a build with fewer sections than this one, for
    /// instance.
    pub fn section(&self, id: Section) -> Result<(u16, &[u8]), Error> {
        self.sections
            .get(&id.tag())
            .map(|(version, bytes)| (*version, bytes.as_slice()))
            .ok_or(Error::MissingSection(id))
    }
}

/// An error loading a save-state buffer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("save-state buffer is truncated")]
    Truncated,
    #[error("save-state magic mismatch (not a save file for this core)")]
    Magic,
    #[error("save-state format version {found} is newer than the {supported} this build supports")]
    Version { found: u32, supported: u32 },
    #[error("save-state is missing the {0:?} section")]
    MissingSection(Section),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_sections_regardless_of_insertion_order() {
        let mut builder = Builder::new();
        builder.section(Section::Video, 1, vec![1, 2, 3]);
        builder.section(Section::Core, 2, vec![9, 9]);
        let buf = builder.finish();

        let reader = Reader::parse(&buf).unwrap();
        assert_eq!(reader.section(Section::Core).unwrap(), (2, &[9, 9][..]));
        assert_eq!(reader.section(Section::Video).unwrap(), (1, &[1, 2, 3][..]));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = Builder::new().finish();
        buf[0] = b'X';
        assert!(matches!(Reader::parse(&buf), Err(Error::Magic)));
    }

    #[test]
    fn rejects_newer_version() {
        let mut buf = Builder::new().finish();
        buf[4..8].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        assert!(matches!(Reader::parse(&buf), Err(Error::Version { .. })));
    }

    #[test]
    fn missing_section_is_an_error() {
        let buf = Builder::new().finish();
        let reader = Reader::parse(&buf).unwrap();
        assert!(matches!(reader.section(Section::Apu), Err(Error::MissingSection(Section::Apu))));
    }

    #[test]
    fn appending_fields_to_a_section_tail_is_forward_compatible() {
        let mut old = Builder::new();
        old.section(Section::Hram, 1, vec![0xaa]);
        let buf = old.finish();

        let reader = Reader::parse(&buf).unwrap();
        let (version, bytes) = reader.section(Section::Hram).unwrap();
        assert_eq!(version, 1);
        assert_eq!(bytes, &[0xaa]);
    }
}
