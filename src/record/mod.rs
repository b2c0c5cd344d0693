//! Size-discriminated records whose schema grows by appending fields.
//!
//! A [`RecordSchema`] lists the fields of its newest revision in on-disk
//! order, each tagged with the revision that introduced it. Because every
//! revision is its predecessor plus a fixed suffix, the fields of revision
//! `k` are always a prefix of the full list. Decoding picks the richest
//! revision whose byte length fits in the declared size; it never trusts a
//! version number stored inside the structure.

use crate::exceptions::{ForgeError, Result};
use log::{debug, trace};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Width class of the image the record was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// 32-bit image, pointer-sized fields are 4 bytes
    Pe32,
    /// 64-bit image, pointer-sized fields are 8 bytes
    Pe64,
}

impl Layout {
    /// Size of a pointer field for this layout
    pub fn pointer_size(self) -> usize {
        match self {
            Layout::Pe32 => 4,
            Layout::Pe64 => 8,
        }
    }
}

/// On-disk encoding of a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U16,
    U32,
    U64,
    /// 4 or 8 bytes depending on [`Layout`]
    Pointer,
}

impl FieldKind {
    /// Encoded width in bytes
    pub fn width(self, layout: Layout) -> usize {
        match self {
            FieldKind::U16 => 2,
            FieldKind::U32 => 4,
            FieldKind::U64 => 8,
            FieldKind::Pointer => layout.pointer_size(),
        }
    }

    /// Largest value the field can hold
    pub fn max_value(self, layout: Layout) -> u64 {
        match self.width(layout) {
            2 => u64::from(u16::MAX),
            4 => u64::from(u32::MAX),
            _ => u64::MAX,
        }
    }
}

/// One entry of a schema's field table
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec<F, V> {
    pub field: F,
    pub version: V,
    pub kind: FieldKind,
}

impl<F, V> FieldSpec<F, V> {
    pub const fn new(field: F, version: V, kind: FieldKind) -> Self {
        FieldSpec {
            field,
            version,
            kind,
        }
    }
}

/// Describes a family of appended-field revisions
pub trait RecordSchema: 'static {
    /// Revision tag, ordered oldest to newest
    type Version: Copy + Ord + Hash + fmt::Debug + fmt::Display;
    /// Field identifier
    type Field: Copy + Eq + Hash + fmt::Debug + fmt::Display;

    /// Human readable name used in errors and logs
    const NAME: &'static str;

    /// Every revision, oldest first
    fn versions() -> &'static [Self::Version];

    /// Fields of the newest revision in on-disk order
    fn fields(layout: Layout) -> &'static [FieldSpec<Self::Field, Self::Version>];

    /// Total byte length of `version` under `layout`
    fn size_of(layout: Layout, version: Self::Version) -> usize {
        Self::fields(layout)
            .iter()
            .take_while(|spec| spec.version <= version)
            .map(|spec| spec.kind.width(layout))
            .sum()
    }

    /// Size of the oldest revision
    fn min_size(layout: Layout) -> usize {
        Self::versions()
            .first()
            .map(|v| Self::size_of(layout, *v))
            .unwrap_or(0)
    }
}

/// A record decoded at the highest revision its bytes support.
///
/// Holds one value slot per field of the newest revision. Slots above the
/// decoded tier stay zero and are unreachable through the accessors.
pub struct VersionedRecord<S: RecordSchema> {
    layout: Layout,
    version: S::Version,
    values: Vec<u64>,
    trailing: Vec<u8>,
}

impl<S: RecordSchema> VersionedRecord<S> {
    /// Create a zeroed record at `version`
    pub fn new(layout: Layout, version: S::Version) -> Self {
        VersionedRecord {
            layout,
            version,
            values: vec![0; S::fields(layout).len()],
            trailing: Vec::new(),
        }
    }

    /// Decode `bytes` into the richest revision that fits in `declared_size`.
    ///
    /// Bytes between the selected revision's end and `declared_size` are kept
    /// verbatim so [`encode`](Self::encode) reproduces the input.
    pub fn decode(bytes: &[u8], declared_size: usize, layout: Layout) -> Result<Self> {
        let available = declared_size.min(bytes.len());
        let min_size = S::min_size(layout);

        if available < min_size {
            return Err(ForgeError::TruncatedRecord {
                record: S::NAME,
                needed: min_size,
                available,
            });
        }

        let version = S::versions()
            .iter()
            .rev()
            .copied()
            .find(|v| S::size_of(layout, *v) <= available)
            .ok_or_else(|| {
                ForgeError::Generic(format!("{} schema has no revisions", S::NAME))
            })?;

        let mut record = Self::new(layout, version);
        let mut offset = 0usize;
        for (slot, spec) in S::fields(layout).iter().enumerate() {
            if spec.version > version {
                break;
            }
            let width = spec.kind.width(layout);
            record.values[slot] = read_le(&bytes[offset..offset + width]);
            offset += width;
        }
        record.trailing = bytes[offset..available].to_vec();

        debug!(
            "Decoded {} as {} ({} bytes, {} trailing, declared {})",
            S::NAME,
            version,
            offset,
            record.trailing.len(),
            declared_size
        );
        Ok(record)
    }

    /// Decoded tier
    pub fn version(&self) -> S::Version {
        self.version
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Byte length of the decoded tier
    pub fn size(&self) -> usize {
        S::size_of(self.layout, self.version)
    }

    /// Size of the region the record was decoded from
    pub fn declared_size(&self) -> usize {
        self.size() + self.trailing.len()
    }

    /// Bytes past the decoded tier (fields from revisions this crate does not know)
    pub fn trailing(&self) -> &[u8] {
        &self.trailing
    }

    /// Whether `field` belongs to the decoded tier
    pub fn supports(&self, field: S::Field) -> bool {
        self.spec(field)
            .map(|(_, spec)| spec.version <= self.version)
            .unwrap_or(false)
    }

    /// Read a field, failing when it was introduced after the decoded tier
    pub fn get(&self, field: S::Field) -> Result<u64> {
        let (slot, spec) = self.spec(field).ok_or_else(|| self.unknown_field(field))?;
        if spec.version > self.version {
            return Err(ForgeError::UnsupportedVersion(format!(
                "{}.{} requires {}, record decoded as {}",
                S::NAME,
                field,
                spec.version,
                self.version
            )));
        }
        Ok(self.values[slot])
    }

    /// Write a field of the decoded tier. The tier never changes.
    pub fn set(&mut self, field: S::Field, value: u64) -> Result<()> {
        let (slot, spec) = self.spec(field).ok_or_else(|| self.unknown_field(field))?;
        if spec.version > self.version {
            return Err(ForgeError::SchemaMismatch(format!(
                "{}.{} belongs to {}, record decoded as {}",
                S::NAME,
                field,
                spec.version,
                self.version
            )));
        }
        let max = spec.kind.max_value(self.layout);
        if value > max {
            return Err(ForgeError::SchemaMismatch(format!(
                "{}.{} holds at most 0x{max:x}, got 0x{value:x}",
                S::NAME,
                field
            )));
        }
        trace!("{}.{}: 0x{:x} -> 0x{:x}", S::NAME, field, self.values[slot], value);
        self.values[slot] = value;
        Ok(())
    }

    /// Read-only view restricted to `version`'s fields
    pub fn as_version(&self, version: S::Version) -> Result<RecordView<'_, S>> {
        if version > self.version {
            return Err(ForgeError::UnsupportedVersion(format!(
                "{} decoded as {}, cannot view as {}",
                S::NAME,
                self.version,
                version
            )));
        }
        Ok(RecordView {
            record: self,
            version,
        })
    }

    /// Visible fields with their values, in on-disk order
    pub fn fields(&self) -> impl Iterator<Item = (S::Field, u64)> + '_ {
        self.visible(self.version)
    }

    /// Re-encode the decoded tier followed by the preserved trailing bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.encode_tier(self.version);
        bytes.extend_from_slice(&self.trailing);
        bytes
    }

    fn encode_tier(&self, version: S::Version) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(S::size_of(self.layout, version));
        for (slot, spec) in S::fields(self.layout).iter().enumerate() {
            if spec.version > version {
                break;
            }
            let width = spec.kind.width(self.layout);
            bytes.extend_from_slice(&self.values[slot].to_le_bytes()[..width]);
        }
        bytes
    }

    fn visible(&self, version: S::Version) -> impl Iterator<Item = (S::Field, u64)> + '_ {
        S::fields(self.layout)
            .iter()
            .zip(self.values.iter())
            .take_while(move |(spec, _)| spec.version <= version)
            .map(|(spec, value)| (spec.field, *value))
    }

    fn visible_count(&self) -> usize {
        S::fields(self.layout)
            .iter()
            .take_while(|spec| spec.version <= self.version)
            .count()
    }

    fn spec(&self, field: S::Field) -> Option<(usize, &'static FieldSpec<S::Field, S::Version>)> {
        S::fields(self.layout)
            .iter()
            .enumerate()
            .find(|(_, spec)| spec.field == field)
    }

    fn unknown_field(&self, field: S::Field) -> ForgeError {
        ForgeError::SchemaMismatch(format!("{} has no field {}", S::NAME, field))
    }
}

impl<S: RecordSchema> Clone for VersionedRecord<S> {
    fn clone(&self) -> Self {
        VersionedRecord {
            layout: self.layout,
            version: self.version,
            values: self.values.clone(),
            trailing: self.trailing.clone(),
        }
    }
}

impl<S: RecordSchema> fmt::Debug for VersionedRecord<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(S::NAME)
            .field("layout", &self.layout)
            .field("version", &self.version)
            .field("fields", &self.fields().collect::<Vec<_>>())
            .field("trailing", &self.trailing.len())
            .finish()
    }
}

// Identity is (layout, tier, tier fields). Trailing bytes are opaque.
impl<S: RecordSchema> PartialEq for VersionedRecord<S> {
    fn eq(&self, other: &Self) -> bool {
        let count = self.visible_count();
        self.layout == other.layout
            && self.version == other.version
            && self.values[..count] == other.values[..count]
    }
}

impl<S: RecordSchema> Eq for VersionedRecord<S> {}

impl<S: RecordSchema> Hash for VersionedRecord<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.layout.hash(state);
        self.version.hash(state);
        self.values[..self.visible_count()].hash(state);
    }
}

impl<S: RecordSchema> fmt::Display for VersionedRecord<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", S::NAME, self.version)?;
        for (field, value) in self.fields() {
            writeln!(f, "  {:<48} 0x{:x}", field.to_string(), value)?;
        }
        Ok(())
    }
}

/// Read-only projection of a record onto an older revision
pub struct RecordView<'a, S: RecordSchema> {
    record: &'a VersionedRecord<S>,
    version: S::Version,
}

impl<'a, S: RecordSchema> RecordView<'a, S> {
    pub fn version(&self) -> S::Version {
        self.version
    }

    /// Value of `field`, or `None` when the view's revision does not have it
    pub fn get(&self, field: S::Field) -> Option<u64> {
        let (slot, spec) = self.record.spec(field)?;
        (spec.version <= self.version).then(|| self.record.values[slot])
    }

    pub fn fields(&self) -> impl Iterator<Item = (S::Field, u64)> + 'a {
        self.record.visible(self.version)
    }

    /// Byte length of this revision
    pub fn size(&self) -> usize {
        S::size_of(self.record.layout, self.version)
    }

    /// Encoding of this revision alone
    pub fn to_bytes(&self) -> Vec<u8> {
        self.record.encode_tier(self.version)
    }
}

impl<S: RecordSchema> fmt::Debug for RecordView<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordView")
            .field("record", &S::NAME)
            .field("version", &self.version)
            .finish()
    }
}

fn read_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
