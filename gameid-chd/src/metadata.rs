//! Metadata chain and CD track table.
//!
//! Metadata entries form a singly linked list starting at the header's
//! metadata offset. CD images describe their tracks there, either as ASCII
//! `KEY:VALUE` records (one per track) or as a single legacy binary table.

use std::collections::HashSet;
use std::fmt;

use positioned_io::ReadAt;

use gameid_core::util::{be_uint, fourcc, read_ascii};

use crate::error::{ChdError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Per-track ASCII record, current format.
pub const CDROM_TRACK_METADATA2_TAG: u32 = u32::from_be_bytes(*b"CHT2");
/// Per-track ASCII record, first format (no pregap fields).
pub const CDROM_TRACK_METADATA_TAG: u32 = u32::from_be_bytes(*b"CHTR");
/// Binary table of all tracks, oldest format.
pub const CDROM_OLD_METADATA_TAG: u32 = u32::from_be_bytes(*b"CHCD");
/// Per-track ASCII record for GD-ROM images.
pub const GDROM_TRACK_METADATA_TAG: u32 = u32::from_be_bytes(*b"CHGD");

pub const MAX_METADATA_ENTRIES: usize = 1000;
pub const MAX_TRACKS: usize = 99;

/// Tracks occupy a multiple of this many frames in the container.
pub const TRACK_PADDING: u64 = 4;

const ENTRY_HEADER_SIZE: usize = 16;
const OLD_TRACK_ENTRY_SIZE: usize = 24;

// ---------------------------------------------------------------------------
// Metadata chain
// ---------------------------------------------------------------------------

/// One entry of the metadata chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    /// File offset of the entry header.
    pub offset: u64,
    pub tag: u32,
    pub flags: u8,
    pub data: Vec<u8>,
}

impl MetadataEntry {
    pub fn tag_name(&self) -> String {
        fourcc(self.tag)
    }

    fn is_track_record(&self) -> bool {
        matches!(
            self.tag,
            CDROM_TRACK_METADATA2_TAG | CDROM_TRACK_METADATA_TAG | GDROM_TRACK_METADATA_TAG
        )
    }
}

/// Walk the metadata chain starting at `first_offset` (0 means empty).
pub fn read_metadata_chain<R: ReadAt + ?Sized>(
    source: &R,
    first_offset: u64,
) -> Result<Vec<MetadataEntry>> {
    let mut entries = Vec::new();
    let mut visited = HashSet::new();
    let mut offset = first_offset;

    while offset != 0 {
        if !visited.insert(offset) {
            return Err(ChdError::invalid_metadata(format!(
                "metadata chain loops back to offset {}",
                offset
            )));
        }
        if entries.len() >= MAX_METADATA_ENTRIES {
            return Err(ChdError::invalid_metadata(format!(
                "more than {} metadata entries",
                MAX_METADATA_ENTRIES
            )));
        }

        let mut header = [0u8; ENTRY_HEADER_SIZE];
        source.read_exact_at(offset, &mut header)?;
        let tag = be_uint(&header[0..4]) as u32;
        let flags = header[4];
        let length = be_uint(&header[5..8]) as usize;
        let next = be_uint(&header[8..16]);

        let mut data = vec![0u8; length];
        source.read_exact_at(offset + ENTRY_HEADER_SIZE as u64, &mut data)?;

        entries.push(MetadataEntry {
            offset,
            tag,
            flags,
            data,
        });
        offset = next;
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Track types
// ---------------------------------------------------------------------------

/// Sector format of a CD track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    Mode1,
    Mode1Raw,
    Mode2,
    Mode2Form1,
    Mode2Form2,
    Mode2FormMix,
    Mode2Raw,
    Audio,
}

impl TrackType {
    /// Parse a metadata track type, accepting CUE-style aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MODE1" | "MODE1/2048" => Some(Self::Mode1),
            "MODE1_RAW" | "MODE1/2352" => Some(Self::Mode1Raw),
            "MODE2" | "MODE2/2336" => Some(Self::Mode2),
            "MODE2_FORM1" | "MODE2/2048" => Some(Self::Mode2Form1),
            "MODE2_FORM2" | "MODE2/2324" => Some(Self::Mode2Form2),
            "MODE2_FORM_MIX" => Some(Self::Mode2FormMix),
            "MODE2_RAW" | "MODE2/2352" => Some(Self::Mode2Raw),
            "AUDIO" => Some(Self::Audio),
            _ => None,
        }
    }

    /// Track type code used by the binary track table.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Mode1),
            1 => Some(Self::Mode1Raw),
            2 => Some(Self::Mode2),
            3 => Some(Self::Mode2Form1),
            4 => Some(Self::Mode2Form2),
            5 => Some(Self::Mode2FormMix),
            6 => Some(Self::Mode2Raw),
            7 => Some(Self::Audio),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mode1 => "MODE1",
            Self::Mode1Raw => "MODE1_RAW",
            Self::Mode2 => "MODE2",
            Self::Mode2Form1 => "MODE2_FORM1",
            Self::Mode2Form2 => "MODE2_FORM2",
            Self::Mode2FormMix => "MODE2_FORM_MIX",
            Self::Mode2Raw => "MODE2_RAW",
            Self::Audio => "AUDIO",
        }
    }

    /// Bytes of sector data per frame as recorded by the image tools.
    pub fn data_size(&self) -> u32 {
        match self {
            Self::Mode1 | Self::Mode2Form1 => 2048,
            Self::Mode2Form2 => 2324,
            Self::Mode2 | Self::Mode2FormMix => 2336,
            Self::Mode1Raw | Self::Mode2Raw | Self::Audio => 2352,
        }
    }

    pub fn is_data(&self) -> bool {
        *self != Self::Audio
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Subchannel data stored alongside a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubchannelType {
    Rw,
    RwRaw,
    None,
}

impl SubchannelType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RW" => Some(Self::Rw),
            "RW_RAW" => Some(Self::RwRaw),
            "NONE" => Some(Self::None),
            _ => None,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Rw),
            1 => Some(Self::RwRaw),
            2 => Some(Self::None),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tracks
// ---------------------------------------------------------------------------

/// One CD track and its physical position in the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub number: u32,
    pub track_type: TrackType,
    pub subchannel: SubchannelType,
    /// Frames stored for this track, including a stored pregap.
    pub frames: u32,
    pub pregap: u32,
    /// Raw `PGTYPE` value; a leading `V` means the pregap is stored.
    pub pregap_type: Option<String>,
    pub postgap: u32,
    /// Pad frames as recorded (GD-ROM `PAD`, or the binary table's extra frames).
    pub pad: u32,
    /// First frame of the track within the container.
    pub start_frame: u64,
}

impl Track {
    /// Whether the pregap frames are physically present in the image.
    pub fn pregap_in_image(&self) -> bool {
        self.pregap_type
            .as_deref()
            .is_some_and(|t| t.starts_with('V') || t.starts_with('v'))
    }

    /// Frames of pregap stored before the track's own data.
    pub fn stored_pregap(&self) -> u32 {
        if self.pregap_in_image() {
            self.pregap.min(self.frames)
        } else {
            0
        }
    }

    /// First frame of the track's data, past any stored pregap.
    pub fn data_start_frame(&self) -> u64 {
        self.start_frame + u64::from(self.stored_pregap())
    }

    /// Frames of track data, excluding any stored pregap.
    pub fn data_frames(&self) -> u32 {
        self.frames - self.stored_pregap()
    }
}

/// Track layout of a CD image, if it could be determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackTable {
    Known(Vec<Track>),
    Unknown,
}

impl TrackTable {
    /// Like [`TrackTable::from_metadata`], but a malformed record is logged
    /// and reported as `Unknown` instead of failing.
    pub fn from_metadata_or_unknown(entries: &[MetadataEntry]) -> Self {
        match Self::from_metadata(entries) {
            Ok(table) => table,
            Err(e) => {
                log::warn!("Ignoring malformed track metadata: {}", e);
                Self::Unknown
            }
        }
    }

    /// Build the track table from the metadata chain.
    ///
    /// Containers without track metadata yield `Unknown`; malformed track
    /// records are an error.
    pub fn from_metadata(entries: &[MetadataEntry]) -> Result<Self> {
        let records: Vec<&MetadataEntry> = entries.iter().filter(|e| e.is_track_record()).collect();
        let mut tracks = if !records.is_empty() {
            records
                .iter()
                .map(|e| parse_text_track(&read_ascii(&e.data)))
                .collect::<Result<Vec<_>>>()?
        } else if let Some(old) = entries.iter().find(|e| e.tag == CDROM_OLD_METADATA_TAG) {
            parse_old_table(&old.data)?
        } else {
            return Ok(Self::Unknown);
        };

        if tracks.len() > MAX_TRACKS {
            return Err(ChdError::invalid_metadata(format!(
                "{} tracks exceeds the limit of {}",
                tracks.len(),
                MAX_TRACKS
            )));
        }

        let mut frame = 0u64;
        for track in &mut tracks {
            track.start_frame = frame;
            frame += u64::from(track.frames).next_multiple_of(TRACK_PADDING);
        }
        Ok(Self::Known(tracks))
    }

    pub fn tracks(&self) -> &[Track] {
        match self {
            Self::Known(tracks) => tracks,
            Self::Unknown => &[],
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// The first track that carries data rather than audio.
    pub fn first_data_track(&self) -> Option<&Track> {
        self.tracks().iter().find(|t| t.track_type.is_data())
    }
}

/// Parse one `KEY:VALUE` track record.
fn parse_text_track(text: &str) -> Result<Track> {
    let mut number = None;
    let mut track_type = None;
    let mut subchannel = SubchannelType::None;
    let mut frames = None;
    let mut pregap = 0;
    let mut pregap_type = None;
    let mut postgap = 0;
    let mut pad = 0;

    for field in text.split_whitespace() {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        match key {
            "TRACK" => number = Some(parse_number(key, value)?),
            "TYPE" => {
                track_type = Some(TrackType::parse(value).ok_or_else(|| {
                    ChdError::invalid_metadata(format!("unknown track type '{}'", value))
                })?);
            }
            "SUBTYPE" => {
                subchannel = SubchannelType::parse(value).ok_or_else(|| {
                    ChdError::invalid_metadata(format!("unknown subchannel type '{}'", value))
                })?;
            }
            "FRAMES" => frames = Some(parse_number(key, value)?),
            "PREGAP" => pregap = parse_number(key, value)?,
            "PGTYPE" => pregap_type = Some(value.to_string()),
            "POSTGAP" => postgap = parse_number(key, value)?,
            "PAD" => pad = parse_number(key, value)?,
            _ => {}
        }
    }

    let number = number.ok_or_else(|| missing_field("TRACK", text))?;
    if number == 0 || number as usize > MAX_TRACKS {
        return Err(ChdError::invalid_metadata(format!(
            "track number {} out of range",
            number
        )));
    }

    Ok(Track {
        number,
        track_type: track_type.ok_or_else(|| missing_field("TYPE", text))?,
        subchannel,
        frames: frames.ok_or_else(|| missing_field("FRAMES", text))?,
        pregap,
        pregap_type,
        postgap,
        pad,
        start_frame: 0,
    })
}

/// Parse the legacy binary track table.
///
/// The table was written in host byte order; an implausible big-endian
/// track count means it came from a little-endian host.
fn parse_old_table(data: &[u8]) -> Result<Vec<Track>> {
    if data.len() < 4 {
        return Err(ChdError::invalid_metadata("binary track table is empty"));
    }
    let big = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let little = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let (count, read_u32): (u32, fn([u8; 4]) -> u32) = if big as usize <= MAX_TRACKS {
        (big, u32::from_be_bytes)
    } else {
        (little, u32::from_le_bytes)
    };
    if count as usize > MAX_TRACKS {
        return Err(ChdError::invalid_metadata(format!(
            "binary track table claims {} tracks",
            count
        )));
    }

    let needed = 4 + count as usize * OLD_TRACK_ENTRY_SIZE;
    if data.len() < needed {
        return Err(ChdError::invalid_metadata(format!(
            "binary track table needs {} bytes, has {}",
            needed,
            data.len()
        )));
    }

    (0..count as usize)
        .map(|i| {
            let base = 4 + i * OLD_TRACK_ENTRY_SIZE;
            let field = |n: usize| {
                let at = base + n * 4;
                read_u32([data[at], data[at + 1], data[at + 2], data[at + 3]])
            };
            let type_code = field(0);
            let sub_code = field(1);
            Ok(Track {
                number: i as u32 + 1,
                track_type: TrackType::from_code(type_code).ok_or_else(|| {
                    ChdError::invalid_metadata(format!("unknown track type code {}", type_code))
                })?,
                subchannel: SubchannelType::from_code(sub_code).unwrap_or(SubchannelType::None),
                frames: field(4),
                pregap: 0,
                pregap_type: None,
                postgap: 0,
                pad: field(5),
                start_frame: 0,
            })
        })
        .collect()
}

fn parse_number(key: &str, value: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| ChdError::invalid_metadata(format!("{} value '{}' is not a number", key, value)))
}

fn missing_field(key: &str, text: &str) -> ChdError {
    ChdError::invalid_metadata(format!("track record '{}' has no {} field", text, key))
}

#[cfg(test)]
#[path = "tests/metadata_tests.rs"]
mod tests;
