//! Directory records.

/// Flag bit marking a directory rather than a file.
const FLAG_DIRECTORY: u8 = 0x02;

/// A parsed ISO 9660 directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub extent_lba: u32,
    pub data_length: u32,
    pub file_flags: u8,
    /// Identifier as stored, including any `;1` version suffix. The
    /// self and parent entries read as `.` and `..`.
    pub file_identifier: String,
}

impl DirectoryRecord {
    pub fn is_directory(&self) -> bool {
        self.file_flags & FLAG_DIRECTORY != 0
    }

    /// Identifier without its version suffix.
    pub fn name(&self) -> &str {
        self.file_identifier
            .split(';')
            .next()
            .unwrap_or(&self.file_identifier)
    }

    /// Case-insensitive comparison that ignores the version suffix.
    pub fn matches(&self, name: &str) -> bool {
        self.name().eq_ignore_ascii_case(name)
    }
}

/// Parse a single directory record; `None` if it is too short to be one.
pub(crate) fn parse_directory_record(data: &[u8]) -> Option<DirectoryRecord> {
    let record_len = *data.first()? as usize;
    if record_len < 33 || data.len() < record_len {
        return None;
    }

    let extent_lba = u32::from_le_bytes([data[2], data[3], data[4], data[5]]);
    let data_length = u32::from_le_bytes([data[10], data[11], data[12], data[13]]);
    let file_flags = data[25];
    let id_len = data[32] as usize;

    if 33 + id_len > record_len {
        return None;
    }

    let file_identifier = match &data[33..33 + id_len] {
        [0x00] => ".".to_string(),
        [0x01] => "..".to_string(),
        id => String::from_utf8_lossy(id).to_string(),
    };

    Some(DirectoryRecord {
        extent_lba,
        data_length,
        file_flags,
        file_identifier,
    })
}

/// Parse every record in one directory sector.
///
/// Records never straddle sectors; a zero length byte ends the sector.
pub(crate) fn parse_directory_sector(sector: &[u8]) -> Vec<DirectoryRecord> {
    let mut records = Vec::new();
    let mut pos = 0;
    while pos < sector.len() {
        let record_len = sector[pos] as usize;
        if record_len == 0 || pos + record_len > sector.len() {
            break;
        }
        if let Some(record) = parse_directory_record(&sector[pos..pos + record_len]) {
            records.push(record);
        }
        pos += record_len;
    }
    records
}
