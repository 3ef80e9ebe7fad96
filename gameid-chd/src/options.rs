use serde::{Deserialize, Serialize};

/// Tunables for opening a container.
///
/// Loaded from the `[chd]` table of the shared settings file by
/// [`ChdOptions::from_settings`], or built in code:
///
/// ```
/// use gameid_chd::ChdOptions;
///
/// let options = ChdOptions::new().hunk_cache_size(64).pvd_search(false);
/// assert_eq!(options.hunk_cache_size, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChdOptions {
    /// Number of decompressed hunks kept in memory. 0 disables caching.
    pub hunk_cache_size: usize,

    /// Check each decoded hunk against the checksum stored in the map.
    pub verify_hunk_crc: bool,

    /// Scan early hunks for a volume descriptor when track metadata does
    /// not say where the data track starts.
    pub pvd_search: bool,

    /// How many sectors the volume descriptor scan covers, at least five
    /// hunks' worth.
    pub pvd_search_sectors: u32,
}

impl Default for ChdOptions {
    fn default() -> Self {
        Self {
            hunk_cache_size: 16,
            verify_hunk_crc: true,
            pvd_search: true,
            pvd_search_sectors: 100,
        }
    }
}

impl ChdOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options from `[chd]` in `~/.config/gameid/settings.toml`, or defaults.
    pub fn from_settings() -> Self {
        gameid_core::settings::load_section("chd").unwrap_or_default()
    }

    pub fn hunk_cache_size(mut self, hunks: usize) -> Self {
        self.hunk_cache_size = hunks;
        self
    }

    pub fn verify_hunk_crc(mut self, verify: bool) -> Self {
        self.verify_hunk_crc = verify;
        self
    }

    pub fn pvd_search(mut self, enabled: bool) -> Self {
        self.pvd_search = enabled;
        self
    }

    pub fn pvd_search_sectors(mut self, sectors: u32) -> Self {
        self.pvd_search_sectors = sectors;
        self
    }
}
