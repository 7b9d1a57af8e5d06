use crate::types::{MosaicError, MosaicResult, SpectralBand};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Sentinel-2 band file names
pub const SENTINEL_RED: &str = "B04.jp2";
pub const SENTINEL_GREEN: &str = "B03.jp2";
pub const SENTINEL_BLUE: &str = "B02.jp2";
pub const SENTINEL_NIR: &str = "B08.jp2";

/// Band file paths of one dated capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturePaths {
    pub red: PathBuf,
    pub green: PathBuf,
    pub blue: PathBuf,
    pub nir: PathBuf,
    pub acquired: Option<NaiveDate>,
}

impl CapturePaths {
    pub fn new(red: PathBuf, green: PathBuf, blue: PathBuf, nir: PathBuf) -> Self {
        let acquired = date_from_path(&red);
        Self {
            red,
            green,
            blue,
            nir,
            acquired,
        }
    }

    /// `<base>/<YYYY-MM-DD>/<tile>/<band>/<file>` layout of downloaded Sentinel-2 scenes
    pub fn sentinel_layout(base_dir: &Path, date: NaiveDate, tile_code: &str) -> Self {
        let root = base_dir.join(date.format(DATE_FORMAT).to_string()).join(tile_code);
        Self {
            red: root.join(SpectralBand::Red.to_string()).join(SENTINEL_RED),
            green: root.join(SpectralBand::Green.to_string()).join(SENTINEL_GREEN),
            blue: root.join(SpectralBand::Blue.to_string()).join(SENTINEL_BLUE),
            nir: root.join(SpectralBand::NearInfrared.to_string()).join(SENTINEL_NIR),
            acquired: Some(date),
        }
    }

    /// Parse a `red,green,blue,nir` list of paths
    pub fn from_list(list: &str) -> MosaicResult<Self> {
        let parts: Vec<&str> = list.split(',').map(str::trim).collect();
        match parts.as_slice() {
            [red, green, blue, nir] if parts.iter().all(|p| !p.is_empty()) => Ok(Self::new(
                PathBuf::from(red),
                PathBuf::from(green),
                PathBuf::from(blue),
                PathBuf::from(nir),
            )),
            _ => Err(MosaicError::InvalidParameter(format!(
                "Expected four comma-separated band paths (red,green,blue,nir), got '{}'",
                list
            ))),
        }
    }

    pub fn paths(&self) -> [&Path; 4] {
        [&self.red, &self.green, &self.blue, &self.nir]
    }

    pub fn all_exist(&self) -> bool {
        self.paths().iter().all(|p| p.exists())
    }

    /// Acquisition date when known, otherwise the red band path
    pub fn label(&self) -> String {
        match self.acquired {
            Some(date) => date.format(DATE_FORMAT).to_string(),
            None => self.red.display().to_string(),
        }
    }
}

/// Every capture of `tile_code` between `start` and `end` (inclusive) whose four
/// band files exist, in chronological order
pub fn discover_captures(
    base_dir: &Path,
    tile_code: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> MosaicResult<Vec<CapturePaths>> {
    if start > end {
        return Err(MosaicError::InvalidParameter(format!(
            "Start date {} is after end date {}",
            start, end
        )));
    }
    log::info!(
        "Searching {} for tile {} between {} and {}",
        base_dir.display(),
        tile_code,
        start,
        end
    );

    let captures: Vec<CapturePaths> = start
        .iter_days()
        .take_while(|date| *date <= end)
        .map(|date| CapturePaths::sentinel_layout(base_dir, date, tile_code))
        .filter(|capture| capture.all_exist())
        .collect();

    log::info!("Found {} captures", captures.len());
    Ok(captures)
}

/// Acquisition date from a `<date>/<tile>/<band>/<file>` band path
pub fn date_from_path(path: &Path) -> Option<NaiveDate> {
    let name = path.parent()?.parent()?.parent()?.file_name()?.to_str()?;
    NaiveDate::parse_from_str(name, DATE_FORMAT).ok()
}
