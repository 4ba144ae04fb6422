//! Band file discovery

use crate::statistics::ZonalStatistic;
use landcover_core::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// A single-band raster file contributing one feature column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandFile {
    pub path: PathBuf,
    /// File name up to its first `.`, e.g. `B02_20221102T084019_clipped`
    pub name: String,
}

impl BandFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.split('.').next())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidParameter {
                name: "band",
                value: path.display().to_string(),
                reason: "cannot derive a band name from the file name".into(),
            })?;
        Ok(Self { path, name })
    }

    /// Feature column name: `{statistic}_{band}`
    pub fn column_name(&self, statistic: ZonalStatistic) -> String {
        format!("{}_{}", statistic.name(), self.name)
    }
}

fn is_raster(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, found)?;
        } else if is_raster(&path) {
            found.push(path);
        }
    }
    Ok(())
}

/// Find every GeoTIFF under `dir`, recursively, sorted by path.
///
/// Sorting fixes the feature column order independently of the order the
/// filesystem happens to list entries in.
pub fn discover_bands<P: AsRef<Path>>(dir: P) -> Result<Vec<BandFile>> {
    let dir = dir.as_ref();
    let mut paths = Vec::new();
    walk(dir, &mut paths)?;
    paths.sort();

    if paths.is_empty() {
        return Err(Error::InsufficientData(format!(
            "no band rasters (.tif/.tiff) found under {}",
            dir.display()
        )));
    }

    paths.into_iter().map(BandFile::from_path).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_name_stops_at_first_dot() {
        let band = BandFile::from_path("/data/B02_20221102T084019_clipped.tif").unwrap();
        assert_eq!(band.name, "B02_20221102T084019_clipped");
        assert_eq!(band.column_name(ZonalStatistic::Min), "min_B02_20221102T084019_clipped");

        let band = BandFile::from_path("/data/B08.masked.tif").unwrap();
        assert_eq!(band.name, "B08");
        assert!(BandFile::from_path("/data/.tif").is_err());
    }

    #[test]
    fn test_discover_sorted_and_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nir");
        fs::create_dir(&nested).unwrap();
        for path in [
            dir.path().join("B04.tif"),
            dir.path().join("B02.TIF"),
            dir.path().join("notes.txt"),
            nested.join("B08.tiff"),
        ] {
            fs::write(path, b"").unwrap();
        }

        let bands = discover_bands(dir.path()).unwrap();
        let names: Vec<&str> = bands.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["B02", "B04", "B08"]);
    }

    #[test]
    fn test_discover_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(discover_bands(dir.path()), Err(Error::InsufficientData(_))));
    }
}
