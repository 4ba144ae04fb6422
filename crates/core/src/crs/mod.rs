//! Coordinate Reference System handling

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System representation.
///
/// Equality compares the EPSG code and WKT only; the GeoTIFF key encoding
/// a CRS was read from is carried along but is not part of its identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
    /// GeoKeys as found in the source GeoTIFF, written back unchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    geokeys: Option<GeoKeys>,
}

impl PartialEq for CRS {
    fn eq(&self, other: &Self) -> bool {
        self.epsg == other.epsg && self.wkt == other.wkt
    }
}

/// Raw GeoTIFF georeferencing keys: the `GeoKeyDirectoryTag` entries and
/// the `GeoDoubleParamsTag` / `GeoAsciiParamsTag` values they point into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoKeys {
    pub directory: Vec<u16>,
    pub doubles: Vec<f64>,
    pub ascii: String,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
            geokeys: None,
        }
    }

    /// Create a CRS from a WKT string.
    ///
    /// The EPSG code is taken from the outermost `AUTHORITY["EPSG",...]`
    /// (WKT1) or `ID["EPSG",...]` (WKT2) when there is one.
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        let wkt = wkt.into();
        let epsg = outer_epsg(&wkt);
        Self {
            wkt: Some(wkt),
            epsg,
            geokeys: None,
        }
    }

    /// A CRS known only by its GeoTIFF keys
    pub fn from_geokeys(geokeys: GeoKeys) -> Self {
        Self {
            wkt: None,
            epsg: None,
            geokeys: Some(geokeys),
        }
    }

    /// Attach the GeoTIFF keys this CRS was decoded from
    pub fn with_geokeys(mut self, geokeys: GeoKeys) -> Self {
        self.geokeys = Some(geokeys);
        self
    }

    /// Parse an authority name as found in GeoJSON `crs` members and
    /// command lines.
    ///
    /// Accepts `EPSG:32633`, `urn:ogc:def:crs:EPSG::32633`,
    /// `urn:ogc:def:crs:EPSG:6.6:32633` and `urn:ogc:def:crs:OGC:1.3:CRS84`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.ends_with("CRS84") {
            return Some(Self::wgs84());
        }
        let upper = name.to_ascii_uppercase();
        if !upper.contains("EPSG") {
            return None;
        }
        upper
            .rsplit(':')
            .next()
            .and_then(|code| code.parse::<u32>().ok())
            .map(Self::from_epsg)
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// GeoTIFF keys this CRS was decoded from, if any
    pub fn geokeys(&self) -> Option<&GeoKeys> {
        self.geokeys.as_ref()
    }

    /// Whether the EPSG code denotes a geographic (lat/lon) system.
    ///
    /// Geographic 2D codes live in the 4000..5000 block of the EPSG registry.
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, Some(code) if (4000..5000).contains(&code))
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }

        // Textual WKT comparison is imperfect but never yields a false match
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }

        false
    }

    /// Whether [`is_equivalent`](Self::is_equivalent) can decide for this
    /// pair: both carry an EPSG code, or both carry WKT
    pub fn is_comparable(&self, other: &CRS) -> bool {
        (self.epsg.is_some() && other.epsg.is_some())
            || (self.wkt.is_some() && other.wkt.is_some())
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            let head: String = wkt.chars().take(50).collect();
            return format!("WKT:{}", head);
        }
        "Unknown".to_string()
    }
}

/// EPSG code of the authority clause that closes the root WKT node
fn outer_epsg(wkt: &str) -> Option<u32> {
    let upper = wkt.to_ascii_uppercase();
    let start = ["AUTHORITY[\"EPSG\",", "ID[\"EPSG\","]
        .iter()
        .filter_map(|tag| upper.rfind(tag).map(|i| i + tag.len()))
        .max()?;
    let rest = &upper[start..];
    let close = rest.find(']')?;
    // Only the root node's closing brackets may follow
    if !rest[close..].chars().all(|c| c == ']' || c.is_whitespace()) {
        return None;
    }
    rest[..close].trim().trim_matches('"').parse().ok()
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}
