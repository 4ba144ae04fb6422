//! Zonal statistics over vector footprints
//!
//! Samples a band raster at each footprint geometry and summarizes the
//! pixels it covers. A point covers the single pixel containing it; a polygon
//! covers every pixel whose center lies inside it. No-data and non-finite
//! pixels are never counted, so a footprint outside the raster or over
//! no-data yields no statistic at all.

use geo::{BoundingRect, Contains, Geometry, Point};
use landcover_core::raster::Raster;
use landcover_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Available zonal statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZonalStatistic {
    #[default]
    Min,
    Max,
    Mean,
    Median,
    Sum,
    Count,
    #[serde(rename = "std")]
    StdDev,
    Range,
}

impl ZonalStatistic {
    /// Short name used as the feature column prefix
    pub fn name(self) -> &'static str {
        match self {
            ZonalStatistic::Min => "min",
            ZonalStatistic::Max => "max",
            ZonalStatistic::Mean => "mean",
            ZonalStatistic::Median => "median",
            ZonalStatistic::Sum => "sum",
            ZonalStatistic::Count => "count",
            ZonalStatistic::StdDev => "std",
            ZonalStatistic::Range => "range",
        }
    }
}

impl fmt::Display for ZonalStatistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ZonalStatistic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "min" => Ok(ZonalStatistic::Min),
            "max" => Ok(ZonalStatistic::Max),
            "mean" => Ok(ZonalStatistic::Mean),
            "median" => Ok(ZonalStatistic::Median),
            "sum" => Ok(ZonalStatistic::Sum),
            "count" => Ok(ZonalStatistic::Count),
            "std" | "stddev" => Ok(ZonalStatistic::StdDev),
            "range" => Ok(ZonalStatistic::Range),
            _ => Err(Error::InvalidParameter {
                name: "statistic",
                value: s.to_string(),
                reason: "expected min, max, mean, median, sum, count, std or range".into(),
            }),
        }
    }
}

/// Summary of the pixels under one footprint
#[derive(Debug, Clone, PartialEq)]
pub struct ZonalResult {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub median: f64,
}

impl ZonalResult {
    /// Summarize a set of pixel values; `None` when there are none
    pub fn from_values(mut vals: Vec<f64>) -> Option<Self> {
        if vals.is_empty() {
            return None;
        }

        let count = vals.len();
        let sum: f64 = vals.iter().sum();
        let mean = sum / count as f64;
        let var = vals.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;

        vals.sort_by(|a, b| a.total_cmp(b));
        let min = vals[0];
        let max = vals[count - 1];
        let median = if count % 2 == 0 {
            (vals[count / 2 - 1] + vals[count / 2]) / 2.0
        } else {
            vals[count / 2]
        };

        Some(Self {
            count,
            sum,
            mean,
            std_dev: var.sqrt(),
            min,
            max,
            range: max - min,
            median,
        })
    }

    /// Value of one statistic
    pub fn get(&self, statistic: ZonalStatistic) -> f64 {
        match statistic {
            ZonalStatistic::Min => self.min,
            ZonalStatistic::Max => self.max,
            ZonalStatistic::Mean => self.mean,
            ZonalStatistic::Median => self.median,
            ZonalStatistic::Sum => self.sum,
            ZonalStatistic::Count => self.count as f64,
            ZonalStatistic::StdDev => self.std_dev,
            ZonalStatistic::Range => self.range,
        }
    }
}

/// Pixels `(row, col)` covered by a footprint, in row-major order
pub fn footprint_cells(raster: &Raster<f64>, footprint: &Geometry<f64>) -> Vec<(usize, usize)> {
    match footprint {
        Geometry::Point(p) => raster.cell_at(p.x(), p.y()).into_iter().collect(),
        Geometry::MultiPoint(mp) => {
            let mut cells: Vec<(usize, usize)> =
                mp.iter().filter_map(|p| raster.cell_at(p.x(), p.y())).collect();
            cells.sort_unstable();
            cells.dedup();
            cells
        }
        Geometry::Polygon(poly) => match poly.bounding_rect() {
            Some(rect) => cells_inside(raster, rect, |pt| poly.contains(pt)),
            None => Vec::new(),
        },
        Geometry::MultiPolygon(mpoly) => match mpoly.bounding_rect() {
            Some(rect) => cells_inside(raster, rect, |pt| mpoly.contains(pt)),
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Cells in the window around `rect` whose centers satisfy `inside`
fn cells_inside<F>(raster: &Raster<f64>, rect: geo::Rect<f64>, inside: F) -> Vec<(usize, usize)>
where
    F: Fn(&Point<f64>) -> bool,
{
    let (rows, cols) = raster.shape();
    let transform = raster.transform();
    let (min, max) = (rect.min(), rect.max());

    let corners = [
        transform.geo_to_pixel(min.x, min.y),
        transform.geo_to_pixel(min.x, max.y),
        transform.geo_to_pixel(max.x, min.y),
        transform.geo_to_pixel(max.x, max.y),
    ];
    if corners.iter().any(|(c, r)| !c.is_finite() || !r.is_finite()) {
        return Vec::new();
    }

    let col_lo = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min).floor().max(0.0) as usize;
    let col_hi = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max).ceil();
    let row_lo = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min).floor().max(0.0) as usize;
    let row_hi = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max).ceil();
    if col_hi < 0.0 || row_hi < 0.0 {
        return Vec::new();
    }
    let col_hi = (col_hi as usize).min(cols);
    let row_hi = (row_hi as usize).min(rows);

    let mut cells = Vec::new();
    for row in row_lo..row_hi {
        for col in col_lo..col_hi {
            let (x, y) = transform.pixel_to_geo(col, row);
            if inside(&Point::new(x, y)) {
                cells.push((row, col));
            }
        }
    }
    cells
}

/// Summaries for each footprint, in footprint order.
///
/// Entry `i` is `None` when footprint `i` covers no valid pixel.
pub fn footprint_statistics(
    values: &Raster<f64>,
    footprints: &[Geometry<f64>],
) -> Vec<Option<ZonalResult>> {
    footprints
        .iter()
        .map(|footprint| {
            let vals: Vec<f64> = footprint_cells(values, footprint)
                .into_iter()
                .filter_map(|(row, col)| values.get(row, col).ok())
                .filter(|&v| !values.is_nodata(v))
                .collect();
            ZonalResult::from_values(vals)
        })
        .collect()
}

/// One statistic per footprint, in footprint order
pub fn zonal_statistic(
    values: &Raster<f64>,
    footprints: &[Geometry<f64>],
    statistic: ZonalStatistic,
) -> Vec<Option<f64>> {
    footprint_statistics(values, footprints)
        .into_iter()
        .map(|r| r.map(|r| r.get(statistic)))
        .collect()
}
