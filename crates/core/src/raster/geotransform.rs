//! Affine geotransformation for rasters

use serde::{Deserialize, Serialize};

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and geographic coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// For north-up images the rotation terms are 0 and `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation about X axis (usually 0)
    pub row_rotation: f64,
    /// Rotation about Y axis (usually 0)
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation (north-up image)
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Build from the GeoTIFF `ModelTiepointTag` and `ModelPixelScaleTag` values.
    ///
    /// Tiepoint is `[I, J, K, X, Y, Z]`, scale is `[ScaleX, ScaleY, ScaleZ]`.
    /// Returns `None` when either tag is too short.
    pub fn from_tiepoint_scale(tiepoint: &[f64], scale: &[f64]) -> Option<Self> {
        if scale.len() < 2 || tiepoint.len() < 6 {
            return None;
        }
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        Some(Self::new(origin_x, origin_y, scale[0], -scale[1]))
    }

    /// GeoTIFF `(tiepoint, scale)` tag values for this transform.
    ///
    /// Only meaningful for [`is_north_up`](Self::is_north_up) transforms;
    /// the rest need [`to_model_transformation`](Self::to_model_transformation).
    pub fn to_tiepoint_scale(&self) -> ([f64; 6], [f64; 3]) {
        (
            [0.0, 0.0, 0.0, self.origin_x, self.origin_y, 0.0],
            [self.pixel_width, self.pixel_height.abs(), 0.0],
        )
    }

    /// Whether the tiepoint/scale pair can express this transform: no
    /// rotation and a north-up (negative) pixel height
    pub fn is_north_up(&self) -> bool {
        self.row_rotation == 0.0 && self.col_rotation == 0.0 && self.pixel_height < 0.0
    }

    /// Build from the 4x4 row-major GeoTIFF `ModelTransformationTag` matrix.
    ///
    /// Only the 2D affine terms are used. Returns `None` when the matrix has
    /// fewer than 16 values.
    pub fn from_model_transformation(m: &[f64]) -> Option<Self> {
        if m.len() < 16 {
            return None;
        }
        Some(Self {
            origin_x: m[3],
            origin_y: m[7],
            pixel_width: m[0],
            pixel_height: m[5],
            row_rotation: m[1],
            col_rotation: m[4],
        })
    }

    /// The GeoTIFF `ModelTransformationTag` matrix for this transform
    #[rustfmt::skip]
    pub fn to_model_transformation(&self) -> [f64; 16] {
        [
            self.pixel_width, self.row_rotation, 0.0, self.origin_x,
            self.col_rotation, self.pixel_height, 0.0, self.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }

    /// Convert pixel coordinates to geographic coordinates of the pixel center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Convert pixel coordinates to geographic coordinates (top-left corner)
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64, row as f64)
    }

    fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let y = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (x, y)
    }

    /// Convert geographic coordinates to fractional pixel coordinates `(col, row)`
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;

        if det.abs() < 1e-10 {
            return (f64::NAN, f64::NAN);
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;

        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;

        (col, row)
    }

    /// Cell `(row, col)` containing the geographic point, if it lies inside a
    /// grid of `rows` x `cols` cells.
    pub fn cell_at(&self, x: f64, y: f64, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let (col, row) = self.geo_to_pixel(x, y);
        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col.floor() as usize, row.floor() as usize);
        (row < rows && col < cols).then_some((row, col))
    }

    /// Calculate the bounding box `(min_x, min_y, max_x, max_y)` of a grid
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let corners = [
            self.pixel_to_geo_corner(0, 0),
            self.pixel_to_geo_corner(width, 0),
            self.pixel_to_geo_corner(0, height),
            self.pixel_to_geo_corner(width, height),
        ];

        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_geo_roundtrip() {
        let gt = GeoTransform::new(500_000.0, 4_200_000.0, 10.0, -10.0);

        let (x, y) = gt.pixel_to_geo(5, 10);
        let (col, row) = gt.geo_to_pixel(x, y);

        assert_relative_eq!(col, 5.5, epsilon = 1e-10);
        assert_relative_eq!(row, 10.5, epsilon = 1e-10);
    }

    #[test]
    fn test_cell_at_edges() {
        let gt = GeoTransform::new(0.0, 50.0, 1.0, -1.0);
        assert_eq!(gt.cell_at(0.2, 49.9, 50, 50), Some((0, 0)));
        assert_eq!(gt.cell_at(49.9, 0.1, 50, 50), Some((49, 49)));
        assert_eq!(gt.cell_at(50.1, 25.0, 50, 50), None);
        assert_eq!(gt.cell_at(-0.1, 25.0, 50, 50), None);
        assert_eq!(gt.cell_at(10.0, 51.0, 50, 50), None);
    }

    #[test]
    fn test_tiepoint_scale_roundtrip() {
        let gt = GeoTransform::new(399_960.0, 5_800_020.0, 10.0, -10.0);
        let (tiepoint, scale) = gt.to_tiepoint_scale();
        let back = GeoTransform::from_tiepoint_scale(&tiepoint, &scale).unwrap();
        assert_eq!(back, gt);
        assert!(GeoTransform::from_tiepoint_scale(&tiepoint[..3], &scale).is_none());
    }

    #[test]
    fn test_model_transformation_roundtrip() {
        let gt = GeoTransform {
            origin_x: 1000.0,
            origin_y: 2000.0,
            pixel_width: 10.0,
            pixel_height: -10.0,
            row_rotation: 2.0,
            col_rotation: -0.5,
        };
        assert!(!gt.is_north_up());
        let back = GeoTransform::from_model_transformation(&gt.to_model_transformation()).unwrap();
        assert_eq!(back, gt);
        assert_eq!(back.pixel_to_geo_corner(1, 1), (1012.0, 1989.5));
        assert!(GeoTransform::from_model_transformation(&[1.0; 6]).is_none());
        assert!(GeoTransform::new(0.0, 0.0, 1.0, -1.0).is_north_up());
        assert!(!GeoTransform::new(0.0, 0.0, 1.0, 1.0).is_north_up());
    }

    #[test]
    fn test_bounds() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let (min_x, min_y, max_x, max_y) = gt.bounds(100, 100);

        assert_relative_eq!(min_x, 0.0, epsilon = 1e-10);
        assert_relative_eq!(min_y, 0.0, epsilon = 1e-10);
        assert_relative_eq!(max_x, 100.0, epsilon = 1e-10);
        assert_relative_eq!(max_y, 100.0, epsilon = 1e-10);
    }
}
