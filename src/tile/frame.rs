//! Geometry of one Web-Mercator tile
//!
//! A tile `(zoom, x, y)` covers `u ∈ [0,1]`, `v ∈ [0,1]` in tile-normalized
//! coordinates (`v` grows southwards). Points are stored as signed 16-bit
//! fixed point: `short = clamp(32767·u − 16384)`.

use std::f64::consts::PI;
use crate::error::{OsmdbError, Result};
use crate::storage::record::Bounds;
use crate::tile::MAX_ZOOM;

/// Mean earth radius in meters
pub const EARTH_RADIUS: f64 = 6_371_008.8;

/// Latitude limit of the Mercator square
pub const MAX_LAT: f64 = 85.051_128_779_806_59;

/// Fraction of a tile added on every side before clipping
pub const CLIP_MARGIN: f64 = 1.0 / 16.0;

const SCALE: f64 = 32767.0;
const OFFSET: f64 = 16384.0;

/// Great-circle distance in meters
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = phi2 - phi1;
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS * a.sqrt().min(1.0).asin()
}

fn quantize(t: f64) -> i16 {
    (SCALE * t - OFFSET).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

fn dequantize(s: i16) -> f64 {
    (s as f64 + OFFSET) / SCALE
}

/// Global Mercator x in `[0,1]` at zoom 0
fn mercator_u(lon: f64) -> f64 {
    lon / 360.0 + 0.5
}

/// Global Mercator y in `[0,1]` at zoom 0 (north is 0)
fn mercator_v(lat: f64) -> f64 {
    let phi = lat.clamp(-MAX_LAT, MAX_LAT).to_radians();
    0.5 - (phi.tan() + 1.0 / phi.cos()).ln() / (2.0 * PI)
}

fn mercator_lat(v: f64) -> f64 {
    (PI * (1.0 - 2.0 * v)).sinh().atan().to_degrees()
}

/// Tile address plus its derived geographic frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileFrame {
    pub zoom: i32,
    pub x: i32,
    pub y: i32,
    scale: f64,
}

impl TileFrame {
    /// Validate `(zoom, x, y)`: zoom in `0..=15`, `x, y < 2^zoom`
    pub fn new(zoom: i32, x: i32, y: i32) -> Result<Self> {
        let valid = (0..=MAX_ZOOM).contains(&zoom) && {
            let n = 1i32 << zoom;
            (0..n).contains(&x) && (0..n).contains(&y)
        };
        if !valid {
            return Err(OsmdbError::InvalidTile { zoom, x, y });
        }
        Ok(Self { zoom, x, y, scale: (1i64 << zoom) as f64 })
    }

    /// Tile-normalized `(u, v)` of a geographic point
    pub fn uv(&self, lat: f64, lon: f64) -> (f64, f64) {
        (
            mercator_u(lon) * self.scale - self.x as f64,
            mercator_v(lat) * self.scale - self.y as f64,
        )
    }

    /// Geographic point of tile-normalized `(u, v)`
    pub fn latlon(&self, u: f64, v: f64) -> (f64, f64) {
        let lon = ((u + self.x as f64) / self.scale - 0.5) * 360.0;
        let lat = mercator_lat((v + self.y as f64) / self.scale);
        (lat, lon)
    }

    /// Fixed-point tile coordinates of a geographic point (saturating)
    pub fn point(&self, lat: f64, lon: f64) -> (i16, i16) {
        let (u, v) = self.uv(lat, lon);
        (quantize(u), quantize(v))
    }

    /// Geographic point of fixed-point tile coordinates
    pub fn inverse(&self, px: i16, py: i16) -> (f64, f64) {
        self.latlon(dequantize(px), dequantize(py))
    }

    pub fn bounds(&self) -> Bounds {
        let (lat_t, lon_l) = self.latlon(0.0, 0.0);
        let (lat_b, lon_r) = self.latlon(1.0, 1.0);
        Bounds::new(lat_t, lon_l, lat_b, lon_r)
    }

    /// Whether a point lies inside the tile grown by `CLIP_MARGIN`
    pub fn contains_expanded(&self, lat: f64, lon: f64) -> bool {
        let (u, v) = self.uv(lat, lon);
        let range = -CLIP_MARGIN..=1.0 + CLIP_MARGIN;
        range.contains(&u) && range.contains(&v)
    }

    /// Geodesic length of the tile diagonal in meters
    pub fn diagonal(&self) -> f64 {
        let b = self.bounds();
        haversine(b.lat_t, b.lon_l, b.lat_b, b.lon_r)
    }
}
