//! Coordinate reference systems: WGS84, Web Mercator and Lambert Conformal
//! Conic (two standard parallels, Snyder 1987 ellipsoidal formulas).
//!
//! Only the projections the census data actually uses are supported; there
//! is no datum shifting (NAD83 and WGS84 differ by about a metre here).

use crate::error::{AnalysisError, AnalysisResult};
use geo::{Coord, MapCoords, MultiPolygon, Point};
use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::fmt;

const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;
const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_78;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    pub a: f64,
    pub f: f64,
}

impl Ellipsoid {
    pub const GRS80: Ellipsoid = Ellipsoid { a: 6_378_137.0, f: 1.0 / 298.257_222_101 };
    pub const WGS84: Ellipsoid = Ellipsoid { a: 6_378_137.0, f: 1.0 / 298.257_223_563 };

    fn eccentricity(&self) -> f64 {
        (2.0 * self.f - self.f * self.f).sqrt()
    }
}

/// Precomputed constants of a two-parallel Lambert Conformal Conic.
#[derive(Debug, Clone, PartialEq)]
pub struct LambertConic {
    a: f64,
    e: f64,
    n: f64,
    big_f: f64,
    rho0: f64,
    lon0: f64,
    x0: f64,
    y0: f64,
}

impl LambertConic {
    /// Angles in degrees, false easting/northing in meters.
    pub fn new(
        lat1: f64,
        lat2: f64,
        lat0: f64,
        lon0: f64,
        x0: f64,
        y0: f64,
        ellipsoid: Ellipsoid,
    ) -> AnalysisResult<Self> {
        if (lat1 + lat2).abs() < 1e-10 {
            return Err(AnalysisError::InvalidParameter {
                name: "lat_1",
                value: lat1.to_string(),
                reason: "standard parallels must not be symmetric about the equator".into(),
            });
        }
        let a = ellipsoid.a;
        let e = ellipsoid.eccentricity();
        let (p1, p2, p0) = (lat1.to_radians(), lat2.to_radians(), lat0.to_radians());

        let m1 = msfn(p1, e);
        let t1 = tsfn(p1, e);
        let n = if (p1 - p2).abs() > 1e-10 {
            (m1.ln() - msfn(p2, e).ln()) / (t1.ln() - tsfn(p2, e).ln())
        } else {
            p1.sin()
        };
        let big_f = m1 / (n * t1.powf(n));
        let rho0 = a * big_f * tsfn(p0, e).powf(n);

        Ok(LambertConic { a, e, n, big_f, rho0, lon0: lon0.to_radians(), x0, y0 })
    }

    /// EPSG:3347, NAD83 / Statistics Canada Lambert.
    pub fn statistics_canada() -> AnalysisResult<Self> {
        LambertConic::new(49.0, 77.0, 63.390675, -91.866_666_666_666_7, 6_200_000.0, 3_000_000.0, Ellipsoid::GRS80)
    }

    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let phi = lat.to_radians().clamp(-FRAC_PI_2 + 1e-10, FRAC_PI_2 - 1e-10);
        let rho = self.a * self.big_f * tsfn(phi, self.e).powf(self.n);
        let theta = self.n * wrap_pi(lon.to_radians() - self.lon0);
        (self.x0 + rho * theta.sin(), self.y0 + self.rho0 - rho * theta.cos())
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let sign = self.n.signum();
        let dx = x - self.x0;
        let dy = self.rho0 - (y - self.y0);
        let rho = sign * dx.hypot(dy);
        let theta = (sign * dx).atan2(sign * dy);
        let lon = theta / self.n + self.lon0;

        if rho == 0.0 {
            return (lon.to_degrees(), sign * 90.0);
        }
        let t = (rho / (self.a * self.big_f)).powf(1.0 / self.n);
        let mut phi = FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..15 {
            let es = self.e * phi.sin();
            let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(self.e / 2.0)).atan();
            let done = (next - phi).abs() < 1e-12;
            phi = next;
            if done {
                break;
            }
        }
        (wrap_pi(lon).to_degrees(), phi.to_degrees())
    }
}

fn msfn(phi: f64, e: f64) -> f64 {
    let s = phi.sin();
    phi.cos() / (1.0 - e * e * s * s).sqrt()
}

fn tsfn(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
}

fn wrap_pi(angle: f64) -> f64 {
    let mut a = angle;
    while a > PI {
        a -= 2.0 * PI;
    }
    while a < -PI {
        a += 2.0 * PI;
    }
    a
}

#[derive(Debug, Clone, PartialEq)]
pub enum Crs {
    /// Geographic longitude/latitude in degrees (EPSG:4326).
    Wgs84,
    /// Spherical "pseudo" Mercator (EPSG:3857).
    WebMercator,
    Lambert(LambertConic),
}

impl Crs {
    pub fn from_epsg(code: u32) -> AnalysisResult<Self> {
        match code {
            4326 => Ok(Crs::Wgs84),
            3857 | 900913 => Ok(Crs::WebMercator),
            3347 => Ok(Crs::Lambert(LambertConic::statistics_canada()?)),
            _ => Err(AnalysisError::UnsupportedCrs(format!("EPSG:{}", code))),
        }
    }

    /// Parses `EPSG:<code>` or a proj4 string.
    pub fn parse(definition: &str) -> AnalysisResult<Self> {
        let def = definition.trim();
        if let Some(code) = def.strip_prefix("EPSG:").or_else(|| def.strip_prefix("epsg:")) {
            let code: u32 = code
                .trim()
                .parse()
                .map_err(|_| AnalysisError::UnsupportedCrs(def.to_string()))?;
            return Self::from_epsg(code);
        }
        Self::from_proj4(def)
    }

    fn from_proj4(def: &str) -> AnalysisResult<Self> {
        let params: HashMap<&str, &str> = def
            .split_whitespace()
            .filter_map(|tok| tok.strip_prefix('+'))
            .map(|tok| tok.split_once('=').unwrap_or((tok, "")))
            .collect();

        let num = |key: &'static str, default: Option<f64>| -> AnalysisResult<f64> {
            match params.get(key) {
                Some(v) => v.parse().map_err(|_| AnalysisError::InvalidParameter {
                    name: key,
                    value: v.to_string(),
                    reason: "not a number".into(),
                }),
                None => default.ok_or_else(|| AnalysisError::InvalidParameter {
                    name: key,
                    value: String::new(),
                    reason: "missing from proj4 string".into(),
                }),
            }
        };

        match params.get("proj").copied() {
            Some("longlat") | Some("latlong") => Ok(Crs::Wgs84),
            Some("merc") => {
                let a = num("a", Some(WEB_MERCATOR_RADIUS))?;
                let b = num("b", Some(a))?;
                if a == WEB_MERCATOR_RADIUS && b == WEB_MERCATOR_RADIUS {
                    Ok(Crs::WebMercator)
                } else {
                    Err(AnalysisError::UnsupportedCrs(def.to_string()))
                }
            }
            Some("lcc") => {
                let ellipsoid = match params.get("ellps").copied() {
                    Some("GRS80") | None => Ellipsoid::GRS80,
                    Some("WGS84") => Ellipsoid::WGS84,
                    Some(other) => return Err(AnalysisError::UnsupportedCrs(format!("ellipsoid {}", other))),
                };
                let lat1 = num("lat_1", None)?;
                let lat2 = num("lat_2", Some(lat1))?;
                let lcc = LambertConic::new(
                    lat1,
                    lat2,
                    num("lat_0", Some(0.0))?,
                    num("lon_0", Some(0.0))?,
                    num("x_0", Some(0.0))?,
                    num("y_0", Some(0.0))?,
                    ellipsoid,
                )?;
                Ok(Crs::Lambert(lcc))
            }
            _ => Err(AnalysisError::UnsupportedCrs(def.to_string())),
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Wgs84)
    }

    /// (x, y) in this CRS -> (lon, lat) in degrees.
    pub fn to_geographic(&self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::Wgs84 => c,
            Crs::WebMercator => {
                let lon = (c.x / WEB_MERCATOR_RADIUS).to_degrees();
                let lat = (2.0 * (c.y / WEB_MERCATOR_RADIUS).exp().atan() - FRAC_PI_2).to_degrees();
                Coord { x: lon, y: lat }
            }
            Crs::Lambert(lcc) => {
                let (x, y) = lcc.inverse(c.x, c.y);
                Coord { x, y }
            }
        }
    }

    /// (lon, lat) in degrees -> (x, y) in this CRS.
    pub fn from_geographic(&self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::Wgs84 => c,
            Crs::WebMercator => {
                let lat = c.y.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT).to_radians();
                Coord {
                    x: WEB_MERCATOR_RADIUS * c.x.to_radians(),
                    y: WEB_MERCATOR_RADIUS * (FRAC_PI_4 + lat / 2.0).tan().ln(),
                }
            }
            Crs::Lambert(lcc) => {
                let (x, y) = lcc.forward(c.x, c.y);
                Coord { x, y }
            }
        }
    }

    pub fn transform_coord(&self, target: &Crs, c: Coord<f64>) -> Coord<f64> {
        if self == target {
            return c;
        }
        target.from_geographic(self.to_geographic(c))
    }

    pub fn transform_point(&self, target: &Crs, p: Point<f64>) -> Point<f64> {
        Point::from(self.transform_coord(target, p.0))
    }

    pub fn transform_multipolygon(&self, target: &Crs, mp: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        if self == target {
            return mp.clone();
        }
        mp.map_coords(|c| self.transform_coord(target, c))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Wgs84 => write!(f, "EPSG:4326"),
            Crs::WebMercator => write!(f, "EPSG:3857"),
            Crs::Lambert(lcc) => write!(
                f,
                "LCC(n={:.6}, lon_0={:.6})",
                lcc.n,
                lcc.lon0.to_degrees()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::STATCAN_LAMBERT;
    use geo::{polygon, Area};

    #[test]
    fn proj4_string_matches_epsg_3347() {
        let parsed = Crs::parse(STATCAN_LAMBERT).unwrap();
        assert_eq!(parsed, Crs::from_epsg(3347).unwrap());
        assert!(!parsed.is_geographic());
        assert!(Crs::parse("EPSG:4326").unwrap().is_geographic());
    }

    #[test]
    fn vancouver_in_statcan_lambert() {
        let crs = Crs::from_epsg(3347).unwrap();
        let p = crs.from_geographic(Coord { x: -123.1207, y: 49.2827 });
        assert!((p.x - 4_018_834.4).abs() < 1.0, "x = {}", p.x);
        assert!((p.y - 2_007_337.2).abs() < 1.0, "y = {}", p.y);
    }

    #[test]
    fn lambert_round_trip() {
        let crs = Crs::parse(STATCAN_LAMBERT).unwrap();
        for &(lon, lat) in &[(-123.1207, 49.2827), (-79.3832, 43.6532), (-114.0719, 51.0447), (-68.5, 63.7)] {
            let back = crs.to_geographic(crs.from_geographic(Coord { x: lon, y: lat }));
            assert!((back.x - lon).abs() < 1e-9, "lon {} -> {}", lon, back.x);
            assert!((back.y - lat).abs() < 1e-9, "lat {} -> {}", lat, back.y);
        }
    }

    #[test]
    fn web_mercator_round_trip() {
        let crs = Crs::WebMercator;
        let p = crs.from_geographic(Coord { x: 180.0, y: 0.0 });
        assert!((p.x - PI * WEB_MERCATOR_RADIUS).abs() < 1e-6);
        let back = crs.to_geographic(crs.from_geographic(Coord { x: -123.1207, y: 49.2827 }));
        assert!((back.x + 123.1207).abs() < 1e-9);
        assert!((back.y - 49.2827).abs() < 1e-9);
    }

    #[test]
    fn small_cell_area_is_metric() {
        let wgs = Crs::Wgs84;
        let lcc = Crs::from_epsg(3347).unwrap();
        let cell = MultiPolygon::new(vec![polygon![
            (x: -123.13, y: 49.28),
            (x: -123.12, y: 49.28),
            (x: -123.12, y: 49.29),
            (x: -123.13, y: 49.29),
            (x: -123.13, y: 49.28),
        ]]);
        let projected = wgs.transform_multipolygon(&lcc, &cell);
        let km2 = projected.unsigned_area() * 1e-6;
        assert!((0.80..0.815).contains(&km2), "area {}", km2);
    }

    #[test]
    fn unsupported_definitions_are_errors() {
        assert!(matches!(Crs::parse("EPSG:27700"), Err(AnalysisError::UnsupportedCrs(_))));
        assert!(Crs::parse("+proj=tmerc +lat_0=0").is_err());
        assert!(Crs::parse("+proj=lcc +lat_2=77").is_err());
    }
}
