//! Coordinate reference system detection and reprojection to WGS84.
//!
//! Every dataset is normalized to longitude/latitude degrees before it reaches the
//! dataset manager. Detection looks at legacy `crs` metadata first and falls back to a
//! heuristic on the first coordinate pair.

use std::fmt;
use std::sync::{Arc, LazyLock};

use geojson::{FeatureCollection, Geometry, Position, Value};
use log::{debug, info, warn};
use proj4rs::Proj;
use regex::Regex;

use crate::error::CrsError;

static EPSG_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)EPSG:+(\d+)").unwrap_or_else(|err| panic!("invalid EPSG pattern: {err}"))
});

const WGS84_PROJ_STRING: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// Half the Web Mercator world width in metres.
const MERCATOR_EXTENT: f64 = 20_037_509.0;

/// Coordinate reference systems the viewer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrsId {
    /// Longitude/latitude on WGS84 (EPSG:4326, CRS84). The canonical frame.
    Wgs84,
    /// Spherical Web Mercator (EPSG:3857 and its historical aliases)
    WebMercator,
    /// OSGB36 British National Grid (EPSG:27700)
    BritishNationalGrid,
    /// Any other EPSG code
    Epsg(u32),
}

impl CrsId {
    /// Map an EPSG code onto a known CRS.
    #[must_use]
    pub fn from_epsg(code: u32) -> Self {
        match code {
            4326 => Self::Wgs84,
            3857 | 900_913 | 3785 | 102_100 | 102_113 => Self::WebMercator,
            27700 => Self::BritishNationalGrid,
            other => Self::Epsg(other),
        }
    }

    /// EPSG code of the CRS.
    #[must_use]
    pub fn epsg_code(self) -> u32 {
        match self {
            Self::Wgs84 => 4326,
            Self::WebMercator => 3857,
            Self::BritishNationalGrid => 27700,
            Self::Epsg(code) => code,
        }
    }

    #[must_use]
    pub fn is_canonical(self) -> bool {
        self == Self::Wgs84
    }
}

impl fmt::Display for CrsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg_code())
    }
}

/// A forward projection into longitude/latitude degrees.
pub trait Projection {
    /// Project one coordinate pair.
    ///
    /// # Errors
    ///
    /// Returns [`CrsError::Projection`] when the point cannot be projected.
    fn to_lon_lat(&self, x: f64, y: f64) -> Result<(f64, f64), CrsError>;
}

/// Builds projections for a source CRS.
pub trait Reprojector: Send + Sync {
    /// Prepare the forward projection from `source` to WGS84.
    ///
    /// # Errors
    ///
    /// Returns [`CrsError::Unknown`] when no definition exists for `source`.
    fn prepare(&self, source: CrsId) -> Result<Box<dyn Projection>, CrsError>;
}

/// [`Reprojector`] backed by `proj4rs` and its bundled EPSG definitions.
#[derive(Debug, Default, Clone, Copy)]
pub struct Proj4Reprojector;

struct Proj4Projection {
    crs: CrsId,
    source: Proj,
    target: Proj,
}

impl Reprojector for Proj4Reprojector {
    fn prepare(&self, source: CrsId) -> Result<Box<dyn Projection>, CrsError> {
        let unknown = || CrsError::Unknown {
            crs: source.to_string(),
        };
        let code = u16::try_from(source.epsg_code()).map_err(|_| unknown())?;
        let source_proj = Proj::from_epsg_code(code).map_err(|_| unknown())?;
        let target = Proj::from_proj_string(WGS84_PROJ_STRING).map_err(|err| {
            CrsError::Projection {
                crs: CrsId::Wgs84.to_string(),
                message: err.to_string(),
            }
        })?;

        Ok(Box::new(Proj4Projection {
            crs: source,
            source: source_proj,
            target,
        }))
    }
}

impl Projection for Proj4Projection {
    fn to_lon_lat(&self, x: f64, y: f64) -> Result<(f64, f64), CrsError> {
        let mut point = if self.source.is_latlong() {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        proj4rs::transform::transform(&self.source, &self.target, &mut point).map_err(|err| {
            CrsError::Projection {
                crs: self.crs.to_string(),
                message: err.to_string(),
            }
        })?;

        let (lon, lat) = (point.0.to_degrees(), point.1.to_degrees());
        if lon.is_finite() && lat.is_finite() {
            Ok((lon, lat))
        } else {
            Err(CrsError::Projection {
                crs: self.crs.to_string(),
                message: format!("({x}, {y}) is outside the projection domain"),
            })
        }
    }
}

/// Detects and corrects the CRS of decoded collections.
#[derive(Clone)]
pub struct CrsResolver {
    reprojector: Arc<dyn Reprojector>,
}

impl fmt::Debug for CrsResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrsResolver").finish_non_exhaustive()
    }
}

impl Default for CrsResolver {
    fn default() -> Self {
        Self::new(Arc::new(Proj4Reprojector))
    }
}

impl CrsResolver {
    #[must_use]
    pub fn new(reprojector: Arc<dyn Reprojector>) -> Self {
        Self { reprojector }
    }

    /// Detect the CRS of a collection. The first matching rule wins:
    ///
    /// 1. legacy `crs.properties.name` metadata,
    /// 2. the range of the first coordinate pair,
    /// 3. WGS84.
    #[must_use]
    pub fn detect(&self, collection: &FeatureCollection) -> CrsId {
        if let Some(crs) = crs_from_metadata(collection) {
            debug!("CRS {crs} from collection metadata");
            return crs;
        }

        let Some((x, y)) = first_coordinate_pair(collection) else {
            return CrsId::Wgs84;
        };
        let crs = crs_from_coordinate(x, y);
        debug!("CRS {crs} guessed from first coordinate ({x}, {y})");
        crs
    }

    /// Reproject every position to WGS84 longitude/latitude.
    ///
    /// A canonical source returns the input as is. Positions keep their third and
    /// further ordinates. When the CRS is unknown or a point fails to project, a
    /// warning is logged and the input is returned untransformed.
    pub async fn transform(&self, collection: FeatureCollection, source: CrsId) -> FeatureCollection {
        if source.is_canonical() {
            return collection;
        }

        match self.reproject(&collection, source) {
            Ok(projected) => {
                info!(
                    "Reprojected {} features from {source} to {}",
                    projected.features.len(),
                    CrsId::Wgs84
                );
                projected
            },
            Err(err) => {
                warn!("{err}; showing data untransformed");
                collection
            },
        }
    }

    fn reproject(
        &self,
        collection: &FeatureCollection,
        source: CrsId,
    ) -> Result<FeatureCollection, CrsError> {
        let projection = self.reprojector.prepare(source)?;
        let mut projected = collection.clone();

        projected.bbox = None;
        if let Some(members) = projected.foreign_members.as_mut() {
            members.remove("crs");
            if members.is_empty() {
                projected.foreign_members = None;
            }
        }

        let mut project = |position: &mut Position| -> Result<(), CrsError> {
            let (lon, lat) = projection.to_lon_lat(position[0], position[1])?;
            position[0] = lon;
            position[1] = lat;
            Ok(())
        };
        let mut failed = 0;
        let mut first = None;
        for (index, feature) in projected.features.iter_mut().enumerate() {
            feature.bbox = None;
            let Some(geometry) = feature.geometry.as_mut() else {
                continue;
            };
            if let Err(err) = for_each_position(geometry, &mut project) {
                debug!("Feature {index} cannot be projected from {source}: {err}");
                failed += 1;
                first.get_or_insert(err);
            }
        }

        match first {
            None => Ok(projected),
            Some(first) => Err(CrsError::PartialProjection {
                crs: source.to_string(),
                failed,
                total: projected.features.len(),
                first: first.to_string(),
            }),
        }
    }
}

/// Apply `f` to every position with at least two ordinates, at any nesting depth.
///
/// # Errors
///
/// Stops at and returns the first error produced by `f`.
pub fn for_each_position<E>(
    geometry: &mut Geometry,
    f: &mut impl FnMut(&mut Position) -> Result<(), E>,
) -> Result<(), E> {
    geometry.bbox = None;
    let mut visit = |position: &mut Position| {
        if position.len() >= 2 {
            f(position)
        } else {
            Ok(())
        }
    };

    match &mut geometry.value {
        Value::Point(position) => visit(position),
        Value::MultiPoint(positions) | Value::LineString(positions) => {
            positions.iter_mut().try_for_each(visit)
        },
        Value::MultiLineString(lines) | Value::Polygon(lines) => lines
            .iter_mut()
            .flatten()
            .try_for_each(visit),
        Value::MultiPolygon(polygons) => polygons
            .iter_mut()
            .flatten()
            .flatten()
            .try_for_each(visit),
        Value::GeometryCollection(geometries) => geometries
            .iter_mut()
            .try_for_each(|geometry| for_each_position(geometry, f)),
    }
}

fn crs_from_metadata(collection: &FeatureCollection) -> Option<CrsId> {
    let name = collection
        .foreign_members
        .as_ref()?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;

    if name.to_ascii_uppercase().contains("CRS84") {
        return Some(CrsId::Wgs84);
    }
    let code = EPSG_CODE.captures(name)?[1].parse().ok()?;
    Some(CrsId::from_epsg(code))
}

fn crs_from_coordinate(x: f64, y: f64) -> CrsId {
    if x.abs() <= 180.0 && y.abs() <= 90.0 {
        CrsId::Wgs84
    } else if x > 0.0 && x < 700_000.0 && y > 0.0 && y < 1_300_000.0 {
        CrsId::BritishNationalGrid
    } else if x.abs() > 180.0 && x.abs() < MERCATOR_EXTENT {
        CrsId::WebMercator
    } else {
        CrsId::Wgs84
    }
}

/// First numeric coordinate pair of the first feature that has a geometry.
#[must_use]
pub fn first_coordinate_pair(collection: &FeatureCollection) -> Option<(f64, f64)> {
    collection
        .features
        .iter()
        .find_map(|feature| feature.geometry.as_ref())
        .and_then(|geometry| first_position(&geometry.value))
        .map(|position| (position[0], position[1]))
}

fn first_position(value: &Value) -> Option<&Position> {
    let pair = |position: &&Position| position.len() >= 2;
    match value {
        Value::Point(position) => Some(position).filter(pair),
        Value::MultiPoint(positions) | Value::LineString(positions) => {
            positions.iter().find(pair)
        },
        Value::MultiLineString(lines) | Value::Polygon(lines) => {
            lines.iter().flatten().find(pair)
        },
        Value::MultiPolygon(polygons) => polygons.iter().flatten().flatten().find(pair),
        Value::GeometryCollection(geometries) => geometries
            .iter()
            .find_map(|geometry| first_position(&geometry.value)),
    }
}
