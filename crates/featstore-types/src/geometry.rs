//! 2D geometries, bounding boxes and the WKB codec.
//!
//! Geometries are serialized to JSON in GeoJSON form and persisted
//! out-of-band as little-endian well-known binary.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// An `[x, y]` coordinate pair.
pub type Position = [f64; 2];

const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;

const BIG_ENDIAN: u8 = 0;
const LITTLE_ENDIAN: u8 = 1;

/// A two-dimensional geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    /// A single position.
    Point(Position),
    /// An open path.
    LineString(Vec<Position>),
    /// Exterior ring followed by interior rings.
    Polygon(Vec<Vec<Position>>),
}

impl Geometry {
    /// Kind name as used in GeoJSON.
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
        }
    }

    fn positions(&self) -> Box<dyn Iterator<Item = &Position> + '_> {
        match self {
            Geometry::Point(p) => Box::new(std::iter::once(p)),
            Geometry::LineString(line) => Box::new(line.iter()),
            Geometry::Polygon(rings) => Box::new(rings.iter().flatten()),
        }
    }

    /// Bounding box of all positions, `None` for an empty geometry.
    pub fn bbox(&self) -> Option<Bbox> {
        let mut positions = self.positions();
        let first = positions.next()?;
        let mut bbox = Bbox::new(first[0], first[1], first[0], first[1]);
        for p in positions {
            bbox.extend(*p);
        }
        Some(bbox)
    }

    /// Copy of this geometry with every polygon ring closed.
    pub fn closed(&self) -> Geometry {
        match self {
            Geometry::Polygon(rings) => Geometry::Polygon(
                rings
                    .iter()
                    .map(|ring| {
                        let mut ring = ring.clone();
                        if let (Some(first), Some(last)) =
                            (ring.first().copied(), ring.last().copied())
                            && first != last
                        {
                            ring.push(first);
                        }
                        ring
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Check coordinates are finite and each part has enough positions.
    ///
    /// Polygon rings are checked after closing.
    pub fn check(&self) -> Result<(), GeometryError> {
        if self.positions().any(|p| !p[0].is_finite() || !p[1].is_finite()) {
            return Err(GeometryError::NonFiniteCoordinate);
        }
        match self.closed() {
            Geometry::Point(_) => Ok(()),
            Geometry::LineString(line) => check_count("LineString", 2, line.len()),
            Geometry::Polygon(rings) => {
                check_count("Polygon", 1, rings.len())?;
                rings
                    .iter()
                    .try_for_each(|ring| check_count("LinearRing", 4, ring.len()))
            }
        }
    }

    /// Encode as little-endian WKB. Polygon rings are closed first.
    pub fn to_wkb(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(LITTLE_ENDIAN);
        match self.closed() {
            Geometry::Point(p) => {
                buf.put_u32_le(WKB_POINT);
                put_position(&mut buf, p);
            }
            Geometry::LineString(line) => {
                buf.put_u32_le(WKB_LINESTRING);
                put_positions(&mut buf, &line);
            }
            Geometry::Polygon(rings) => {
                buf.put_u32_le(WKB_POLYGON);
                buf.put_u32_le(rings.len() as u32);
                for ring in &rings {
                    put_positions(&mut buf, ring);
                }
            }
        }
        buf.freeze()
    }

    /// Decode a WKB buffer holding exactly one 2D geometry.
    pub fn from_wkb(data: &[u8]) -> Result<Self, GeometryError> {
        let mut reader = WkbReader { buf: data, little_endian: true };
        let order = reader.u8()?;
        reader.little_endian = match order {
            LITTLE_ENDIAN => true,
            BIG_ENDIAN => false,
            other => return Err(GeometryError::InvalidByteOrder(other)),
        };
        let geometry = match reader.u32()? {
            WKB_POINT => Geometry::Point(reader.position()?),
            WKB_LINESTRING => Geometry::LineString(reader.positions()?),
            WKB_POLYGON => {
                let count = reader.u32()? as usize;
                let mut rings = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    rings.push(reader.positions()?);
                }
                Geometry::Polygon(rings)
            }
            other => return Err(GeometryError::UnsupportedType(other)),
        };
        if reader.buf.has_remaining() {
            return Err(GeometryError::TrailingBytes(reader.buf.remaining()));
        }
        Ok(geometry)
    }
}

fn check_count(kind: &'static str, min: usize, found: usize) -> Result<(), GeometryError> {
    if found < min {
        Err(GeometryError::TooFewPositions { kind, min, found })
    } else {
        Ok(())
    }
}

fn put_position(buf: &mut BytesMut, p: Position) {
    buf.put_f64_le(p[0]);
    buf.put_f64_le(p[1]);
}

fn put_positions(buf: &mut BytesMut, positions: &[Position]) {
    buf.put_u32_le(positions.len() as u32);
    for p in positions {
        put_position(buf, *p);
    }
}

struct WkbReader<'a> {
    buf: &'a [u8],
    little_endian: bool,
}

impl WkbReader<'_> {
    fn ensure(&self, needed: usize) -> Result<(), GeometryError> {
        if self.buf.remaining() < needed {
            Err(GeometryError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            })
        } else {
            Ok(())
        }
    }

    fn u8(&mut self) -> Result<u8, GeometryError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    fn u32(&mut self) -> Result<u32, GeometryError> {
        self.ensure(4)?;
        Ok(if self.little_endian {
            self.buf.get_u32_le()
        } else {
            self.buf.get_u32()
        })
    }

    fn f64(&mut self) -> Result<f64, GeometryError> {
        self.ensure(8)?;
        Ok(if self.little_endian {
            self.buf.get_f64_le()
        } else {
            self.buf.get_f64()
        })
    }

    fn position(&mut self) -> Result<Position, GeometryError> {
        Ok([self.f64()?, self.f64()?])
    }

    fn positions(&mut self) -> Result<Vec<Position>, GeometryError> {
        let count = self.u32()? as usize;
        // a corrupt count must not trigger a huge allocation
        self.ensure(count.saturating_mul(16))?;
        (0..count).map(|_| self.position()).collect()
    }
}

/// Axis-aligned 2D bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bbox {
    /// Create a box from its corners.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Grow the box to include a position.
    pub fn extend(&mut self, p: Position) {
        self.min_x = self.min_x.min(p[0]);
        self.min_y = self.min_y.min(p[1]);
        self.max_x = self.max_x.max(p[0]);
        self.max_y = self.max_y.max(p[1]);
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &Bbox) -> Bbox {
        Bbox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Whether the boxes overlap (touching edges count).
    pub fn intersects(&self, other: &Bbox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// Whether min corners are not above max corners.
    pub fn is_valid(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y
    }
}
