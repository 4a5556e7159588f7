//! Canonical geometry: a tagged sum type with exactly one payload per kind.
//!
//! Serializes in GeoJSON shape (`{"type": "...", "coordinates": ...}`), so a
//! stored geometry can be read back by any GeoJSON consumer.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// `[x, y]` or `[x, y, z]`; x is longitude, y latitude.
pub type Position = Vec<f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Position },
    LineString { coordinates: Vec<Position> },
    Polygon { coordinates: Vec<Vec<Position>> },
    GeometryCollection { geometries: Vec<Geometry> },
}

impl Geometry {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Point { .. } => "Point",
            Self::LineString { .. } => "LineString",
            Self::Polygon { .. } => "Polygon",
            Self::GeometryCollection { .. } => "GeometryCollection",
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Self::GeometryCollection { .. })
    }

    /// Hoist the members of nested collections into a single flat collection,
    /// depth-first, preserving order. Non-collections are returned unchanged.
    pub fn flatten(self) -> Self {
        match self {
            Self::GeometryCollection { geometries } => {
                let mut flat = Vec::with_capacity(geometries.len());
                for g in geometries {
                    push_flat(g, &mut flat);
                }
                Self::GeometryCollection { geometries: flat }
            }
            other => other,
        }
    }

    /// Well-known-text rendering, e.g. `POINT(150.0216 -33.6097)`.
    pub fn to_wkt(&self) -> String {
        let mut out = String::new();
        write_wkt(self, &mut out);
        out
    }
}

fn push_flat(g: Geometry, out: &mut Vec<Geometry>) {
    match g {
        Geometry::GeometryCollection { geometries } => {
            for child in geometries {
                push_flat(child, out);
            }
        }
        leaf => out.push(leaf),
    }
}

fn write_wkt(g: &Geometry, out: &mut String) {
    match g {
        Geometry::Point { coordinates } => {
            out.push_str("POINT(");
            write_position(coordinates, out);
            out.push(')');
        }
        Geometry::LineString { coordinates } => {
            out.push_str("LINESTRING");
            write_ring(coordinates, out);
        }
        Geometry::Polygon { coordinates } => {
            out.push_str("POLYGON(");
            for (i, ring) in coordinates.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_ring(ring, out);
            }
            out.push(')');
        }
        Geometry::GeometryCollection { geometries } => {
            out.push_str("GEOMETRYCOLLECTION(");
            for (i, child) in geometries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_wkt(child, out);
            }
            out.push(')');
        }
    }
}

fn write_ring(points: &[Position], out: &mut String) {
    out.push('(');
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_position(p, out);
    }
    out.push(')');
}

fn write_position(p: &[f64], out: &mut String) {
    for (i, c) in p.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{c}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn point(x: f64, y: f64) -> Geometry {
        Geometry::Point {
            coordinates: vec![x, y],
        }
    }

    fn collection(geometries: Vec<Geometry>) -> Geometry {
        Geometry::GeometryCollection { geometries }
    }

    #[test]
    fn nested_collections_are_hoisted_in_order() {
        let line = Geometry::LineString {
            coordinates: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
        };
        let nested = collection(vec![
            point(1.0, 2.0),
            line.clone(),
            collection(vec![point(5.0, 6.0), collection(vec![line.clone()])]),
        ]);

        let flat = nested.flatten();
        assert!(flat.is_collection());
        assert_eq!(
            flat,
            collection(vec![point(1.0, 2.0), line.clone(), point(5.0, 6.0), line])
        );
    }

    #[test]
    fn non_collection_is_untouched() {
        let p = point(150.0216, -33.6097);
        assert_eq!(p.clone().flatten(), p);
    }

    #[test]
    fn serializes_as_geojson() {
        let json = serde_json::to_string(&point(150.0216, -33.6097)).unwrap();
        assert_eq!(json, r#"{"type":"Point","coordinates":[150.0216,-33.6097]}"#);
    }

    #[test]
    fn wkt_point_and_polygon() {
        assert_eq!(point(150.0216, -33.6097).to_wkt(), "POINT(150.0216 -33.6097)");

        let poly = Geometry::Polygon {
            coordinates: vec![vec![
                vec![152.3404, -29.7839],
                vec![152.3405, -29.7839],
                vec![152.3404, -29.7839],
            ]],
        };
        assert_eq!(
            poly.to_wkt(),
            "POLYGON((152.3404 -29.7839, 152.3405 -29.7839, 152.3404 -29.7839))"
        );
    }

    #[test]
    fn wkt_collection() {
        let g = collection(vec![point(1.0, 2.0), point(3.5, 4.0)]);
        assert_eq!(g.to_wkt(), "GEOMETRYCOLLECTION(POINT(1 2),POINT(3.5 4))");
    }

    fn arb_geometry() -> impl Strategy<Value = Geometry> {
        let leaf = (-180.0f64..180.0, -90.0f64..90.0).prop_map(|(x, y)| point(x, y));
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop::collection::vec(inner, 0..4).prop_map(collection)
        })
    }

    proptest! {
        #[test]
        fn flatten_is_idempotent(g in arb_geometry()) {
            let once = g.flatten();
            prop_assert_eq!(once.clone().flatten(), once.clone());
            if let Geometry::GeometryCollection { geometries } = &once {
                prop_assert!(geometries.iter().all(|c| !c.is_collection()));
            }
        }
    }
}
