//! Field polygons in the raster's coordinate reference system.
//!
//! Rings are stored as `[x, y]` vertex lists; a closing vertex equal to the
//! first one is allowed but not required.

use crate::error::MaskError;

pub type Ring = Vec<[f64; 2]>;

/// Axis-aligned bounding box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    fn extend(&mut self, p: [f64; 2]) {
        self.min_x = self.min_x.min(p[0]);
        self.min_y = self.min_y.min(p[1]);
        self.max_x = self.max_x.max(p[0]);
        self.max_y = self.max_y.max(p[1]);
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }
}

/// Exterior ring plus optional holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Ring,
    pub holes: Vec<Ring>,
}

impl Polygon {
    pub fn new(exterior: Ring) -> Self {
        Self { exterior, holes: Vec::new() }
    }

    pub fn with_holes(exterior: Ring, holes: Vec<Ring>) -> Self {
        Self { exterior, holes }
    }

    fn rings(&self) -> impl Iterator<Item = &Ring> {
        std::iter::once(&self.exterior).chain(self.holes.iter())
    }

    /// Even-odd test over the exterior and every hole.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.rings().fold(false, |inside, ring| inside ^ ring_crosses(ring, x, y))
    }
}

/// Returns true when a ray from (x, y) towards +x crosses `ring` an odd
/// number of times.
fn ring_crosses(ring: &[[f64; 2]], x: f64, y: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];
        if (yi > y) != (yj > y) {
            let x_cross = xj + (y - yj) * (xi - xj) / (yi - yj);
            if x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn distinct_vertices(ring: &[[f64; 2]]) -> usize {
    let open = match (ring.first(), ring.last()) {
        (Some(a), Some(b)) if ring.len() > 1 && a == b => &ring[..ring.len() - 1],
        _ => ring,
    };
    let mut seen: Vec<[f64; 2]> = Vec::with_capacity(open.len());
    for p in open {
        if !seen.contains(p) {
            seen.push(*p);
        }
    }
    seen.len()
}

/// A field's footprint: a single polygon or a multipolygon. `Invalid` holds
/// a geometry that could not be read; it fails at masking time so the field
/// still yields a result.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldGeometry {
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
    Invalid(String),
}

impl FieldGeometry {
    pub fn polygons(&self) -> &[Polygon] {
        match self {
            Self::Polygon(p) => std::slice::from_ref(p),
            Self::MultiPolygon(ps) => ps,
            Self::Invalid(_) => &[],
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygons().iter().any(|p| p.contains(x, y))
    }

    /// Bounding box of all exterior rings. `None` for an empty geometry.
    pub fn bounds(&self) -> Option<Bounds> {
        let mut b = Bounds::empty();
        let mut any = false;
        for p in self.polygons() {
            for &v in &p.exterior {
                b.extend(v);
                any = true;
            }
        }
        any.then_some(b)
    }

    /// Structural checks run before masking.
    pub fn validate(&self) -> Result<(), MaskError> {
        if let Self::Invalid(reason) = self {
            return Err(MaskError::InvalidGeometry(reason.clone()));
        }
        if self.polygons().is_empty() {
            return Err(MaskError::EmptyGeometry);
        }
        for p in self.polygons() {
            for ring in p.rings() {
                if ring.iter().any(|v| !v[0].is_finite() || !v[1].is_finite()) {
                    return Err(MaskError::NonFiniteCoordinate);
                }
                let n = distinct_vertices(ring);
                if n < 3 {
                    return Err(MaskError::DegenerateRing(n));
                }
            }
        }
        Ok(())
    }
}

impl From<Polygon> for FieldGeometry {
    fn from(p: Polygon) -> Self {
        Self::Polygon(p)
    }
}

/// Axis-aligned rectangle as a closed polygon. Used by tests and fixtures.
pub fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> FieldGeometry {
    FieldGeometry::Polygon(Polygon::new(vec![
        [min_x, min_y],
        [max_x, min_y],
        [max_x, max_y],
        [min_x, max_y],
        [min_x, min_y],
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_contains_interior_not_exterior() {
        let g = rect(0.0, 0.0, 10.0, 10.0);
        assert!(g.contains(5.0, 5.0));
        assert!(g.contains(0.5, 9.5));
        assert!(!g.contains(-0.5, 5.0));
        assert!(!g.contains(5.0, 10.5));
    }

    #[test]
    fn hole_is_excluded() {
        let outer = vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        let hole = vec![[4.0, 4.0], [6.0, 4.0], [6.0, 6.0], [4.0, 6.0]];
        let g = FieldGeometry::Polygon(Polygon::with_holes(outer, vec![hole]));
        assert!(g.contains(2.0, 2.0));
        assert!(!g.contains(5.0, 5.0));
    }

    #[test]
    fn concave_polygon() {
        // L-shape: the upper-right quadrant is outside.
        let l = Polygon::new(vec![
            [0.0, 0.0],
            [4.0, 0.0],
            [4.0, 2.0],
            [2.0, 2.0],
            [2.0, 4.0],
            [0.0, 4.0],
        ]);
        assert!(l.contains(1.0, 3.0));
        assert!(l.contains(3.0, 1.0));
        assert!(!l.contains(3.0, 3.0));
    }

    #[test]
    fn multipolygon_contains_either_part() {
        let g = FieldGeometry::MultiPolygon(vec![
            Polygon::new(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]),
            Polygon::new(vec![[5.0, 5.0], [6.0, 5.0], [6.0, 6.0], [5.0, 6.0]]),
        ]);
        assert!(g.contains(0.5, 0.5));
        assert!(g.contains(5.5, 5.5));
        assert!(!g.contains(3.0, 3.0));
        let b = g.bounds().unwrap();
        assert_eq!((b.min_x, b.min_y, b.max_x, b.max_y), (0.0, 0.0, 6.0, 6.0));
    }

    #[test]
    fn validate_rejects_degenerate_and_non_finite() {
        let sliver = FieldGeometry::Polygon(Polygon::new(vec![[0.0, 0.0], [1.0, 1.0], [0.0, 0.0]]));
        assert_eq!(sliver.validate(), Err(MaskError::DegenerateRing(2)));

        let ring = vec![[0.0, 0.0], [f64::NAN, 0.0], [1.0, 1.0]];
        let nan = FieldGeometry::Polygon(Polygon::new(ring));
        assert_eq!(nan.validate(), Err(MaskError::NonFiniteCoordinate));

        assert_eq!(FieldGeometry::MultiPolygon(vec![]).validate(), Err(MaskError::EmptyGeometry));
        let unread = FieldGeometry::Invalid("no geometry".into());
        assert_eq!(unread.validate(), Err(MaskError::InvalidGeometry("no geometry".into())));
        assert!(unread.bounds().is_none());
        assert!(rect(0.0, 0.0, 1.0, 1.0).validate().is_ok());
    }
}
