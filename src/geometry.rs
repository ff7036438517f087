// Shared polyline geometry helpers. Points are geo::Point with
// x = longitude, y = latitude (WGS84).

use geo::{HaversineDistance, Point};

/// Geodesic length of a polyline in meters.
pub fn polyline_length_m(shape: &[Point<f64>]) -> f64 {
    shape
        .windows(2)
        .map(|w| w[0].haversine_distance(&w[1]))
        .sum()
}

/// Flatten a shape into the alternating [lon, lat, ...] form stored in
/// edge info records.
pub fn shape_to_coords(shape: &[Point<f64>]) -> Vec<f64> {
    let mut coords = Vec::with_capacity(shape.len() * 2);
    for p in shape {
        coords.push(p.x());
        coords.push(p.y());
    }
    coords
}

pub fn coords_to_shape(coords: &[f64]) -> Vec<Point<f64>> {
    coords
        .chunks_exact(2)
        .map(|c| Point::new(c[0], c[1]))
        .collect()
}

/// Closest point on a polyline to a query point.
pub struct ClosestPoint {
    pub point: Point<f64>,
    pub distance_m: f64,
    /// Index of the vertex starting the segment the closest point
    /// lies on.
    pub segment: usize,
}

/// Scan every segment of the polyline and keep the nearest projection.
/// Projection happens in a local equirectangular frame around the
/// query point; distances are haversine.
pub fn closest_point_on_polyline(p: Point<f64>, shape: &[Point<f64>]) -> Option<ClosestPoint> {
    if shape.is_empty() {
        return None;
    }
    if shape.len() == 1 {
        return Some(ClosestPoint {
            point: shape[0],
            distance_m: p.haversine_distance(&shape[0]),
            segment: 0,
        });
    }

    let m_per_deg_lat = 111_132.0;
    let m_per_deg_lon = 111_132.0 * p.y().to_radians().cos();
    let to_local = |q: &Point<f64>| -> (f64, f64) {
        ((q.x() - p.x()) * m_per_deg_lon, (q.y() - p.y()) * m_per_deg_lat)
    };

    let mut best: Option<ClosestPoint> = None;
    for i in 0..shape.len() - 1 {
        let (ax, ay) = to_local(&shape[i]);
        let (bx, by) = to_local(&shape[i + 1]);
        let (dx, dy) = (bx - ax, by - ay);
        let seg_len_sq = dx * dx + dy * dy;
        let t = if seg_len_sq > 0.0 {
            (-(ax * dx + ay * dy) / seg_len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let candidate = Point::new(
            shape[i].x() + (shape[i + 1].x() - shape[i].x()) * t,
            shape[i].y() + (shape[i + 1].y() - shape[i].y()) * t,
        );
        let dist = p.haversine_distance(&candidate);
        if best.as_ref().map(|b| dist < b.distance_m).unwrap_or(true) {
            best = Some(ClosestPoint {
                point: candidate,
                distance_m: dist,
                segment: i,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polyline_length() {
        // Two points ~111 km apart along a meridian.
        let shape = vec![Point::new(0.0, 0.0), Point::new(0.0, 1.0)];
        let len = polyline_length_m(&shape);
        assert!((len - 111_000.0).abs() < 1_000.0, "len = {}", len);
    }

    #[test]
    fn test_coords_roundtrip() {
        let shape = vec![Point::new(-118.0, 34.0), Point::new(-118.1, 34.1)];
        assert_eq!(coords_to_shape(&shape_to_coords(&shape)), shape);
    }

    #[test]
    fn test_closest_point_mid_segment() {
        let shape = vec![Point::new(0.0, 0.0), Point::new(0.01, 0.0)];
        let p = Point::new(0.005, 0.001);
        let closest = closest_point_on_polyline(p, &shape).unwrap();
        assert_eq!(closest.segment, 0);
        assert!((closest.point.x() - 0.005).abs() < 1e-9);
        assert!(closest.point.y().abs() < 1e-9);
    }

    #[test]
    fn test_closest_point_clamps_to_vertex() {
        let shape = vec![Point::new(0.0, 0.0), Point::new(0.01, 0.0)];
        let p = Point::new(-0.005, 0.0);
        let closest = closest_point_on_polyline(p, &shape).unwrap();
        assert!((closest.point.x() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_closest_point_picks_right_segment() {
        let shape = vec![
            Point::new(0.0, 0.0),
            Point::new(0.01, 0.0),
            Point::new(0.01, 0.01),
        ];
        let p = Point::new(0.0102, 0.005);
        let closest = closest_point_on_polyline(p, &shape).unwrap();
        assert_eq!(closest.segment, 1);
    }
}
