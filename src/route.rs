//! Cyclic waypoint route followed by AI drivers

use nalgebra::{Point3, Vector3};

/// World up axis (y-up, same convention as the physics world)
pub fn up() -> Vector3<f32> {
    Vector3::y()
}

/// Signed angle in degrees from `from` to `to`, both projected onto the plane
/// normal to `axis`. Positive when `to` lies clockwise of `from` seen from
/// above, i.e. to the right of a forward vector.
pub fn signed_angle_deg(from: &Vector3<f32>, to: &Vector3<f32>, axis: &Vector3<f32>) -> f32 {
    let axis = match axis.try_normalize(1e-6) {
        Some(a) => a,
        None => return 0.0,
    };

    let a = from - axis * from.dot(&axis);
    let b = to - axis * to.dot(&axis);
    if a.norm_squared() < 1e-12 || b.norm_squared() < 1e-12 {
        return 0.0;
    }

    let sin = b.cross(&a).dot(&axis);
    let cos = a.dot(&b);
    sin.atan2(cos).to_degrees()
}

#[derive(Debug, Clone, Default)]
pub struct WaypointRoute {
    points: Vec<Point3<f32>>,
}

impl WaypointRoute {
    pub fn new(points: Vec<Point3<f32>>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Point3<f32>> {
        self.points.get(index)
    }

    #[cfg(test)]
    pub fn points(&self) -> &[Point3<f32>] {
        &self.points
    }

    /// Index after `index`, wrapping past the last waypoint
    pub fn next_index(&self, index: usize) -> usize {
        if self.points.is_empty() {
            0
        } else {
            (index + 1) % self.points.len()
        }
    }

    /// Closest waypoint by straight-line distance
    pub fn nearest_index(&self, position: &Point3<f32>) -> Option<usize> {
        self.points
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                nalgebra::distance_squared(a, position)
                    .total_cmp(&nalgebra::distance_squared(b, position))
            })
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_angle_is_positive_to_the_right() {
        let forward = Vector3::new(0.0, 0.0, -1.0);
        let right = Vector3::new(1.0, 0.0, 0.0);
        let left = Vector3::new(-1.0, 0.0, 0.0);

        assert!((signed_angle_deg(&forward, &right, &up()) - 90.0).abs() < 1e-3);
        assert!((signed_angle_deg(&forward, &left, &up()) + 90.0).abs() < 1e-3);
        assert!(signed_angle_deg(&forward, &forward, &up()).abs() < 1e-3);
    }

    #[test]
    fn signed_angle_ignores_height_difference() {
        let forward = Vector3::new(0.0, 0.0, -1.0);
        let up_and_ahead = Vector3::new(0.0, 50.0, -1.0);
        assert!(signed_angle_deg(&forward, &up_and_ahead, &up()).abs() < 1e-3);
    }

    #[test]
    fn next_index_wraps() {
        let route = WaypointRoute::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 10.0),
        ]);
        assert_eq!(route.next_index(0), 1);
        assert_eq!(route.next_index(2), 0);
        assert_eq!(WaypointRoute::default().next_index(5), 0);
    }

    #[test]
    fn nearest_index_uses_euclidean_distance() {
        let route = WaypointRoute::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 10.0),
        ]);
        assert_eq!(route.nearest_index(&Point3::new(9.0, 0.0, 8.0)), Some(2));
        assert_eq!(route.nearest_index(&Point3::new(6.0, 0.0, 1.0)), Some(1));
        assert_eq!(WaypointRoute::default().nearest_index(&Point3::origin()), None);
    }
}
