//! Axis-aligned bounding boxes and the bounding sphere derived from them.

use cgmath::{EuclideanSpace, InnerSpace, MetricSpace, Point3, Vector3};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    /// An inverted box that any call to [`Aabb::extend`] will replace.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extend(&mut self, point: Point3<f32>) {
        self.min = Point3::new(
            self.min.x.min(point.x),
            self.min.y.min(point.y),
            self.min.z.min(point.z),
        );
        self.max = Point3::new(
            self.max.x.max(point.x),
            self.max.y.max(point.y),
            self.max.z.max(point.z),
        );
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        let mut union = *self;
        if !other.is_empty() {
            union.extend(other.min);
            union.extend(other.max);
        }
        union
    }

    pub fn center(&self) -> Point3<f32> {
        self.min.midpoint(self.max)
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn contains(&self, point: Point3<f32>) -> bool {
        point.x >= self.min.x
            && point.y >= self.min.y
            && point.z >= self.min.z
            && point.x <= self.max.x
            && point.y <= self.max.y
            && point.z <= self.max.z
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: Point3<f32>,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn contains(&self, point: Point3<f32>) -> bool {
        // Relative slack so large models don't fail on rounding
        let slack = 1e-5 * self.radius.max(1.0);
        self.center.distance(point) <= self.radius + slack
    }
}

/// Box plus derived sphere enclosing all drawable geometry of a container.
///
/// The sphere is centered on the box and its radius is the farthest distance
/// from that center to any enclosed point, so unlike a box-only fit it does
/// not depend on how the model happens to be oriented along the axes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingVolume {
    pub aabb: Aabb,
    pub sphere: BoundingSphere,
}

impl BoundingVolume {
    /// Degenerate volume used for empty geometry: a point at the origin.
    pub fn empty() -> Self {
        let origin = Point3::origin();
        Self {
            aabb: Aabb::new(origin, origin),
            sphere: BoundingSphere {
                center: origin,
                radius: 0.0,
            },
        }
    }

    pub fn from_points(points: &[Point3<f32>]) -> Self {
        let mut aabb = Aabb::empty();
        points
            .iter()
            .filter(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite())
            .for_each(|p| aabb.extend(*p));
        if aabb.is_empty() {
            return Self::empty();
        }
        let center = aabb.center();
        let radius = points
            .iter()
            .filter(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite())
            .map(|p| (*p - center).magnitude())
            .fold(0.0_f32, f32::max);
        Self {
            aabb,
            sphere: BoundingSphere { center, radius },
        }
    }

    pub fn center(&self) -> Point3<f32> {
        self.sphere.center
    }

    pub fn radius(&self) -> f32 {
        self.sphere.radius
    }

    pub fn contains(&self, point: Point3<f32>) -> bool {
        self.aabb.contains(point) && self.sphere.contains(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_corners() -> Vec<Point3<f32>> {
        let mut points = Vec::new();
        for x in [-1.0, 1.0] {
            for y in [-1.0, 1.0] {
                for z in [-1.0, 1.0] {
                    points.push(Point3::new(x, y, z));
                }
            }
        }
        points
    }

    #[test]
    fn cube_sphere_radius_is_half_diagonal() {
        let volume = BoundingVolume::from_points(&cube_corners());
        assert_eq!(volume.aabb.min, Point3::new(-1.0, -1.0, -1.0));
        assert_eq!(volume.aabb.max, Point3::new(1.0, 1.0, 1.0));
        assert_eq!(volume.center(), Point3::new(0.0, 0.0, 0.0));
        assert!((volume.radius() - 3.0_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn sphere_is_tighter_than_half_diagonal_for_sparse_points() {
        // A diamond: box is [-1,1]^3 but no point sits in a corner
        let points = [
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, -1.0),
        ];
        let volume = BoundingVolume::from_points(&points);
        assert!((volume.radius() - 1.0).abs() < 1e-6);
        assert!(points.iter().all(|p| volume.contains(*p)));
    }

    #[test]
    fn empty_points_give_degenerate_volume() {
        let volume = BoundingVolume::from_points(&[]);
        assert_eq!(volume, BoundingVolume::empty());
        assert_eq!(volume.radius(), 0.0);
    }

    #[test]
    fn single_point_has_zero_radius() {
        let volume = BoundingVolume::from_points(&[Point3::new(2.0, 3.0, 4.0)]);
        assert_eq!(volume.center(), Point3::new(2.0, 3.0, 4.0));
        assert_eq!(volume.radius(), 0.0);
    }

    #[test]
    fn non_finite_points_are_ignored() {
        let volume = BoundingVolume::from_points(&[
            Point3::new(f32::NAN, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(-1.0, -1.0, -1.0),
        ]);
        assert!(volume.radius().is_finite());
        assert_eq!(volume.center(), Point3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn union_ignores_empty_boxes() {
        let a = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        assert_eq!(a.union(&Aabb::empty()), a);
        let b = Aabb::new(Point3::new(2.0, 2.0, 2.0), Point3::new(3.0, 3.0, 3.0));
        let union = a.union(&b);
        assert_eq!(union.min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(union.max, Point3::new(3.0, 3.0, 3.0));
    }
}
