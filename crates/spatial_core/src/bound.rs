//! Bounding volumes: axis-aligned boxes and spheres.
//!
//! Containment and touch tests are strict (a point on the boundary is
//! outside), matching how view volumes are queried by the world.

use glam::DVec3;

/// A volume the BVH can merge and cost. `surface` is the heuristic the
/// branch-and-bound sibling search minimizes; it only needs to be
/// monotonic under `union`, not a true surface area.
pub trait Bound: Copy {
    fn union(self, other: Self) -> Self;
    fn surface(self) -> f64;
    fn contains(self, point: DVec3) -> bool;
    fn touches(self, other: Self) -> bool;
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Cube of half-extent `half` centered on `center`.
    pub fn cube(center: DVec3, half: f64) -> Self {
        Self {
            min: center - DVec3::splat(half),
            max: center + DVec3::splat(half),
        }
    }
}

impl Bound for Aabb {
    fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    fn surface(self) -> f64 {
        let d = self.max - self.min;
        (d.x + d.y + d.z) * 2.0
    }

    fn contains(self, point: DVec3) -> bool {
        self.min.cmplt(point).all() && self.max.cmpgt(point).all()
    }

    fn touches(self, other: Self) -> bool {
        self.min.cmplt(other.max).all() && other.min.cmplt(self.max).all()
    }
}

/// Bounding sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: DVec3,
    pub radius: f64,
}

impl Sphere {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }
}

impl Bound for Sphere {
    fn union(self, other: Self) -> Self {
        let d = (other.center - self.center).length();
        // One sphere already swallowing the other stays the union.
        if d + other.radius <= self.radius {
            return self;
        }
        if d + self.radius <= other.radius {
            return other;
        }
        let radius = (d + self.radius + other.radius) / 2.0;
        let t = (radius - self.radius) / d;
        Sphere {
            center: self.center.lerp(other.center, t),
            radius,
        }
    }

    fn surface(self) -> f64 {
        std::f64::consts::TAU * self.radius
    }

    fn contains(self, point: DVec3) -> bool {
        (self.center - point).length() < self.radius
    }

    fn touches(self, other: Self) -> bool {
        (self.center - other.center).length() < self.radius + other.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn aabb(min: [f64; 3], max: [f64; 3]) -> Aabb {
        Aabb::new(DVec3::from(min), DVec3::from(max))
    }

    #[test]
    fn aabb_union_covers_both() {
        let a = aabb([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = aabb([2.0, -1.0, 0.5], [3.0, 0.5, 2.0]);
        let u = a.union(b);
        assert_eq!(u.min, DVec3::new(0.0, -1.0, 0.0));
        assert_eq!(u.max, DVec3::new(3.0, 1.0, 2.0));
    }

    #[test]
    fn aabb_contains_is_strict() {
        let a = aabb([0.0, 0.0, 0.0], [2.0, 2.0, 2.0]);
        assert!(a.contains(DVec3::new(1.0, 1.0, 1.0)));
        assert!(!a.contains(DVec3::new(2.0, 1.0, 1.0)));
        assert!(!a.contains(DVec3::new(1.0, 0.0, 1.0)));
    }

    #[test]
    fn aabb_touch_excludes_shared_face() {
        let a = aabb([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = aabb([1.0, 0.0, 0.0], [2.0, 1.0, 1.0]);
        let c = aabb([0.5, 0.5, 0.5], [3.0, 3.0, 3.0]);
        assert!(!a.touches(b));
        assert!(a.touches(c));
        assert!(c.touches(a));
    }

    #[test]
    fn sphere_union_contains_both() {
        let a = Sphere::new(DVec3::ZERO, 1.0);
        let b = Sphere::new(DVec3::new(4.0, 0.0, 0.0), 2.0);
        let u = a.union(b);
        assert_abs_diff_eq!(u.radius, 3.5, epsilon = 1e-12);
        // Extremes of both inputs sit inside (strict test needs an epsilon).
        assert!(u.contains(DVec3::new(-0.999, 0.0, 0.0)));
        assert!(u.contains(DVec3::new(5.999, 0.0, 0.0)));
    }

    #[test]
    fn sphere_union_of_nested_is_the_outer() {
        let big = Sphere::new(DVec3::ZERO, 5.0);
        let small = Sphere::new(DVec3::new(1.0, 0.0, 0.0), 1.0);
        assert_eq!(big.union(small), big);
        assert_eq!(small.union(big), big);
    }
}
