//! Exact shape tests used by the narrow phase.
//!
//! All tests work in fixed-point and return contact normals pointing from the
//! first shape towards the second. Boxes are oriented by the owning entity's
//! orientation, passed in as a precomputed unit direction (see
//! [`Vec2Fixed::from_angle`]).

use crate::components::Shape;
use crate::math::{fixed_sqrt, Fixed, Vec2Fixed};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec2Fixed,
    /// Maximum corner.
    pub max: Vec2Fixed,
}

impl Aabb {
    /// Box around a circle.
    #[must_use]
    pub fn around_circle(center: Vec2Fixed, radius: Fixed) -> Self {
        let r = Vec2Fixed::new(radius, radius);
        Self {
            min: center - r,
            max: center + r,
        }
    }

    /// Bounds of a shape placed at `position` with the given facing direction.
    #[must_use]
    pub fn of_shape(shape: &Shape, position: Vec2Fixed, direction: Vec2Fixed) -> Self {
        match *shape {
            Shape::Circle { radius } => Self::around_circle(position, radius),
            Shape::Rect { half_extents } => {
                let (c, s) = (direction.x.abs(), direction.y.abs());
                let extent = Vec2Fixed::new(
                    half_extents.x * c + half_extents.y * s,
                    half_extents.x * s + half_extents.y * c,
                );
                Self {
                    min: position - extent,
                    max: position + extent,
                }
            }
        }
    }

    /// Box covering a circle swept from `start` to `end`.
    #[must_use]
    pub fn swept_circle(start: Vec2Fixed, end: Vec2Fixed, radius: Fixed) -> Self {
        Self::around_circle(start, radius).union(&Self::around_circle(end, radius))
    }

    /// Smallest box containing both.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Overlap test, touching edges count as intersecting.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

/// Penetration between two overlapping shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    /// Unit normal from the first shape towards the second.
    pub normal: Vec2Fixed,
    /// Penetration depth along the normal (always positive).
    pub depth: Fixed,
}

impl Contact {
    fn flipped(self) -> Self {
        Self {
            normal: -self.normal,
            depth: self.depth,
        }
    }
}

/// A shape placed in the world.
#[derive(Debug, Clone, Copy)]
pub struct Placed<'a> {
    /// The shape in local coordinates.
    pub shape: &'a Shape,
    /// World position of the shape center.
    pub position: Vec2Fixed,
    /// Unit facing direction.
    pub direction: Vec2Fixed,
}

/// Overlap test between two placed shapes.
///
/// Returns `None` when the shapes are separated or merely touching.
#[must_use]
pub fn overlap(a: Placed<'_>, b: Placed<'_>) -> Option<Contact> {
    match (*a.shape, *b.shape) {
        (Shape::Circle { radius: ra }, Shape::Circle { radius: rb }) => {
            circle_circle(a.position, ra, b.position, rb)
        }
        (Shape::Circle { radius }, Shape::Rect { half_extents }) => {
            circle_box(a.position, radius, b.position, b.direction, half_extents)
        }
        (Shape::Rect { half_extents }, Shape::Circle { radius }) => {
            circle_box(b.position, radius, a.position, a.direction, half_extents)
                .map(Contact::flipped)
        }
        (Shape::Rect { half_extents: ha }, Shape::Rect { half_extents: hb }) => {
            box_box(a.position, a.direction, ha, b.position, b.direction, hb)
        }
    }
}

/// Circle vs circle.
#[must_use]
pub fn circle_circle(
    center_a: Vec2Fixed,
    radius_a: Fixed,
    center_b: Vec2Fixed,
    radius_b: Fixed,
) -> Option<Contact> {
    let delta = center_b - center_a;
    let reach = radius_a + radius_b;
    let dist_sq = delta.length_squared();
    if dist_sq >= reach.saturating_mul(reach) {
        return None;
    }
    let dist = fixed_sqrt(dist_sq);
    // Coincident centers: any axis separates them, pick +x.
    let normal = if dist == Fixed::ZERO {
        Vec2Fixed::new(Fixed::ONE, Fixed::ZERO)
    } else {
        Vec2Fixed::new(delta.x / dist, delta.y / dist)
    };
    Some(Contact {
        normal,
        depth: reach - dist,
    })
}

/// Circle vs oriented box. Normal points from the circle to the box.
#[must_use]
pub fn circle_box(
    center: Vec2Fixed,
    radius: Fixed,
    box_center: Vec2Fixed,
    box_direction: Vec2Fixed,
    half_extents: Vec2Fixed,
) -> Option<Contact> {
    let local = (center - box_center).unrotate(box_direction);
    let closest = Vec2Fixed::new(
        local.x.clamp(-half_extents.x, half_extents.x),
        local.y.clamp(-half_extents.y, half_extents.y),
    );

    // `outward` points from the box towards the circle, in box space.
    let (outward, depth) = if closest == local {
        // Center inside the box: push out along the shallowest face.
        let dx = half_extents.x - local.x.abs();
        let dy = half_extents.y - local.y.abs();
        if dx <= dy {
            let sign = if local.x < Fixed::ZERO { -Fixed::ONE } else { Fixed::ONE };
            (Vec2Fixed::new(sign, Fixed::ZERO), dx + radius)
        } else {
            let sign = if local.y < Fixed::ZERO { -Fixed::ONE } else { Fixed::ONE };
            (Vec2Fixed::new(Fixed::ZERO, sign), dy + radius)
        }
    } else {
        let diff = local - closest;
        let dist_sq = diff.length_squared();
        if dist_sq >= radius.saturating_mul(radius) {
            return None;
        }
        let dist = fixed_sqrt(dist_sq);
        (Vec2Fixed::new(diff.x / dist, diff.y / dist), radius - dist)
    };

    Some(Contact {
        normal: -outward.rotate(box_direction),
        depth,
    })
}

/// Oriented box vs oriented box using the separating axis theorem.
#[must_use]
pub fn box_box(
    center_a: Vec2Fixed,
    direction_a: Vec2Fixed,
    half_a: Vec2Fixed,
    center_b: Vec2Fixed,
    direction_b: Vec2Fixed,
    half_b: Vec2Fixed,
) -> Option<Contact> {
    let axes = [
        direction_a,
        direction_a.perp(),
        direction_b,
        direction_b.perp(),
    ];
    let delta = center_b - center_a;
    let project = |half: Vec2Fixed, direction: Vec2Fixed, axis: Vec2Fixed| {
        half.x * direction.dot(axis).abs() + half.y * direction.perp().dot(axis).abs()
    };

    let mut best: Option<Contact> = None;
    for axis in axes {
        let reach = project(half_a, direction_a, axis) + project(half_b, direction_b, axis);
        let distance = delta.dot(axis);
        let overlap = reach - distance.abs();
        if overlap <= Fixed::ZERO {
            return None;
        }
        if best.map_or(true, |c| overlap < c.depth) {
            let normal = if distance < Fixed::ZERO { -axis } else { axis };
            best = Some(Contact {
                normal,
                depth: overlap,
            });
        }
    }
    best
}

/// Earliest time of impact in `[0, 1]` of a circle moving from `start` to
/// `end` against a placed shape, or `None` if the path misses it.
#[must_use]
pub fn sweep_circle(start: Vec2Fixed, end: Vec2Fixed, radius: Fixed, target: Placed<'_>) -> Option<Fixed> {
    match *target.shape {
        Shape::Circle { radius: target_radius } => {
            sweep_against_circle(start, end, target.position, radius + target_radius)
        }
        Shape::Rect { half_extents } => sweep_against_box(
            start,
            end,
            target.position,
            target.direction,
            half_extents,
            radius,
        ),
    }
}

/// Segment vs circle of radius `reach` around `center`.
fn sweep_against_circle(
    start: Vec2Fixed,
    end: Vec2Fixed,
    center: Vec2Fixed,
    reach: Fixed,
) -> Option<Fixed> {
    let m = start - center;
    let d = end - start;
    let c = m.length_squared().saturating_sub(reach.saturating_mul(reach));
    if c <= Fixed::ZERO {
        return Some(Fixed::ZERO);
    }
    let a = d.length_squared();
    if a == Fixed::ZERO {
        return None;
    }
    let half_b = m.x.saturating_mul(d.x).saturating_add(m.y.saturating_mul(d.y));
    if half_b >= Fixed::ZERO {
        // Moving away from (or tangent to) the target.
        return None;
    }
    let discriminant = half_b
        .saturating_mul(half_b)
        .saturating_sub(a.saturating_mul(c));
    if discriminant < Fixed::ZERO {
        return None;
    }
    let t = (-half_b - fixed_sqrt(discriminant)).saturating_div(a);
    if t > Fixed::ONE {
        return None;
    }
    Some(t.max(Fixed::ZERO))
}

/// Circle of `radius` swept against an oriented box: the segment is tested
/// against the box grown by `radius` with rounded corners.
///
/// A slab test against the square-cornered inflation finds the entry point.
/// Entries beside a face are exact; entries in a corner square only count if
/// the path reaches that corner's disk.
fn sweep_against_box(
    start: Vec2Fixed,
    end: Vec2Fixed,
    box_center: Vec2Fixed,
    box_direction: Vec2Fixed,
    half_extents: Vec2Fixed,
    radius: Fixed,
) -> Option<Fixed> {
    let s = (start - box_center).unrotate(box_direction);
    let d = (end - start).unrotate(box_direction);

    let t = slab_entry(s, d, half_extents + Vec2Fixed::new(radius, radius))?;
    let entry = s + d.scale(t);
    if entry.x.abs() <= half_extents.x || entry.y.abs() <= half_extents.y {
        return Some(t);
    }
    let corner = Vec2Fixed::new(
        if entry.x < Fixed::ZERO { -half_extents.x } else { half_extents.x },
        if entry.y < Fixed::ZERO { -half_extents.y } else { half_extents.y },
    );
    sweep_against_circle(s, s + d, corner, radius)
}

/// Segment vs axis-aligned box centered on the origin.
fn slab_entry(s: Vec2Fixed, d: Vec2Fixed, half_extents: Vec2Fixed) -> Option<Fixed> {
    let mut t_enter = Fixed::ZERO;
    let mut t_exit = Fixed::ONE;
    for (origin, delta, half) in [(s.x, d.x, half_extents.x), (s.y, d.y, half_extents.y)] {
        if delta == Fixed::ZERO {
            if origin < -half || origin > half {
                return None;
            }
            continue;
        }
        let t1 = (-half - origin).saturating_div(delta);
        let t2 = (half - origin).saturating_div(delta);
        let (near, far) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
        t_enter = t_enter.max(near);
        t_exit = t_exit.min(far);
        if t_enter > t_exit {
            return None;
        }
    }
    Some(t_enter)
}
