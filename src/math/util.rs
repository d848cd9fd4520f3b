use super::{Point2d, Vector2d};
use cgmath::prelude::*;
use std::f64::consts::PI;

/// Projects a point onto a local coordinate system.
///
/// # Parameters
/// * `point` - The point to project
/// * `origin` - The origin of the coordinate system
/// * `x_axis` - The basis vector pointing in the positive x-axis.
/// * `y_axis` - The basis vector pointing in the positive y-axis.
pub fn project_local(
    point: Point2d,
    origin: Point2d,
    x_axis: Vector2d,
    y_axis: Vector2d,
) -> Point2d {
    let point = point - origin;
    Point2d::new(point.dot(x_axis), point.dot(y_axis))
}

/// Rotates a vector 90 degrees anticlockwise.
pub fn rot90(vec: Vector2d) -> Vector2d {
    Vector2d::new(-vec.y, vec.x)
}

/// The unit vector pointing along `heading` radians.
pub fn heading_vector(heading: f64) -> Vector2d {
    Vector2d::new(heading.cos(), heading.sin())
}

/// Rotates `point` clockwise about `centre` by `angle` radians.
///
/// With `angle` set to a vehicle's heading, this expresses `point` in the
/// vehicle's frame: the longitudinal axis becomes the x-axis and the
/// lateral axis the y-axis, both still anchored at `centre`.
pub fn rotate_clockwise(point: Point2d, centre: Point2d, angle: f64) -> Point2d {
    let x_axis = heading_vector(angle);
    let local = project_local(point, centre, x_axis, rot90(x_axis));
    centre + local.to_vec()
}

/// Wraps an angle into the range (-π, π].
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.sin().atan2(angle.cos());
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}
