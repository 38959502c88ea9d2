//! Camera helpers
//!
//! View and projection matrices are derived from camera nodes in the scene
//! graph; the camera looks down its local -Z axis.

use trellis_core::{NodeKey, SceneGraph, Value};
use trellis_math::{mat4, Mat4, Quat, Vec3};

/// World-to-view matrix of a node
pub fn view_matrix(graph: &SceneGraph, camera: NodeKey) -> Option<Mat4> {
    graph.get(camera)?;
    mat4::inverse(&graph.world_matrix(camera))
}

/// Projection * view for a camera node
///
/// Returns `None` if the node is missing or is not a camera.
pub fn view_projection(graph: &SceneGraph, camera: NodeKey) -> Option<Mat4> {
    let projection = graph.get(camera)?.camera_data()?.projection_matrix();
    Some(mat4::mul(projection, view_matrix(graph, camera)?))
}

/// Project a world-space point to normalized device coordinates
pub fn project(graph: &SceneGraph, camera: NodeKey, point: Vec3) -> Option<Vec3> {
    let m = view_projection(graph, camera)?;
    Some(mat4::project_point(&m, point))
}

/// Rotation that points local -Z from `eye` toward `target`
pub fn look_rotation(eye: Vec3, target: Vec3, up: Vec3) -> Quat {
    let back = (eye - target).normalized();
    if back.length_squared() < 1e-12 {
        return Quat::IDENTITY;
    }
    let mut right = up.cross(back);
    if right.length_squared() < 1e-12 {
        // `up` is parallel to the view direction
        right = Vec3::X.cross(back);
    }
    let right = right.normalized();
    let up = back.cross(right);

    // Rotation matrix columns are (right, up, back)
    let (m00, m01, m02) = (right.x, up.x, back.x);
    let (m10, m11, m12) = (right.y, up.y, back.y);
    let (m20, m21, m22) = (right.z, up.z, back.z);
    let trace = m00 + m11 + m22;

    let q = if trace > 0.0 {
        let s = 0.5 / (trace + 1.0).sqrt();
        Quat::new((m21 - m12) * s, (m02 - m20) * s, (m10 - m01) * s, 0.25 / s)
    } else if m00 > m11 && m00 > m22 {
        let s = 2.0 * (1.0 + m00 - m11 - m22).sqrt();
        Quat::new(0.25 * s, (m01 + m10) / s, (m02 + m20) / s, (m21 - m12) / s)
    } else if m11 > m22 {
        let s = 2.0 * (1.0 + m11 - m00 - m22).sqrt();
        Quat::new((m01 + m10) / s, 0.25 * s, (m12 + m21) / s, (m02 - m20) / s)
    } else {
        let s = 2.0 * (1.0 + m22 - m00 - m11).sqrt();
        Quat::new((m02 + m20) / s, (m12 + m21) / s, 0.25 * s, (m10 - m01) / s)
    };
    q.normalize()
}

/// Turn `node` to face `target` (world space)
///
/// Returns whether the node's rotation changed.
pub fn look_at(graph: &mut SceneGraph, node: NodeKey, target: Vec3) -> bool {
    if !graph.contains(node) {
        return false;
    }
    let eye = graph.world_position(node);
    let q = look_rotation(eye, target, Vec3::Y);
    let value = Value::List(q.to_array().iter().map(|c| Value::Number(*c as f64)).collect());
    graph.set_prop(node, "quaternion", value).unwrap_or(false)
}
