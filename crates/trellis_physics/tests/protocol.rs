//! Wire format checks for worker messages

use trellis_math::Vec3;
use trellis_physics::{
    BodyId, BodyProps, BodyShape, BodyType, CollisionLayer, PhysicsConfig, RayId, RayMode, RayOptions,
    WorkerEvent, WorkerRequest,
};

#[test]
fn test_request_survives_ron() {
    let request = WorkerRequest::AddBody {
        id: BodyId(4),
        props: BodyProps::cuboid(Vec3::new(1.0, 0.5, 1.0))
            .with_type(BodyType::Kinematic)
            .with_position(Vec3::new(0.0, 2.0, 0.0)),
    };
    let text = ron::to_string(&request).unwrap();
    let back: WorkerRequest = ron::from_str(&text).unwrap();
    assert_eq!(back, request);
}

#[test]
fn test_body_props_fill_defaults() {
    let props: BodyProps = ron::from_str("(shape: Sphere(radius: 2.0), mass: 3.0)").unwrap();
    assert_eq!(props.shape, BodyShape::Sphere { radius: 2.0 });
    assert_eq!(props.mass, 3.0);
    assert_eq!(props.body_type, BodyType::Dynamic);
    assert_eq!(props.linear_damping, 0.01);
}

#[test]
fn test_ray_options_carry_mask() {
    let request = WorkerRequest::AddRay {
        id: RayId(2),
        options: RayOptions::new(Vec3::ZERO, Vec3::Z)
            .with_mode(RayMode::All)
            .with_mask(CollisionLayer::STATIC | CollisionLayer::DEFAULT),
    };
    let text = ron::to_string(&request).unwrap();
    assert_eq!(ron::from_str::<WorkerRequest>(&text).unwrap(), request);
}

#[test]
fn test_positions_event_survives_ron() {
    let event = WorkerEvent::Positions {
        ids: vec![BodyId(1)],
        buffer: vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 1.0],
    };
    let text = ron::to_string(&event).unwrap();
    assert_eq!(ron::from_str::<WorkerEvent>(&text).unwrap(), event);
}

#[test]
fn test_config_defaults() {
    let config: PhysicsConfig = ron::from_str("(gravity: (x: 0.0, y: -20.0, z: 0.0))").unwrap();
    assert_eq!(config.gravity.y, -20.0);
    assert_eq!(config.max_sub_steps, 10);
}
