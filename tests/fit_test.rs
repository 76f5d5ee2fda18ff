use approx::assert_relative_eq;
use cgmath::{Deg, Point3, Rad};
use meshview::{
    data_structures::bounds::BoundingVolume,
    fit::{DEFAULT_PADDING, MIN_DISTANCE, fit},
};

fn sphere(radius: f32) -> BoundingVolume {
    BoundingVolume::from_points(&[
        Point3::new(-radius, 0.0, 0.0),
        Point3::new(radius, 0.0, 0.0),
    ])
}

#[test]
fn unit_cube_at_sixty_degrees() {
    let cube = BoundingVolume::from_points(&[
        Point3::new(-1.0, -1.0, -1.0),
        Point3::new(1.0, 1.0, 1.0),
    ]);
    let pose = fit(&cube, Deg(60.0).into(), DEFAULT_PADDING);
    assert_relative_eq!(pose.distance, 4.1569, epsilon = 1e-3);
    assert_eq!(pose.look_at, Point3::new(0.0, 0.0, 0.0));
    assert_relative_eq!(pose.position.y, pose.distance * 0.5);
    assert_relative_eq!(pose.position.z, pose.distance);
}

#[test]
fn distance_grows_with_radius() {
    let fov: Rad<f32> = Deg(45.0).into();
    let mut last = 0.0;
    for radius in [0.001, 0.1, 1.0, 10.0, 1000.0] {
        let pose = fit(&sphere(radius), fov, DEFAULT_PADDING);
        assert!(pose.distance.is_finite());
        assert!(pose.distance > last, "radius {radius}");
        last = pose.distance;
    }
}

#[test]
fn distance_shrinks_with_field_of_view() {
    let volume = sphere(2.0);
    let mut last = f32::INFINITY;
    for degrees in [1.0, 10.0, 45.0, 90.0, 150.0, 179.0] {
        let pose = fit(&volume, Deg(degrees).into(), DEFAULT_PADDING);
        assert!(pose.distance.is_finite());
        assert!(pose.distance < last, "fov {degrees}");
        last = pose.distance;
    }
}

#[test]
fn single_point_uses_minimum_distance() {
    let point = Point3::new(3.0, -2.0, 5.0);
    let pose = fit(&BoundingVolume::from_points(&[point]), Deg(60.0).into(), DEFAULT_PADDING);
    assert_eq!(pose.distance, MIN_DISTANCE);
    assert_eq!(pose.look_at, point);
    assert!(pose.position.x.is_finite() && pose.position.y.is_finite() && pose.position.z.is_finite());
}

#[test]
fn framing_is_relative_to_the_center() {
    let offset = BoundingVolume::from_points(&[
        Point3::new(9.0, 9.0, 9.0),
        Point3::new(11.0, 11.0, 11.0),
    ]);
    let pose = fit(&offset, Deg(60.0).into(), DEFAULT_PADDING);
    assert_eq!(pose.look_at, Point3::new(10.0, 10.0, 10.0));
    assert_relative_eq!(pose.position.x, 10.0);
    assert_relative_eq!(pose.position.z - 10.0, pose.distance);
}
