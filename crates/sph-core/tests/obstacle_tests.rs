use glam::{Vec2, Vec3};
use proptest::prelude::*;
use sph_core::device::Device;
use sph_core::obstacle::{Aabb, ObstacleMesh, ObstacleSet};
use sph_core::space::{Dim2, Dim3};

/// A unit quad in the y = 0 plane, two triangles.
fn floor_quad(half: f32) -> ObstacleMesh<Dim3> {
    ObstacleMesh::new(
        vec![
            Vec3::new(-half, 0.0, -half),
            Vec3::new(half, 0.0, -half),
            Vec3::new(half, 0.0, half),
            Vec3::new(-half, 0.0, half),
        ],
        vec![0, 1, 2, 0, 2, 3],
    )
    .unwrap()
}

fn triangle_aabbs(vertices: &[Vec3], indices: &[u32]) -> Vec<Aabb<Vec3>> {
    indices
        .chunks(3)
        .map(|t| {
            Aabb::from_triangle([
                vertices[t[0] as usize],
                vertices[t[1] as usize],
                vertices[t[2] as usize],
            ])
        })
        .collect()
}

// ---------------------------------------------------------------------------
// AABB construction
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_aabbs_contain_their_vertices(
        coords in prop::collection::vec((-50.0f32..50.0, -50.0f32..50.0, -50.0f32..50.0), 3..40),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 3..60),
    ) {
        let vertices: Vec<Vec3> = coords.iter().map(|&(x, y, z)| Vec3::new(x, y, z)).collect();
        let whole = picks.len() / 3 * 3;
        let indices: Vec<u32> = picks[..whole]
            .iter()
            .map(|i| i.index(vertices.len()) as u32)
            .collect();
        let mesh = ObstacleMesh::<Dim3>::new(vertices, indices).unwrap();

        let mut device = Device::new();
        let mut set = ObstacleSet::new(&mut device, &mesh);
        prop_assert!(set.refresh(&mut device).unwrap());

        prop_assert_eq!(set.aabbs().len(), mesh.triangle_count());
        for (t, aabb) in set.aabbs().iter().enumerate() {
            for k in 0..3 {
                let v = mesh.vertices()[mesh.triangle_indices()[3 * t + k] as usize];
                prop_assert!(aabb.contains(v), "triangle {} aabb {:?} misses {:?}", t, aabb, v);
            }
        }
    }
}

#[test]
fn test_moved_vertices_leave_no_stale_aabbs() {
    let mut device = Device::new();
    let mesh = floor_quad(1.0);
    let mut set = ObstacleSet::new(&mut device, &mesh);
    set.refresh(&mut device).unwrap();

    let lifted = mesh.transformed(|v| v * 2.0 + Vec3::new(0.0, 3.0, 0.0));
    set.set_vertices(lifted.vertices()).unwrap();
    assert!(set.is_dirty());
    assert!(set.refresh(&mut device).unwrap());

    let expected = triangle_aabbs(lifted.vertices(), lifted.triangle_indices());
    assert_eq!(set.aabbs(), expected.as_slice());
}

#[test]
fn test_rebuild_only_when_dirty() {
    let mut device = Device::new();
    let mut set = ObstacleSet::new(&mut device, &floor_quad(1.0));
    assert!(set.is_dirty(), "a fresh upload has no aabbs yet");

    assert!(set.refresh(&mut device).unwrap());
    let submitted = device.submitted();
    assert!(!set.refresh(&mut device).unwrap());
    assert!(!set.refresh(&mut device).unwrap());
    assert_eq!(set.rebuilds(), 1);
    assert_eq!(device.submitted(), submitted, "clean refresh dispatches nothing");
}

#[test]
fn test_vertex_count_is_fixed() {
    let mut device = Device::new();
    let mut set = ObstacleSet::new(&mut device, &floor_quad(1.0));
    set.refresh(&mut device).unwrap();
    assert!(set.set_vertices(&[Vec3::ZERO; 3]).is_err());
    assert!(!set.is_dirty());
}

#[test]
fn test_refresh_on_lost_device_keeps_dirty() {
    let mut device = Device::new();
    let mut set = ObstacleSet::new(&mut device, &floor_quad(1.0));
    device.lose();
    assert!(set.refresh(&mut device).is_err());
    assert!(set.is_dirty());
    assert_eq!(set.rebuilds(), 0);
}

// ---------------------------------------------------------------------------
// Swept collision
// ---------------------------------------------------------------------------

#[test]
fn test_sweep_hits_floor_from_above() {
    let mut device = Device::new();
    let mut set = ObstacleSet::new(&mut device, &floor_quad(1.0));
    set.refresh(&mut device).unwrap();

    let hit = set
        .sweep(Vec3::new(0.2, 0.5, 0.3), Vec3::new(0.2, -0.5, 0.3), 0.01)
        .expect("segment crosses the quad");
    assert!((hit.distance - 0.5).abs() < 1e-5);
    assert_eq!(hit.normal, Vec3::Y);
    assert!((hit.position - Vec3::new(0.2, 0.01, 0.3)).length() < 1e-5);
}

#[test]
fn test_sweep_misses_beside_and_above() {
    let mut device = Device::new();
    let mut set = ObstacleSet::new(&mut device, &floor_quad(1.0));
    set.refresh(&mut device).unwrap();

    assert!(set
        .sweep(Vec3::new(3.0, 0.5, 0.0), Vec3::new(3.0, -0.5, 0.0), 0.01)
        .is_none());
    assert!(set
        .sweep(Vec3::new(0.0, 0.5, 0.0), Vec3::new(0.0, 0.2, 0.0), 0.01)
        .is_none());
}

#[test]
fn test_sweep_picks_nearest_of_stacked_floors() {
    let mut device = Device::new();
    let low = floor_quad(1.0);
    let high = low.transformed(|v| v + Vec3::new(0.0, 0.5, 0.0));
    let mut vertices = low.vertices().to_vec();
    vertices.extend_from_slice(high.vertices());
    let indices = vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7];
    let mesh = ObstacleMesh::<Dim3>::new(vertices, indices).unwrap();
    let mut set = ObstacleSet::new(&mut device, &mesh);
    set.refresh(&mut device).unwrap();

    let hit = set
        .sweep(Vec3::new(0.0, 1.0, 0.1), Vec3::new(0.0, -1.0, 0.1), 0.0)
        .unwrap();
    assert!((hit.position.y - 0.5).abs() < 1e-5, "expected upper floor, got {:?}", hit);
}

#[test]
fn test_planar_push_out_through_nearest_edge() {
    let mut device = Device::new();
    let wedge = ObstacleMesh::<Dim2>::new(
        vec![Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)],
        vec![0, 1, 2],
    )
    .unwrap();
    let mut set = ObstacleSet::new(&mut device, &wedge);
    set.refresh(&mut device).unwrap();

    let hit = set
        .sweep(Vec2::new(0.0, -0.5), Vec2::new(0.0, 0.05), 0.01)
        .expect("end point is inside the wedge");
    assert_eq!(hit.normal, Vec2::new(0.0, -1.0));
    assert!((hit.position - Vec2::new(0.0, -0.01)).length() < 1e-5);
}

#[test]
fn test_release_frees_every_buffer() {
    let mut device = Device::new();
    let set = ObstacleSet::new(&mut device, &floor_quad(1.0));
    assert_eq!(device.live_buffers(), 3);
    let mut idle = device.drain();
    set.release(&mut idle);
    drop(idle);
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(device.live_bytes(), 0);
}
