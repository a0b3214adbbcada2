use std::thread;
use std::time::Duration;

use glam::Vec3;
use rstest::rstest;

use probe_arena::assets::arena::build_probe_arena;
use probe_arena::capture::{CaptureError, CaptureResult, CubeCamera, CubeFace, CubeRenderTarget};
use probe_arena::probe::{BakeState, ProbeError};
use probe_arena::render::Bvh;
use probe_arena::scene::{Layers, Transform};
use probe_arena::{
    FailurePolicy, LightProbeGroup, LoadingManager, ProbeGroupOptions, ProbeVisualSync, Scene,
    SceneCapture, SoftwareRenderer,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Records every capture position and fills the target with a flat color
#[derive(Default)]
struct RecordingCapture {
    positions: Vec<Vec3>,
    fail_at: Option<usize>,
}

impl RecordingCapture {
    fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Default::default()
        }
    }
}

impl SceneCapture for RecordingCapture {
    fn capture(
        &mut self,
        _scene: &Scene,
        camera: &CubeCamera,
        target: &mut CubeRenderTarget,
    ) -> CaptureResult<()> {
        let index = self.positions.len();
        self.positions.push(camera.position);
        if self.fail_at == Some(index) {
            return Err(CaptureError::Renderer(format!("capture {index} failed")));
        }
        target.clear(Vec3::splat(0.5));
        Ok(())
    }
}

fn options() -> ProbeGroupOptions {
    ProbeGroupOptions::default().with_capture_resolution(4)
}

fn attached(x: u32, y: u32, z: u32, spacing: f32, options: ProbeGroupOptions) -> (Scene, LightProbeGroup) {
    let mut scene = Scene::new();
    let mut group = LightProbeGroup::new(x, y, z, spacing, options).unwrap();
    group.attach(&mut scene, None, Transform::default()).unwrap();
    (scene, group)
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

#[test]
fn two_by_one_by_two_lattice_is_centered_x_major() {
    let group = LightProbeGroup::new(2, 1, 2, 4.0, options()).unwrap();
    let positions: Vec<Vec3> = group.probes().iter().map(|p| p.position()).collect();
    assert_eq!(
        positions,
        vec![
            Vec3::new(-2.0, 0.0, -2.0),
            Vec3::new(-2.0, 0.0, 2.0),
            Vec3::new(2.0, 0.0, -2.0),
            Vec3::new(2.0, 0.0, 2.0),
        ]
    );
    assert_eq!(group.dimensions(), Vec3::new(4.0, 0.0, 4.0));
}

#[test]
fn single_probe_sits_at_origin() {
    let group = LightProbeGroup::new(1, 1, 1, 10.0, options()).unwrap();
    assert_eq!(group.len(), 1);
    assert_eq!(group.probes()[0].position(), Vec3::ZERO);
    assert_eq!(group.dimensions(), Vec3::ZERO);
}

#[rstest]
#[case(3, 1, 3, 4.0)]
#[case(2, 2, 2, 1.5)]
#[case(5, 1, 1, 0.25)]
#[case(4, 3, 2, 2.0)]
fn lattice_count_and_centroid(#[case] x: u32, #[case] y: u32, #[case] z: u32, #[case] spacing: f32) {
    let group = LightProbeGroup::new(x, y, z, spacing, options()).unwrap();
    assert_eq!(group.len(), (x * y * z) as usize);

    let centroid = group
        .probes()
        .iter()
        .fold(Vec3::ZERO, |sum, p| sum + p.position())
        / group.len() as f32;
    assert!(centroid.length() < 1e-4, "centroid {centroid}");

    let expected = (Vec3::new(x as f32, y as f32, z as f32) - Vec3::ONE) * spacing;
    assert!((group.dimensions() - expected).length() < 1e-5);
}

#[rstest]
#[case(0, 1, 1, 1.0)]
#[case(1, 0, 1, 1.0)]
#[case(1, 1, 0, 1.0)]
#[case(2, 2, 2, 0.0)]
#[case(2, 2, 2, -1.0)]
#[case(2, 2, 2, f32::NAN)]
fn invalid_lattices_are_rejected(#[case] x: u32, #[case] y: u32, #[case] z: u32, #[case] spacing: f32) {
    assert!(matches!(
        LightProbeGroup::new(x, y, z, spacing, options()),
        Err(ProbeError::InvalidGrid(_))
    ));
}

// ---------------------------------------------------------------------------
// Baking
// ---------------------------------------------------------------------------

#[test]
fn one_capture_per_probe_in_order_at_world_positions() {
    let mut scene = Scene::new();
    let parent = scene.add_node(
        "Parent",
        Transform::from_position(Vec3::new(10.0, 0.0, -3.0)),
        None,
    );
    let mut group = LightProbeGroup::new(2, 1, 2, 4.0, options()).unwrap();
    group
        .attach(
            &mut scene,
            Some(parent),
            Transform::from_position(Vec3::new(0.0, 2.0, 0.0)),
        )
        .unwrap();

    let mut capture = RecordingCapture::default();
    let report = group.bake(&mut capture, &scene).unwrap();

    assert!(report.is_complete());
    assert_eq!(report.baked, vec![0, 1, 2, 3]);
    let offset = Vec3::new(10.0, 2.0, -3.0);
    let expected: Vec<Vec3> = group.probes().iter().map(|p| p.position() + offset).collect();
    assert_eq!(capture.positions, expected);
    for (probe, position) in group.probes().iter().zip(&expected) {
        assert_eq!(probe.captured_at(), Some(*position));
    }
}

#[test]
fn baking_twice_rebakes_without_moving_probes() {
    let (scene, mut group) = attached(3, 1, 3, 4.0, options());
    let before: Vec<Vec3> = group.probes().iter().map(|p| p.position()).collect();

    let mut capture = RecordingCapture::default();
    group.bake(&mut capture, &scene).unwrap();
    group.bake(&mut capture, &scene).unwrap();

    assert_eq!(capture.positions.len(), 18);
    assert!(group.probes().iter().all(|p| p.bake_count() == 2));
    let after: Vec<Vec3> = group.probes().iter().map(|p| p.position()).collect();
    assert_eq!(before, after);
    assert_eq!(group.state(), BakeState::Baked);
}

#[test]
fn abort_policy_skips_remaining_probes() {
    let (scene, mut group) = attached(2, 1, 2, 1.0, options());
    let mut capture = RecordingCapture::failing_at(1);

    let report = group.bake(&mut capture, &scene).unwrap();

    assert_eq!(capture.positions.len(), 2);
    assert_eq!(report.baked, vec![0]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, 1);
    assert_eq!(report.skipped, vec![2, 3]);
    assert_eq!(group.state(), BakeState::Partial);
    assert!(matches!(
        report.ensure_complete(),
        Err(ProbeError::BakeIncomplete {
            failed: 1,
            skipped: 2,
            first_failure: Some(1),
        })
    ));
}

#[test]
fn continue_policy_bakes_past_a_failure() {
    let options = options().with_failure_policy(FailurePolicy::Continue);
    let (scene, mut group) = attached(2, 1, 2, 1.0, options);
    let mut capture = RecordingCapture::failing_at(1);

    let mut progress = Vec::new();
    let report = group
        .bake_with(
            &mut capture,
            &probe_arena::probe::ShProjector::new(),
            &scene,
            |p| progress.push((p.index, p.completed, p.total, p.succeeded)),
        )
        .unwrap();

    assert_eq!(capture.positions.len(), 4);
    assert_eq!(report.baked, vec![0, 2, 3]);
    assert!(report.skipped.is_empty());
    assert_eq!(
        progress,
        vec![(0, 1, 4, true), (1, 2, 4, false), (2, 3, 4, true), (3, 4, 4, true)]
    );
    assert_eq!(group.state(), BakeState::Partial);
    assert!(!group.probes()[1].is_baked());
    assert!(report.ensure_complete().is_err());
}

#[test]
fn detached_group_cannot_bake() {
    let scene = Scene::new();
    let mut group = LightProbeGroup::new(1, 1, 1, 1.0, options()).unwrap();
    let mut capture = RecordingCapture::default();
    assert!(matches!(
        group.bake(&mut capture, &scene),
        Err(ProbeError::NotAttached)
    ));
    assert!(capture.positions.is_empty());
    assert_eq!(group.state(), BakeState::Unbaked);
}

#[test]
fn bake_when_loaded_waits_for_outstanding_loads() {
    let (scene, mut group) = attached(1, 1, 2, 1.0, options());
    let manager = LoadingManager::new();
    let ticket = manager.begin("slow-model");

    let worker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        ticket.complete();
    });

    let mut capture = RecordingCapture::default();
    let report = group.bake_when_loaded(&manager, &mut capture, &scene).unwrap();
    worker.join().unwrap();

    assert!(manager.is_loaded());
    assert_eq!(manager.summary().loaded, vec!["slow-model".to_string()]);
    assert!(report.is_complete());
    assert_eq!(capture.positions.len(), 2);
}

// ---------------------------------------------------------------------------
// Renderer integration
// ---------------------------------------------------------------------------

#[test]
fn probe_markers_stay_out_of_captures() {
    let mut scene = Scene::new();
    build_probe_arena(&mut scene);
    let background = Vec3::new(0.2, 0.3, 0.4);
    scene.set_background(background);

    let mut group = LightProbeGroup::new(1, 1, 1, 1.0, options().with_debug_visuals(true)).unwrap();
    group
        .attach(&mut scene, None, Transform::from_position(Vec3::new(0.0, 4.0, 0.0)))
        .unwrap();
    ProbeVisualSync::new().update(&group, &mut scene);

    let main = Bvh::from_scene(&scene, Layers::MAIN);
    let all = Bvh::from_scene(&scene, Layers::ALL);
    assert!(all.len() > main.len());

    // the marker encloses the capture point, so any marker hit would show up here
    let mut renderer = SoftwareRenderer::default();
    let report = group.bake(&mut renderer, &scene).unwrap();
    assert!(report.is_complete());
    for texel in group.render_target().face(CubeFace::PositiveY) {
        assert!((*texel - background).length() < 1e-5, "{texel}");
    }
}

#[test]
fn arena_bake_lights_probes_from_below() {
    let mut scene = Scene::new();
    build_probe_arena(&mut scene);
    scene.set_background(Vec3::ZERO);

    let (x, y, z) = (2, 1, 2);
    let mut group = LightProbeGroup::new(x, y, z, 4.0, options()).unwrap();
    group
        .attach(&mut scene, None, Transform::from_position(Vec3::new(0.0, 2.0, 0.0)))
        .unwrap();

    let mut renderer = SoftwareRenderer::default();
    let report = group.bake(&mut renderer, &scene).unwrap();
    assert!(report.is_complete());
    assert_eq!(renderer.stats().captures, 4);

    // sunlit floor below, black sky above
    for probe in group.probes() {
        let up = probe.sh().irradiance_at(Vec3::Y);
        let down = probe.sh().irradiance_at(Vec3::NEG_Y);
        assert!(down.y > up.y, "down {down} up {up}");
        assert!(down.is_finite() && down.y > 0.0);
    }
    assert!(group
        .irradiance_at(Vec3::new(5.0, 0.0, 5.0), Vec3::Y)
        .is_some());
}
