//! Per-frame sync of probe debug markers

use glam::Vec3;

use super::group::LightProbeGroup;
use crate::resources::Shading;
use crate::scene::Scene;

/// Keeps each probe marker's size and shading in step with its probe
///
/// The render loop calls [`ProbeVisualSync::update`] once per frame, after any
/// change to probe intensities or a bake, and before rendering.
#[derive(Debug, Default)]
pub struct ProbeVisualSync {
    synced: usize,
}

impl ProbeVisualSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of markers written by the last update
    pub fn synced(&self) -> usize {
        self.synced
    }

    pub fn update(&mut self, group: &LightProbeGroup, scene: &mut Scene) {
        self.synced = 0;
        for probe in group.probes() {
            let Some(visual) = probe.visual() else {
                continue;
            };
            let (Some(node), Some(material)) = (visual.node(), visual.material()) else {
                continue;
            };

            let scale = Vec3::splat(visual.size * probe.intensity);
            // node_mut invalidates cached geometry, so only touch changed markers
            let stale = scene
                .node(node)
                .is_some_and(|n| n.transform.scale != scale);
            if stale {
                if let Some(node) = scene.node_mut(node) {
                    node.transform.scale = scale;
                }
            }
            if let Some(material) = scene.material_mut(material) {
                material.shading = Shading::Irradiance {
                    sh: *probe.sh(),
                    intensity: probe.intensity,
                };
            }
            self.synced += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeGroupOptions;
    use crate::scene::Transform;

    #[test]
    fn markers_follow_probe_intensity() {
        let mut scene = Scene::new();
        let options = ProbeGroupOptions::default()
            .with_capture_resolution(2)
            .with_debug_visuals(true);
        let mut group = LightProbeGroup::new(2, 1, 1, 1.0, options).unwrap();
        group.attach(&mut scene, None, Transform::default()).unwrap();
        group.probe_mut(1).unwrap().intensity = 2.0;

        let mut sync = ProbeVisualSync::new();
        sync.update(&group, &mut scene);
        assert_eq!(sync.synced(), 2);

        let visual = group.probes()[1].visual().unwrap();
        let node = scene.node(visual.node().unwrap()).unwrap();
        assert!((node.transform.scale - Vec3::splat(0.4)).length() < 1e-6);
        match &scene.material(visual.material().unwrap()).unwrap().shading {
            Shading::Irradiance { intensity, .. } => assert_eq!(*intensity, 2.0),
            other => panic!("unexpected shading {other:?}"),
        }
    }
}
