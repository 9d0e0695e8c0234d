use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy::sprite::{MaterialMesh2dBundle, Mesh2dHandle};
use bevy::math::primitives::Circle;

use crate::simulation::scenario::Scenario;

#[derive(Component)]
struct BodyIndex(pub usize);

pub fn run_2d(scenario: Scenario) {
    log::info!("run_2d: starting Bevy 2D viewer with {} bodies", scenario.tree.len());

    App::new()
        .insert_resource(scenario)
        // logging goes through env_logger, set up in main
        .add_plugins(DefaultPlugins.build().disable::<LogPlugin>())
        .add_systems(Startup, setup_bodies_system)
        .add_systems(Update, (physics_step_system, sync_transforms_system, tree_overlay_system).chain())
        .run();
}

fn setup_bodies_system(mut commands: Commands, scenario: Res<Scenario>, mut meshes: ResMut<Assets<Mesh>>, mut materials: ResMut<Assets<ColorMaterial>>) {
    // 2D camera
    commands.spawn(Camera2dBundle::default());

    let scale = scenario.render.scale;
    let mesh = Mesh2dHandle(meshes.add(Circle::new(scenario.render.body_radius)));
    let material = materials.add(ColorMaterial::from(Color::srgb(1.0, 0.3, 0.2)));

    for snap in scenario.snapshot() {
        commands.spawn((
            MaterialMesh2dBundle {
                mesh: mesh.clone(),
                material: material.clone(),
                transform: Transform::from_xyz(snap.position.x as f32 * scale, snap.position.y as f32 * scale, 0.0),
                ..Default::default()
            },
            BodyIndex(snap.id),
        ));
    }
}

fn physics_step_system(time: Res<Time>, mut scenario: ResMut<Scenario>) {
    let dt = scenario.parameters.step_for_frame(time.delta_seconds_f64());
    if dt > 0.0 {
        scenario.step(dt);
    }
}

fn sync_transforms_system(scenario: Res<Scenario>, mut query: Query<(&BodyIndex, &mut Transform, &mut Visibility)>) {
    let scale = scenario.render.scale;
    for (BodyIndex(i), mut transform, mut visibility) in &mut query {
        if let Some(b) = scenario.system.bodies.get(*i) {
            transform.translation.x = (b.position.x as f32) * scale;
            transform.translation.y = (b.position.y as f32) * scale;
        }
        if scenario.dropped.contains(i) {
            *visibility = Visibility::Hidden;
        }
    }
}

fn tree_overlay_system(scenario: Res<Scenario>, mut gizmos: Gizmos) {
    if !scenario.render.render_tree_overlay {
        return;
    }
    let scale = scenario.render.scale;
    for region in scenario.region_geometry() {
        let center = region.center();
        gizmos.rect_2d(
            Vec2::new(center.x as f32, center.y as f32) * scale,
            0.0,
            Vec2::new(region.width() as f32, region.height() as f32) * scale,
            Color::srgba(1.0, 1.0, 1.0, 0.25),
        );
    }
}
