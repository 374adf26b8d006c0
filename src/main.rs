#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::perf)]
#![deny(clippy::style)]

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use colored::Colorize;
use conduct_runtime::{
    consts::VERSION, logging::init_log_global, prelude::*, registry,
};
use mimalloc::MiMalloc;
use serde::Deserialize;
use tracing::*;

#[global_allocator]
static GLOBAL_ALLOCATOR: MiMalloc = MiMalloc;

#[derive(Default)]
struct Scene;
impl Behavior for Scene {
    fn on_awake(&self, ctx: &UnitContext<'_>) {
        // The scene always carries a player.
        match ctx.attach("Player") {
            Ok(trigger) => {
                if let Err(e) = trigger.activate() {
                    error!("Could not attach player: {e}");
                }
            }
            Err(e) => error!("Could not attach player: {e}"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Transform {
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
}
impl Behavior for Transform {}

#[derive(Default)]
struct Body {
    ticks: AtomicU32,
}
impl Behavior for Body {
    fn update(&self, _ctx: &UnitContext<'_>) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }
}

struct Camera {
    zoom: f32,
    target: Arc<Unit>,
}
impl Behavior for Camera {}

fn register_types(registry: &Registry) -> NResult {
    registry.register(TypeDef::of::<Scene>("Scene"))?;
    registry.register(TypeDef::new("Transform", |deps| {
        Ok(Box::new(deps.props(0)?.parse::<Transform>()?))
    })
    .depends_on([PROPS]))?;
    registry.register(TypeDef::of::<Body>("Body").requires_child("Transform"))?;
    registry.register(TypeDef::of::<Body>("Player").extends("Body"))?;
    registry.register(
        TypeDef::new("Camera", |deps| {
            let zoom = deps.props(0)?.get_as::<f32>("zoom").unwrap_or(1.0);
            Ok(Box::new(Camera {
                zoom,
                target: deps.unit(1)?,
            }))
        })
        .depends_on([PROPS, "Transform"]),
    )?;
    Ok(())
}

fn print_tree(manager: &Manager, unit: &Arc<Unit>, depth: usize) {
    let marker = if unit.is_active() {
        "●".green()
    } else {
        "○".red()
    };
    println!("{}{} {}", "  ".repeat(depth), marker, unit.id());
    for child in manager.children(unit.id().as_str()) {
        print_tree(manager, &child, depth + 1);
    }
}

pub fn main() -> NResult {
    let config = RuntimeConfig::from_env();
    init_log_global(&config);
    info!("Starting conduct {}", VERSION);

    register_types(&registry::global())?;
    let manager = Manager::builder().config(config).build();

    let scene = manager.init_root()?;
    let player = manager
        .get("Player", scene.id().as_str())
        .ok_or_else(|| RuntimeError::UnknownUnit {
            id: "Player".into(),
        })?;

    // Camera first: it waits for the transform it follows.
    let camera = manager.attach("Camera", player.id().as_str())?;
    camera.fire_with(Props::new().with("zoom", 2.5))?;
    info!(pending = ?manager.pending(player.id().as_str()), "Camera attached");

    manager
        .attach("Transform", player.id().as_str())?
        .fire_with(Props::new().with("x", 4.0).with("y", -1.0))?;

    if let Some(cam) = manager.get("Camera", player.id().as_str()) {
        if let Some(camera) = cam.behavior::<Camera>() {
            let target = camera.target.behavior::<Transform>();
            info!(
                zoom = camera.zoom,
                x = target.map(|t| t.x),
                y = target.map(|t| t.y),
                "Camera follows {}",
                camera.target.id()
            );
        }
    }

    for unit in manager.children(player.id().as_str()) {
        unit.update(&manager);
    }
    player.update(&manager);

    println!("{}", "Unit tree".cyan().bold());
    print_tree(&manager, &scene, 0);

    // The player requires its transform, so both go.
    if let Some(transform) = manager.get("Transform", player.id().as_str()) {
        manager.destroy(transform.id().as_str())?;
    }
    println!("{}", "After destroying the transform".cyan().bold());
    print_tree(&manager, &scene, 0);

    info!("{}", "Goodbye!".cyan().bold());
    Ok(())
}
