use std::path::Path;
use std::sync::Arc;

use color_eyre::Result;
use log::{debug, info};
use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior, interval};

use race_server::config::ServerConfig;
use race_server::net::start_websocket_server;
use race_server::physics::PhysicsWorld;
use race_server::race_core::checkpoints::CheckpointSet;
use race_server::race_core::{Pos3, Race, Role, VehicleId};
use race_server::spawn::StartingGrid;
use race_server::state::{FrameOutbox, SharedGameState};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg_path = std::env::args().nth(1);
    let cfg = ServerConfig::load(cfg_path.as_deref().map(Path::new))?;

    info!("starting race server ({} Hz, {} AI)", cfg.tick_hz, cfg.ai_count);

    // -------------------------------
    // Track + race setup
    // -------------------------------
    let mut physics = PhysicsWorld::new(&cfg.track);
    let checkpoints = CheckpointSet::new(cfg.track.checkpoint_positions())?;

    // grid sits behind the last gate, facing the first one
    let start_line = checkpoints.positions().last().copied().unwrap_or_else(Pos3::origin);
    let first_gate = checkpoints.position(0).unwrap_or(start_line);
    let mut grid = StartingGrid::new(start_line, first_gate, cfg.grid.clone());

    let mut race = Race::new(&cfg.race, checkpoints, cfg.track.ai_route_points())?;

    let roster = std::iter::once((VehicleId(0), Role::Player, cfg.player_drive.resolve()))
        .chain((1..=cfg.ai_count as u32).map(|i| (VehicleId(i), Role::Ai, cfg.ai_drive.resolve())));
    for (id, role, drive) in roster {
        let slot = grid.allocate();
        race.register(id, role, drive)?;
        physics.spawn_vehicle(id, slot.pos(), slot.rot());
        debug!("{id} ({role:?}) on grid slot {} at {:?}", slot.index, slot.position);
    }
    race.validate(&physics)?;
    info!("{} cars on the grid, {} laps", grid.allocated(), cfg.race.total_laps);

    // -------------------------------
    // Network
    // -------------------------------
    let state = Arc::new(Mutex::new(SharedGameState::new()));
    let server = tokio::spawn(start_websocket_server(cfg.bind_addr.clone(), Arc::clone(&state)));

    let mut outbox = FrameOutbox::default();
    race.begin(&mut outbox);

    // -------------------------------
    // Fixed timestep loop
    // -------------------------------
    let dt = cfg.dt();
    let mut ticker = interval(Duration::from_secs_f32(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        if server.is_finished() {
            // bind failure or listener crash; surface it instead of racing blind
            return match server.await {
                Ok(res) => res,
                Err(e) => Err(e.into()),
            };
        }

        let controls = {
            let mut game = state.lock().await;
            let snapshot = game.controls.clone();
            game.controls.end_frame();
            snapshot
        };

        race.fixed_tick(&mut physics, &controls, dt);
        for (id, index) in physics.step(dt) {
            race.on_checkpoint_triggered(id, index, &mut outbox);
        }

        let FrameOutbox { hud, fx } = &mut outbox;
        race.frame_tick(dt, hud, fx);

        let snapshot = race.snapshot(&physics);
        {
            let mut game = state.lock().await;
            game.tick += 1;
            game.remember_hud(&outbox.hud);
            game.broadcast_frame(&snapshot, &outbox);
        }
        outbox = FrameOutbox::default();
    }
}
