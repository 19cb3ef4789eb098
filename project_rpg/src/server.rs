//! Wiring between the network tasks and the tick thread.

use std::path::Path;
use std::time::{Duration, Instant};

use engine_core::TickLoop;
use net::channels::{NetHandles, NetToTick, OutputTx, PlayerRx};
use world::{EntityCatalog, ItemCatalog, JsonMapDir, World, WorldCommand};

use crate::config::ServerConfig;
use crate::shutdown::ShutdownRx;

/// Load catalogs and maps named by the config and build the world.
/// Missing catalog files fall back to the built-in content.
pub fn build_world(config: &ServerConfig) -> Result<World, Box<dyn std::error::Error>> {
    let content = Path::new(&config.world.content_dir);
    let entities_path = content.join("entities.json");
    let catalog = if entities_path.is_file() {
        EntityCatalog::load(&entities_path)?
    } else {
        tracing::warn!(path = %entities_path.display(), "no entity catalog, using builtins");
        EntityCatalog::builtin()
    };
    let items_path = content.join("items.json");
    let items = if items_path.is_file() {
        ItemCatalog::load(&items_path)?
    } else {
        tracing::warn!(path = %items_path.display(), "no item catalog");
        ItemCatalog::default()
    };

    let maps = JsonMapDir::new(&config.world.maps_dir);
    let world = World::new(config.to_world_config(), catalog, items, &maps)?;
    Ok(world)
}

pub fn to_command(msg: NetToTick) -> WorldCommand {
    match msg {
        NetToTick::NewConnection { session_id } => WorldCommand::Connect {
            session: session_id,
        },
        NetToTick::Message {
            session_id,
            request,
        } => WorldCommand::Request {
            session: session_id,
            request,
        },
        NetToTick::Disconnected { session_id } => WorldCommand::Disconnect {
            session: session_id,
        },
    }
}

/// Move everything the network layer queued into the command stream.
pub fn pump_inbound(tick_loop: &mut TickLoop<World>, player_rx: &mut PlayerRx) -> usize {
    let mut count = 0;
    while let Ok(msg) = player_rx.try_recv() {
        tick_loop.commands.push(to_command(msg));
        count += 1;
    }
    count
}

/// Hand the tick's frames to the output router.
pub fn flush_outbound(tick_loop: &mut TickLoop<World>, output_tx: &OutputTx) {
    for out in tick_loop.sim.drain_outgoing() {
        if output_tx.send(out).is_err() {
            tracing::warn!("output router gone, dropping frames");
            return;
        }
    }
}

/// One full server tick: inbound, simulate, outbound.
pub fn run_one_tick(
    tick_loop: &mut TickLoop<World>,
    player_rx: &mut PlayerRx,
    output_tx: &OutputTx,
) -> observability::TickMetrics {
    pump_inbound(tick_loop, player_rx);
    let metrics = tick_loop.step();
    flush_outbound(tick_loop, output_tx);
    metrics
}

/// Blocking tick loop; returns once shutdown is signalled.
pub fn run_tick_thread(
    mut tick_loop: TickLoop<World>,
    mut player_rx: PlayerRx,
    output_tx: OutputTx,
    shutdown_rx: ShutdownRx,
) {
    let tick_duration = tick_loop.config.tick_duration();
    let budget = tick_loop.config.budget_us();
    tracing::info!(tps = tick_loop.config.tps, "tick loop running");

    loop {
        if shutdown_rx.is_shutdown() {
            tracing::info!("tick loop: shutdown signal received");
            tick_loop.sim.shutdown_notice();
            flush_outbound(&mut tick_loop, &output_tx);
            break;
        }

        let tick_start = Instant::now();
        let metrics = run_one_tick(&mut tick_loop, &mut player_rx, &output_tx);
        metrics.log(budget);

        let elapsed = tick_start.elapsed();
        if elapsed < tick_duration {
            std::thread::sleep(tick_duration - elapsed);
        }
    }

    tracing::info!(ticks = tick_loop.current_tick(), "tick loop stopped");
}

/// Spawn the router and web server, then run the tick loop on its own thread
/// until shutdown.
pub async fn run_server(
    config: ServerConfig,
    world: World,
    shutdown_rx: ShutdownRx,
) -> Result<(), Box<dyn std::error::Error>> {
    let (player_tx, player_rx) = tokio::sync::mpsc::unbounded_channel();
    let (output_tx, output_rx) = tokio::sync::mpsc::unbounded_channel();
    let (register_tx, register_rx) = tokio::sync::mpsc::unbounded_channel();
    let (unregister_tx, unregister_rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(net::output_router::run_output_router(
        output_rx,
        register_rx,
        unregister_rx,
    ));

    let handles = NetHandles {
        player_tx,
        register_tx,
        unregister_tx,
    };
    let web_config = config.to_web_server_config();
    let listener = tokio::net::TcpListener::bind(&web_config.addr).await?;
    let ws_shutdown = shutdown_rx.clone().into_inner();
    let web_handle = tokio::spawn(async move {
        if let Err(e) =
            net::serve_on_listener(listener, web_config, handles, Some(ws_shutdown)).await
        {
            tracing::error!(error = %e, "web server error");
        }
    });

    let tick_loop = TickLoop::new(config.to_tick_config(), world);
    let tick_handle = tokio::task::spawn_blocking(move || {
        run_tick_thread(tick_loop, player_rx, output_tx, shutdown_rx);
    });

    tick_handle.await?;
    // Give the router a moment to flush the shutdown notices.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let _ = web_handle.await;
    Ok(())
}
