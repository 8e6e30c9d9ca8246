#[macro_use]
extern crate async_trait;
#[macro_use]
extern crate tracing;
#[macro_use]
extern crate anyhow;

use anyhow::Result;
use clap::Parser;
use tokio::runtime;

mod admin;
mod args;
mod bus;
mod config;
mod consumer;
mod echo;
mod filter;
mod identity;
mod log;
mod misc;
mod push;
mod query;
mod route;
mod shutdown;
mod store;
mod web;

use admin::Delegation;
use args::ArgsParser;
use bus::Remote;
use consumer::bus::BusPublisher;
use echo::EchoSuppressor;
use misc::RecordsPath;
use route::Router;
use shutdown::Shutdown;
use store::EntityStore;
use web::AppState;

fn main() -> anyhow::Result<()> {
    let args = ArgsParser::parse();

    let run_args = match admin::delegate(args) {
        Delegation::RunMain(args) => args,
        Delegation::SubcommandRan(result) => return result,
    };

    // logging depends on the configuration, so it is read first
    let cfg = admin::load_config(&run_args.config)?;
    let _guard = match &cfg.directory.log {
        Some(dir) => log::init_logging_with_file(dir.clone())?,
        None => log::init_logging_no_file()?,
    };
    info!("Read configuration from {:?}", run_args.config);

    let records_dir = RecordsPath::new(cfg.directory.data.clone());
    records_dir.ensure_exists_blocking()?;

    debug!("Launching async runtime");
    let runtime = runtime::Builder::new_multi_thread().enable_all().build()?;
    let mut shutdown = Shutdown::new();
    runtime.block_on(async {
        let result = async_main(cfg, &mut shutdown, records_dir).await;
        if let Err(e) = &result {
            error!("Main task exited with error: {e:?}");
        }
        shutdown.trigger_shutdown();
        info!("shut down - waiting for tasks to stop");
        shutdown.wait_for_completion().await;
        result
    })
}

async fn async_main(
    cfg: config::Config,
    shutdown: &mut Shutdown,
    records_dir: RecordsPath,
) -> anyhow::Result<()> {
    // trap the ctrl+c signal, will only start listening later in the main loop
    shutdown::util::trap_ctrl_c(shutdown.handle()).await;

    let db_path = records_dir.path(&cfg.database.file)?;
    info!("Opening database {db_path:?}");
    let store = EntityStore::open(&db_path, cfg.database.busy_timeout())?;

    let echo = EchoSuppressor::new();
    let mut router = Router::new(
        store.clone(),
        &cfg.ingest,
        cfg.plausibility.clone(),
        echo.clone(),
    );
    let (inbound_tx, inbound_rx) = flume::bounded(cfg.ingest.queue);

    if let Some(mqtt) = cfg.mqtt.clone() {
        // fail before anything starts rather than inside the bus task
        let remote = Remote::parse(&mqtt.remote)?;
        debug!("Message bus at {remote}");
        let (outbound_tx, outbound_rx) = flume::unbounded();
        router.with_consumer(BusPublisher::new(echo, outbound_tx));
        let bus = bus::bus_task(mqtt, inbound_tx.clone(), outbound_rx, shutdown.handle());
        tokio::spawn(async move {
            if let Err(e) = bus.await {
                error!("Message bus task exited with error: {e:?}");
            }
        });
    } else {
        info!("No MQTT remote configured, the message bus is disabled");
    }

    let router = route::router_task(router, inbound_rx, shutdown.handle());
    tokio::spawn(async move {
        if let Err(e) = router.await {
            error!("Ingestion router exited with error: {e:?}");
        }
    });

    let state = AppState::new(store, inbound_tx, cfg.webserver.clone());
    web::serve(state, shutdown.handle()).await?;

    Ok(())
}
