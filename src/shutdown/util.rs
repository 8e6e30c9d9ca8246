use tokio::{select, signal::ctrl_c};

use super::ShutdownHandle;

pub async fn trap_ctrl_c(mut handle: ShutdownHandle) {
    tokio::spawn(async move {
        select! {
            res = ctrl_c() => {
                if let Err(e) = res {
                    error!("Failed to listen for ctrl_c signal ({e}) - triggering shutdown");
                }
                info!("shutdown triggered");
                handle.trigger_shutdown();
            }
            _ = handle.wait_for_shutdown() => {}
        }
    });
}
