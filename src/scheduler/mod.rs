use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::core::events::ResetKind;

/// Cron (UTC, seconds field first) for each reset. Destiny 2 resets at
/// 17:00 UTC; the weekly reset lands Tuesday and Xur arrives Friday.
pub fn reset_cron(kind: ResetKind) -> &'static str {
    match kind {
        ResetKind::Daily => "0 0 17 * * *",
        ResetKind::Weekly => "0 0 17 * * Tue",
        ResetKind::Weekend => "0 0 17 * * Fri",
    }
}

pub fn signal_url(api_port: u16, kind: ResetKind) -> String {
    format!("http://127.0.0.1:{}{}", api_port, kind.signal_path())
}

/// Fire one reset signal at the relay. Failures are logged, never fatal;
/// the next cron firing retries naturally.
pub async fn post_signal(client: &reqwest::Client, api_port: u16, kind: ResetKind) {
    let url = signal_url(api_port, kind);
    info!("Sending {} reset signal", kind);
    match client.post(&url).send().await {
        Ok(resp) if resp.status().is_success() => {}
        Ok(resp) => error!(
            "{} reset signal rejected by the relay (status {})",
            kind,
            resp.status()
        ),
        Err(e) => error!("Could not deliver {} reset signal: {}", kind, e),
    }
}

/// Entrypoint for the scheduler process. The scheduler runs in its own
/// process so a crash on either side never takes the other down; the
/// loopback POST is the whole interface between them. Blocks until ctrl-c.
pub async fn run(api_port: u16) -> Result<()> {
    let scheduler = JobScheduler::new().await?;
    let client = reqwest::Client::new();

    for kind in ResetKind::ALL {
        let client = client.clone();
        let job = Job::new_async(reset_cron(kind), move |_uuid, mut _l| {
            let client = client.clone();
            Box::pin(async move {
                post_signal(&client, api_port, kind).await;
            })
        })?;
        scheduler.add(job).await?;
    }

    scheduler.start().await?;
    info!(
        "Reset scheduler running, signalling the relay on port {}",
        api_port
    );
    tokio::signal::ctrl_c().await?;
    info!("Reset scheduler stopping");
    Ok(())
}
