//! Pipeline orchestration
//!
//! Locates the "center" container, discovers the networks attached to it and
//! the names on them, then digs those names from the container's perspective
//! and verifies the resolved addresses by pinging them for good or bad. The
//! terminal report keeps re-rendering while the stages stream their findings.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::AppConfig;
use crate::dig::{Digger, ResultMap};
use crate::docker::{discover_attached_names, BollardDockerClient};
use crate::error::AppError;
use crate::render::{LiveWriter, Renderer, Spinner};
use crate::verify::Verifier;

const RENDER_TICK: Duration = Duration::from_millis(20);

/// Runs one scan of the configured container and renders the live report.
pub async fn dig_and_report(config: AppConfig) -> Result<(), AppError> {
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let results = Arc::new(ResultMap::new());
    let (tracking_done_tx, tracking_done) = oneshot::channel::<()>();

    // fire off the renderer right away so there is feedback while the
    // container and its networks are still being inspected
    let mut spinner = Spinner::new();
    spinner.start(config.spinner_interval);
    let mut renderer = Renderer::new(config.container.clone(), config.indentation, spinner);
    let render_task = tokio::spawn({
        let results = Arc::clone(&results);
        async move {
            let mut live = LiveWriter::new();
            let mut ticker = tokio::time::interval(RENDER_TICK);
            let mut tracking_done = tracking_done;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = live.update(&renderer.render(results.snapshot()));
                    }
                    _ = &mut tracking_done => break,
                }
            }
            // flush one final frame carrying the terminal verdicts
            let _ = live.update(&renderer.render(results.snapshot()));
            renderer.stop();
        }
    });

    let client = BollardDockerClient::new()?;
    let (networks, netns) = discover_attached_names(&client, &config.container).await?;
    debug!(
        "container {} is attached to {} populated networks, netns {}",
        config.container,
        networks.len(),
        netns
    );

    // the processing elements and their plumbing: digger producing addresses
    // from names, verifier checking them, result map collecting the verdicts
    let (digger, digger_news) =
        Digger::new(config.workers, Some(&netns), cancel.clone()).await?;
    let (verifier, news) = Verifier::new(config.workers, Some(netns), cancel.clone());
    let verify_task = tokio::spawn(verifier.verify(digger_news));
    let track_task = tokio::spawn({
        let results = Arc::clone(&results);
        let cancel = cancel.clone();
        async move {
            results.track(news, &cancel).await;
            let _ = tracking_done_tx.send(());
        }
    });

    digger.dig_networks(&networks).await;
    digger.stop_wait().await;

    let _ = verify_task.await;
    let _ = track_task.await;
    let _ = render_task.await;
    Ok(())
}
