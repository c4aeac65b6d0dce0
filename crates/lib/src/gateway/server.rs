//! Relay startup and the gateway HTTP server.

use crate::alert::{self, AlertSink};
use crate::channels::{ChannelHandle, ChatEvent, TelegramChannel};
use crate::config::{self, Config};
use crate::gateway::inbound::{routes, InboundState};
use crate::publisher::NatsReplyPublisher;
use crate::router::{run_router_loop, UpdateRouter};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const EVENT_QUEUE_CAPACITY: usize = 64;

/// Run the relay: verify the chat channel, connect the reply queue, start the
/// long-poll and router loops, then serve inbound HTTP on gateway.bind:gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C).
///
/// Startup failures (missing settings, chat API unreachable or refusing
/// getUpdates, queue or stream unavailable, port unavailable) are alerted and
/// returned; the caller is expected to exit.
pub async fn run_relay(config: Config) -> Result<()> {
    let alerts = alert::alert_sink_from_config(&config);
    match serve(config, alerts.clone()).await {
        Ok(()) => Ok(()),
        Err(e) => {
            alerts.alert(&format!("relay stopped: {:#}", e)).await;
            Err(e)
        }
    }
}

async fn serve(config: Config, alerts: Arc<dyn AlertSink>) -> Result<()> {
    let settings = config::resolve_relay_settings(&config)?;
    let telegram_config = &config.channels.telegram;
    let proxy = config::resolve_telegram_proxy(&config);

    let telegram = Arc::new(
        TelegramChannel::new(
            settings.bot_token.clone(),
            &telegram_config.api_base,
            proxy.as_deref(),
            telegram_config.poll_timeout_secs,
        )
        .context("building telegram client")?,
    );
    let me = telegram
        .get_me()
        .await
        .context("error connecting to telegram bot api")?;
    log::info!(
        "authorized on account {}",
        me.username.as_deref().unwrap_or("<unnamed>")
    );
    telegram
        .check_updates()
        .await
        .context("error reading telegram updates")?;

    let publisher = NatsReplyPublisher::connect(
        &settings.queue_url,
        config::resolve_queue_credentials(&config),
        &settings.queue_stream,
        settings.queue_name.clone(),
    )
    .await
    .with_context(|| format!("failed to connect to queue at {}", settings.queue_url))?;

    let (events_tx, events_rx) = mpsc::channel::<ChatEvent>(EVENT_QUEUE_CAPACITY);
    let channel: Arc<dyn ChannelHandle> = telegram.clone();
    let router = UpdateRouter::new(settings.chat_id, Arc::new(publisher));
    let channel_tasks = vec![
        telegram
            .clone()
            .start_inbound(events_tx, alerts.clone()),
        tokio::spawn(run_router_loop(
            router,
            channel.clone(),
            alerts.clone(),
            events_rx,
        )),
    ];

    let app = routes(InboundState {
        chat_id: settings.chat_id,
        channel: channel.clone(),
        alerts,
        confirm_delivery: config.gateway.confirm_delivery,
        port: config.gateway.port,
    });

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(channel, channel_tasks))
        .await
        .context("gateway server exited")?;
    log::info!("relay stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Stops the channel connector, then awaits the long-poll and router tasks.
async fn shutdown_signal(channel: Arc<dyn ChannelHandle>, channel_tasks: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping {} channel", channel.id());

    channel.stop();
    for h in channel_tasks {
        let _ = h.await;
    }
    log::info!("channel tasks finished");
}
