//! Broker Gateway service entrypoint.
//!
//! Wires the configuration, session manager, streaming client and order
//! pipeline together, authenticates against the brokerage endpoint, and
//! drains stream events until shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use broker_gateway::infrastructure::telemetry;
use broker_gateway::{
    BrokerHttpClient, GatewayConfig, SessionManager, StreamChannel, StreamClient,
    StreamCredential, StreamEvent,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before anything reads the environment.
    dotenvy::dotenv().ok();
    telemetry::init();

    let config = GatewayConfig::from_env().context("configuration")?;
    tracing::info!(
        rest = %config.broker.base_url,
        stream = %config.stream.url,
        "Starting broker gateway"
    );

    let http_client = Arc::new(
        BrokerHttpClient::new(&config.broker, &config.credentials)
            .map_err(|err| anyhow::anyhow!("broker client: {err}"))?,
    );
    let session = Arc::new(SessionManager::new(
        Arc::clone(&http_client),
        config.session.clone(),
    ));

    // Operator-supplied login credentials.
    let username = std::env::var("BROKER_USERNAME").context("BROKER_USERNAME not set")?;
    let password = std::env::var("BROKER_PASSWORD").context("BROKER_PASSWORD not set")?;
    session
        .authenticate(&username, &password)
        .await
        .map_err(|err| anyhow::anyhow!("authentication: {err}"))?;

    let credential = StreamCredential {
        token: session
            .current_token()
            .context("no session token after login")?,
        hash: session.auth_hash().unwrap_or_default(),
    };

    let cancel = CancellationToken::new();
    let (event_tx, mut event_rx) = mpsc::channel::<StreamEvent>(1024);
    let stream_client = Arc::new(StreamClient::new(
        config.stream.clone(),
        event_tx,
        cancel.clone(),
    ));

    // Optional comma-separated symbol list for market data subscriptions.
    if let Ok(symbols) = std::env::var("BROKER_SUBSCRIBE_SYMBOLS") {
        for symbol in symbols.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            stream_client.subscribe(StreamChannel::MarketTick, symbol);
        }
    }
    // Always follow our own order and portfolio updates.
    stream_client.subscribe(StreamChannel::OrderUpdate, username.as_str());
    stream_client.subscribe(StreamChannel::PortfolioUpdate, username.as_str());

    let stream_handle = tokio::spawn(Arc::clone(&stream_client).run(credential));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
            event = event_rx.recv() => {
                match event {
                    Some(StreamEvent::Tick(tick)) => {
                        tracing::debug!(symbol = %tick.symbol, price = %tick.last_price, "Tick");
                    }
                    Some(StreamEvent::OrderUpdate(update)) => {
                        tracing::info!(
                            order_id = %update.order_id,
                            status = %update.status,
                            "Order update"
                        );
                    }
                    Some(StreamEvent::PortfolioUpdate(update)) => {
                        tracing::info!(symbol = %update.symbol, quantity = %update.quantity, "Position update");
                    }
                    Some(StreamEvent::Connected) => {
                        tracing::info!("Stream connected");
                    }
                    Some(StreamEvent::Disconnected) => {
                        tracing::warn!("Stream disconnected");
                    }
                    Some(StreamEvent::Reconnecting { attempt }) => {
                        tracing::warn!(attempt, "Stream reconnecting");
                    }
                    Some(StreamEvent::Error(message)) => {
                        tracing::error!(%message, "Stream error");
                    }
                    Some(_) => {}
                    None => {
                        tracing::warn!("Stream event channel closed");
                        break;
                    }
                }
            }
        }
    }

    // Teardown: stop the stream, then log out the session.
    stream_client.disconnect();
    if let Ok(Err(err)) = stream_handle.await {
        tracing::warn!(error = %err, "Stream terminated with error");
    }
    session.shutdown().await;
    tracing::info!("Broker gateway stopped");

    Ok(())
}
