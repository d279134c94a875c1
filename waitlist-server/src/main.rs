//! waitlist-server

use anyhow::{anyhow, Result};
use axum::{headers::HeaderName, routing::get, Router};
use axum_server::Handle;
use clap::Parser;
use http::header;
use metrics_exporter_prometheus::PrometheusHandle;
use reqwest_middleware::ClientBuilder;
use reqwest_retry::RetryTransientMiddleware;
use retry_policies::policies::ExponentialBackoffBuilder;
use std::{
    future::ready,
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    process::exit,
    sync::Arc,
    time::Duration,
};
use tokio::{
    signal::{
        self,
        unix::{signal, SignalKind},
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, sensitive_headers::SetSensitiveHeadersLayer,
    timeout::TimeoutLayer, trace::TraceLayer, ServiceBuilderExt,
};
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use waitlist_core::limiter::spawn_sweeper;
use waitlist_server::{
    app_state::AppStateBuilder,
    db,
    docs::ApiDoc,
    metrics::setup_metrics_recorder,
    middleware::{self, access::API_KEY_HEADER, request_ulid::MakeRequestUlid, runtime},
    router,
    routes::fallback::notfound_404,
    settings::{AppEnvironment, Settings},
    setups::{
        local::{LocalSetup, LogNotifier},
        prod::{MailgunNotifier, PgStore, ProdSetup},
        ServerSetup,
    },
};

/// Request identifier field.
const REQUEST_ID: &str = "request_id";

/// Waitlist registration and activation server
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to the settings file, defaults to `config/settings.toml`
    #[arg(long)]
    config_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (stdout_writer, _stdout_guard) = tracing_appender::non_blocking(io::stdout());

    let settings = Settings::load(cli.config_path)?;

    setup_tracing(stdout_writer, settings.server.environment);

    info!(
        subject = "app_settings",
        category = "init",
        "starting with settings: {:?}",
        settings,
    );

    db::run_migrations(&settings.database.url).await?;
    let db_pool = db::pool(&settings.database.url, settings.database.connect_timeout).await?;
    let store = PgStore::new(db_pool, settings.email_cipher()?);

    let recorder_handle = setup_metrics_recorder()?;
    let cancellation_token = CancellationToken::new();

    let metrics_server = tokio::spawn(serve_metrics(
        recorder_handle,
        settings.server.metrics_port,
        cancellation_token.clone(),
    ));

    let app_server = if settings.server.environment == AppEnvironment::Local {
        let builder = state_builder::<LocalSetup>(&settings)?
            .with_store(store)
            .with_notifier(LogNotifier);
        tokio::spawn(run_app(settings, builder, cancellation_token.clone()))
    } else {
        let builder = state_builder::<ProdSetup>(&settings)?
            .with_store(store)
            .with_notifier(MailgunNotifier::new(settings.mailgun.clone()));
        tokio::spawn(run_app(settings, builder, cancellation_token.clone()))
    };

    tokio::spawn(async move {
        capture_sigterm().await;

        cancellation_token.cancel();
        println!("\nCtrl+C received, shutting down. Press Ctrl+C again to force shutdown.");

        capture_sigterm().await;

        exit(130)
    });

    let (metrics, app) = tokio::try_join!(metrics_server, app_server)?;

    if let Err(e) = metrics {
        tracing::error!("metrics server crashed: {}", e);
    }

    if let Err(e) = app {
        tracing::error!("app server crashed: {}", e);
    }

    Ok(())
}

/// Everything but the store and notifier, which depend on the setup
fn state_builder<S: ServerSetup>(settings: &Settings) -> Result<AppStateBuilder<S>> {
    Ok(AppStateBuilder::default()
        .with_token_service(settings.token_service()?)
        .with_limiter(Arc::new(settings.limiter.admission_limiter()?))
        .with_api_key(settings.security.api_key.clone())
        .with_list_path(settings.security.list_path_segments()?)
        .with_activation_base_url(settings.server.activation_base_url.clone())
        .with_environment(settings.server.environment))
}

async fn serve_metrics(
    recorder_handle: PrometheusHandle,
    port: u16,
    token: CancellationToken,
) -> Result<()> {
    let metrics_router = Router::new()
        .route("/metrics", get(move || ready(recorder_handle.render())))
        .fallback(notfound_404);

    let router = metrics_router.layer(CatchPanicLayer::custom(runtime::catch_panic));

    let (server, _, _) = serve("Metrics", router, port).await?;

    token.cancelled().await;
    server.graceful_shutdown(None);

    Ok(())
}

/// Serve the app, shutting everything else down if that fails
async fn run_app<S: ServerSetup>(
    settings: Settings,
    builder: AppStateBuilder<S>,
    token: CancellationToken,
) -> Result<()> {
    let result = serve_app(settings, builder, token.clone()).await;

    if result.is_err() {
        token.cancel();
    }

    result
}

async fn serve_app<S: ServerSetup>(
    settings: Settings,
    builder: AppStateBuilder<S>,
    token: CancellationToken,
) -> Result<()> {
    let req_id = HeaderName::from_static(REQUEST_ID);

    let app_state = builder.finalize()?;

    let participants = app_state.registrar.warm_presence_cache().await?;
    info!(
        subject = "presence_cache",
        category = "init",
        participants,
        "presence cache warmed"
    );

    let sweeper = spawn_sweeper(
        Arc::clone(&app_state.limiter),
        settings.limiter.sweep_interval(),
        settings.limiter.idle_threshold(),
        token.clone(),
    );

    let router = router::setup_app_router(app_state.clone())
        .route_layer(axum::middleware::from_fn(middleware::metrics::track))
        .layer(TraceLayer::new_for_http())
        // Set and propagate "request_id" (as a ulid) per request.
        .layer(
            ServiceBuilder::new()
                .set_request_id(req_id.clone(), MakeRequestUlid)
                .propagate_request_id(req_id),
        )
        // Applies the `tower_http::timeout::Timeout` middleware which
        // applies a timeout to requests.
        .layer(TimeoutLayer::new(Duration::from_millis(
            settings.server.timeout_ms,
        )))
        // Catches runtime panics and converts them into
        // `500 Internal Server` responses.
        .layer(CatchPanicLayer::custom(runtime::catch_panic))
        // Mark headers as sensitive on both requests and responses.
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            API_KEY_HEADER.clone(),
        ]))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    let (server, addr, serving) = serve("Application", router, settings.server.port).await?;

    if settings.healthcheck.is_enabled {
        tokio::spawn({
            let cancellation_token = token.clone();
            let settings = settings.healthcheck.clone();

            async move {
                let mut interval =
                    tokio::time::interval(Duration::from_millis(settings.interval_ms));

                let client = ClientBuilder::new(reqwest::Client::new())
                    .with(RetryTransientMiddleware::new_with_policy(
                        ExponentialBackoffBuilder::default()
                            .build_with_max_retries(settings.max_retries),
                    ))
                    .build();

                loop {
                    tokio::select! {
                        _ = cancellation_token.cancelled() => return,
                        _ = interval.tick() => {}
                    }

                    match client
                        .get(&format!("http://{}/healthcheck", addr))
                        .send()
                        .await
                    {
                        Ok(response) if response.status().is_success() => {}
                        _ => break,
                    }
                }

                cancellation_token.cancel();

                tracing::error!("Healthcheck failed, shutting down");
            }
        });
    }

    token.cancelled().await;

    let drain_timeout = Duration::from_millis(settings.server.drain_timeout_ms);
    server.graceful_shutdown(Some(drain_timeout));

    if let Err(err) = sweeper.await {
        tracing::warn!("admission sweeper ended abnormally: {}", err);
    }

    // in-flight requests may still start notifications until the server is done
    let serving = async move {
        if let Err(err) = serving.await {
            tracing::warn!("application server ended abnormally: {}", err);
        }
    };

    if !app_state
        .registrar
        .drain_after(serving, drain_timeout)
        .await
    {
        tracing::warn!(
            subject = "shutdown",
            category = "notifications",
            pending = app_state.registrar.pending_notifications(),
            "gave up waiting for notifications"
        );
    }

    Ok(())
}

async fn serve(
    name: &str,
    app: Router,
    port: u16,
) -> Result<(Handle, SocketAddr, JoinHandle<()>)> {
    let bind_addr: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    info!(
        subject = "app_start",
        category = "init",
        "{} server listening on {}",
        name,
        bind_addr
    );

    let handle = Handle::new();

    let serving = tokio::spawn({
        let handle = handle.clone();
        let name = name.to_string();
        async move {
            if let Err(e) = axum_server::bind(bind_addr)
                .handle(handle)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await
            {
                tracing::error!("{} server failed: {}", name, e);
            }
        }
    });

    let addr = handle
        .listening()
        .await
        .ok_or_else(|| anyhow!("{name} server failed to bind {bind_addr}"))?;

    Ok((handle, addr, serving))
}

/// Captures and waits for system signals.
async fn capture_sigterm() {
    #[cfg(unix)]
    let term = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = signal::ctrl_c() => {},
        _ = term => {}
    };
}

/// Setup the [tracing][tracing] subscriber: logfmt-ish lines locally,
/// JSON everywhere else.
fn setup_tracing(
    writer: tracing_appender::non_blocking::NonBlocking,
    environment: AppEnvironment,
) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "waitlist_server=info,waitlist_core=info,tower_http=info,reqwest_retry=info",
        )
    });

    let registry = tracing_subscriber::registry().with(filter);

    if environment == AppEnvironment::Local {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_target(true),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_current_span(true),
            )
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test_log::test(tokio::test)]
    async fn test_failed_app_cancels_everything() {
        let settings = Settings::load(None).unwrap();
        let token = CancellationToken::new();

        // no store, so the app state can't be finalized
        let builder = state_builder::<LocalSetup>(&settings)
            .unwrap()
            .with_notifier(LogNotifier);

        assert_matches!(run_app(settings, builder, token.clone()).await, Err(_));
        assert!(token.is_cancelled());
    }
}
