use anyhow::Context;

use taskroute_api::app::{self, services, AppState};
use taskroute_infra::{TaskRouteBuilder, TaskrouteConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    taskroute_observability::init();

    let config = TaskrouteConfig::from_env().context("invalid configuration")?;
    let sinks = services::build_sinks(&config)
        .await
        .context("failed to set up task and scheduler sinks")?;
    let (task_hook, job_hook) = services::delivery_hooks(&config);

    let builder = TaskRouteBuilder::from_config(&config, sinks.tasks, sinks.jobs)
        .context("invalid queue configuration")?
        .task_hook(task_hook)
        .job_hook(job_hook);
    let handlers = services::Handlers::bind(&builder).context("invalid handler parameters")?;

    // Schedules are only registered for deployed listeners.
    if config.is_local {
        tracing::info!("local run; skipping schedule registration");
    } else {
        let outcome = services::register_schedules(&handlers)
            .await
            .context("failed to register scheduled jobs")?;
        tracing::info!(applied = outcome.is_applied(), "scheduled jobs reconciled");
    }

    let app = app::build_app(AppState::new(handlers), &app::listener_prefix(&config.base_url));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
