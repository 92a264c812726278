use anyhow::{Context, bail};
use tracing::{debug, error, info};

use reel_pipeline::{
    app::ComponentRegistry,
    config::Config,
    pipeline::{PipelinePlan, run_plan},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(String::as_str)
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                column = location.column(),
                message,
                "panic occurred"
            );
        } else {
            error!(
                thread = thread_name,
                message, "panic occurred without location information"
            );
        }
    }));

    let Some(plan_path) = std::env::args_os().nth(1) else {
        bail!("usage: reel-pipeline <plan.yaml>");
    };

    // Tracing initialization is handled by Telemetry::new()
    let config = Config::from_env().context("failed to load configuration")?;
    let max_attempts = config.stage_max_attempts();
    let registry = ComponentRegistry::build(config).context("failed to build component registry")?;
    let plan = PipelinePlan::load(&plan_path)?;

    let mut orchestrator = registry.orchestrator();
    info!(
        run_id = %registry.generation_client().run_id(),
        plan = %plan_path.to_string_lossy(),
        "starting pipeline run"
    );

    let outcome = tokio::select! {
        result = run_plan(&mut orchestrator, &plan, max_attempts) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let status = match outcome {
        Some(Ok(summary)) => {
            info!(
                stages_completed = summary.stages_completed,
                retries = summary.retries,
                "pipeline completed"
            );
            Ok(())
        }
        Some(Err(error)) => {
            error!(stage = %orchestrator.stage(), error = %error, "pipeline stopped");
            Err(anyhow::Error::new(error))
        }
        None => {
            info!(stage = %orchestrator.stage(), "interrupted, cancelling in-flight job");
            orchestrator.dispose();
            Ok(())
        }
    };

    let state = serde_json::to_string_pretty(orchestrator.state())
        .context("failed to serialize pipeline state")?;
    println!("{state}");
    debug!(metrics = %registry.telemetry().render_prometheus(), "final metrics");

    status
}
