use clap::Parser;
use headwater::config::Settings;
use headwater::{observability, ControlPlane, APP_NAME, VERSION};
use tracing::info;

#[derive(Parser)]
#[command(name = "headwater", version, about = "HTTP xDS control plane")]
struct Cli {
    /// Path to the YAML settings file
    #[arg(long, short, default_value = "headwater.yaml", env = "HEADWATER_CONFIG")]
    config: String,
}

#[tokio::main]
async fn main() -> headwater::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::from_yaml_file(&cli.config)?;

    observability::init_logging(&settings.observability);
    observability::init_metrics(&settings.observability)?;

    info!(app_name = APP_NAME, version = VERSION, "Starting Headwater control plane");

    let plane = ControlPlane::build(settings).await?;
    plane.spawn_refresh_task();

    headwater::api::start_api_server(plane).await
}
