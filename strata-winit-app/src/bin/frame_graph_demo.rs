use strata_crate_tools::config::EngineConfig;
use strata_crate_tools::init_log::init_log;
use strata_winit_app::app::WinitApp;

fn main() -> anyhow::Result<()> {
    init_log();
    tracy_client::Client::start();
    tracy_client::set_thread_name!("RenderThread");

    let config = EngineConfig::load_or_default()?;
    WinitApp::run(config)
}
