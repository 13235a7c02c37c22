use envconfig::Envconfig;
use rsg_engine::EngineConfig;
use rsg_gateway::{Config, init_log, start_server};

fn main() {
    let cpus = num_cpus::get();
    let worker_threads = std::cmp::max(1, cpus);
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to build runtime: {e}");
            std::process::exit(1);
        }
    };
    runtime.block_on(async { start().await });
}

async fn start() {
    let conf = match Config::init_from_env() {
        Ok(conf) => conf,
        Err(e) => {
            eprintln!("Failed to load config from env: {:?}", e);
            std::process::exit(1);
        }
    };
    init_log(conf.json_logs());
    let engine_conf = match EngineConfig::load() {
        Ok(conf) => conf,
        Err(e) => {
            tracing::error!("Failed to load engine config from env: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = start_server(conf, engine_conf).await {
        tracing::error!("Error starting server: {:?}", e);
        std::process::exit(1);
    }
}
