mod config;
mod engine;
mod error;
mod message;
mod messaging;
mod morph;
mod nlu;
mod skill;
mod skills;
mod webhook;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::error::Result;
use crate::messaging::bridge::BridgeGateway;
use crate::messaging::GatewayManager;
use crate::morph::{MecabServiceClient, MorphAnalyzer};
use crate::nlu::{DialogflowClient, NluRegistry};
use crate::skill::SkillRegistry;

#[tokio::main]
async fn main() {
    // Load .env file (if present) before anything reads env vars
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    if args.iter().any(|a| a == "--default-config") {
        print!("{}", Config::default_config_contents());
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);

    let config = match Config::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load config: {e}");
            return;
        }
    };

    info!(
        bind = %config.bind,
        default_skill = %config.default_skill,
        nlu = config.nlu.enabled,
        morph = config.morph.enabled,
        "skill-dialog starting"
    );

    let engine = match build_engine(&config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("failed to start: {e}");
            return;
        }
    };

    if args.iter().any(|a| a == "--check") {
        info!(skills = ?engine.skills().ids(), "configuration OK");
        return;
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut server = {
        let engine = engine.clone();
        let bind = config.bind.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = webhook::serve(engine, &bind, shutdown_rx).await {
                error!("webhook server error: {e}");
            }
        })
    };

    // Wait for shutdown signal, or for the server to die on its own
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, stopping...");
            let _ = shutdown_tx.send(());
            let _ = server.await;
        }
        _ = &mut server => {
            warn!("webhook server exited");
        }
    }

    info!("skill-dialog stopped");
}

fn build_engine(config: &Config) -> Result<Engine> {
    let mut nlu = NluRegistry::new();
    let nlu_service = if config.nlu.enabled {
        let client = DialogflowClient::new(&config.nlu, Config::nlu_access_token())?;
        nlu.register(Arc::new(client));
        Some(config.nlu.service.as_str())
    } else {
        None
    };

    let analyzer: Option<Arc<dyn MorphAnalyzer>> = if config.morph.enabled {
        Some(Arc::new(MecabServiceClient::new(&config.morph)?))
    } else {
        None
    };

    let mut gateways = GatewayManager::new();
    for (platform, platform_config) in config.platforms.enabled() {
        gateways.register(Arc::new(BridgeGateway::new(
            platform,
            platform_config.bridge_url.clone(),
            platform_config.max_messages_per_reply,
        )));
    }
    if gateways.is_empty() {
        warn!("no messaging platforms enabled; every event will fail delivery");
    } else {
        info!(platforms = ?gateways.platforms(), nlu = ?nlu.list(), "services ready");
    }

    let mut skills = SkillRegistry::new();
    skills::register_builtin(&mut skills, &nlu, nlu_service, analyzer)?;
    if skills.get(&config.default_skill).is_err() {
        warn!(skill = %config.default_skill, "default skill is not registered");
    }

    Ok(Engine::new(skills, gateways, config.default_skill.clone()))
}

fn print_usage() {
    println!(
        "skill-dialog: multi-turn slot-filling dialogue engine

USAGE:
    skill-dialog [OPTIONS]

OPTIONS:
    --config <PATH>     Path to config file (default: ~/.config/skill-dialog/config.toml)
    --default-config    Print default config to stdout and exit
    --check             Validate config and build every skill, then exit
    -h, --help          Print this help message

ENVIRONMENT:
    NLU_ACCESS_TOKEN      Bearer token for the NLU service
    RUST_LOG              Log filter (default: info)

ENDPOINTS:
    POST /webhook         Normalised inbound event from a platform bridge
    GET  /health          Liveness and registered skills"
    );
}
