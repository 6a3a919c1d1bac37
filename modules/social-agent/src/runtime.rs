//! Wiring of one agent over the SQLite store and the HTTP adapters.

use std::sync::Arc;
use tokio::sync::oneshot;

use crate::collaborators::{Clock, PlatformClient, SystemClock, TextGenerator};
use crate::config::{AgentConfig, InvestigationConfig};
use crate::db::Db;
use crate::interaction::InteractionHandler;
use crate::investigation::Investigator;
use crate::scanner::MentionScanner;
use crate::scraper::HttpScraper;
use crate::task_client::HttpTaskDispatcher;

/// Collaborators supplied by the embedding process
#[derive(Clone)]
pub struct AgentServices {
    pub platform: Arc<dyn PlatformClient>,
    pub generator: Arc<dyn TextGenerator>,
}

/// Build a scanner over the store at `config.database_url`.
///
/// Investigation is enabled only when `investigation` is given. A scraper that
/// cannot be built leaves investigations running without article context.
pub fn build_scanner(
    config: AgentConfig,
    investigation: Option<InvestigationConfig>,
    services: AgentServices,
    clock: Arc<dyn Clock>,
) -> Result<MentionScanner, String> {
    let db = Arc::new(
        Db::from_config(&config)
            .map_err(|e| format!("Failed to open database {}: {}", config.database_url, e))?,
    );

    let mut handler = InteractionHandler::new(
        &config,
        services.platform.clone(),
        db.clone(),
        services.generator.clone(),
        clock.clone(),
    );

    match investigation {
        Some(investigation) => {
            log::info!("[AGENT] Investigations enabled via {}", investigation.api_url);
            let dispatcher = Arc::new(HttpTaskDispatcher::from_config(&investigation));
            let mut investigator = Investigator::new(
                dispatcher,
                services.generator.clone(),
                handler.reply_dispatcher(),
                db.clone(),
                clock.clone(),
                investigation,
            );
            match HttpScraper::new() {
                Ok(scraper) => investigator = investigator.with_scraper(Arc::new(scraper)),
                Err(e) => log::warn!("[AGENT] Article scraping disabled: {}", e),
            }
            handler = handler.with_investigator(investigator);
        }
        None => log::info!("[AGENT] Investigations disabled, replying directly"),
    }

    Ok(MentionScanner::new(
        config,
        services.platform,
        db.clone(),
        db,
        clock,
        handler,
    ))
}

/// Load configuration from the environment and scan until `shutdown_rx` fires
pub async fn run_from_env(
    services: AgentServices,
    shutdown_rx: oneshot::Receiver<()>,
) -> Result<(), String> {
    crate::init_logging();

    let config = AgentConfig::from_env()?;
    let investigation = match InvestigationConfig::from_env() {
        Ok(investigation) => Some(investigation),
        Err(e) => {
            log::warn!("[AGENT] Investigation not configured: {}", e);
            None
        }
    };

    let scanner = build_scanner(config, investigation, services, Arc::new(SystemClock))?;
    scanner.run(shutdown_rx).await;
    Ok(())
}
