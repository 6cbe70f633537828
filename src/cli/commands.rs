//! Subcommand handlers.

use std::sync::Arc;

use crate::config::HalConfig;
use crate::controller::{self, Controller};
use crate::error::Result;
use crate::registry::ToolRegistry;

use super::{AskArgs, ServeArgs};

pub async fn handle_serve(mut config: HalConfig, args: ServeArgs) -> Result<()> {
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    let controller = Arc::new(Controller::startup(&config).await?);
    controller::serve(controller, &config.server.bind).await
}

pub async fn handle_ask(config: HalConfig, args: AskArgs) -> Result<()> {
    let controller = Controller::startup(&config).await?;
    let result = controller.handle_query(None, &args.query).await;
    controller.shutdown().await;

    println!("{}", result?);
    Ok(())
}

pub async fn handle_tools(config: HalConfig) -> Result<()> {
    let registry = ToolRegistry::connect_all(
        &config.providers,
        config.tools.connect_timeout(),
        config.registry_options(),
    )
    .await?;

    let listing = registry.build().await;
    registry.shutdown().await;
    let catalogue = listing?;

    if catalogue.is_empty() {
        println!(
            "No tools available ({} of {} providers connected).",
            registry.session_count(),
            config.providers.len()
        );
        return Ok(());
    }

    for tool in &catalogue.tools {
        println!("{} [{}]", tool.spec.name, tool.session_id);
        if !tool.spec.description.is_empty() {
            println!("    {}", tool.spec.description);
        }
    }
    Ok(())
}
