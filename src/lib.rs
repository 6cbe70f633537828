//! HAL: a tool-augmented conversation orchestrator.
//!
//! Coordinates a conversational LLM backend with tool providers discovered at
//! startup over MCP stdio. Each user query runs one turn: the model proposes an
//! answer or tool calls, requested tools run against the provider that owns
//! them, and a second model call folds the results into a plain-text reply
//! suitable for speech synthesis.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use hal::gateway::HttpGateway;
//! use hal::orchestrator::{Orchestrator, OrchestratorConfig};
//! use hal::registry::{RegistryOptions, ToolRegistry};
//! use hal::session::ProviderLaunchSpec;
//!
//! # async fn example() -> hal::error::Result<()> {
//! let providers = [ProviderLaunchSpec::new("weather", "uv").with_args(["run", "weather.py"])];
//! let registry =
//!     ToolRegistry::connect_all(&providers, Duration::from_secs(20), RegistryOptions::default())
//!         .await?;
//! let gateway = HttpGateway::new("http://127.0.0.1:8000", Duration::from_secs(120))?;
//!
//! let mut hal = Orchestrator::new(
//!     "You are HAL 9000.",
//!     Arc::new(registry),
//!     Arc::new(gateway),
//!     OrchestratorConfig::default(),
//! );
//! println!("{}", hal.process_query("What's the weather in Urbana?").await?);
//! hal.registry().shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod registry;
pub mod session;
pub mod types;
pub mod util;
