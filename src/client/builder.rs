use std::sync::Arc;

use super::BlockingClient;
use super::Registry;
use crate::source::PollContext;
use crate::BlockingConfig;
use crate::Repositories;
use crate::Repository;
use crate::Result;
use crate::SettingsProvider;
use crate::Transport;

pub struct BlockingClientBuilder {
    config: BlockingConfig,
    settings: Arc<dyn SettingsProvider>,
    transport: Arc<dyn Transport>,
    repositories: Repositories,
    registry: Option<Arc<Registry>>,
}

impl BlockingClientBuilder {
    /// Create a new builder with default config and no repositories
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config: BlockingConfig::default(),
            settings,
            transport,
            repositories: Repositories::new(),
            registry: None,
        }
    }

    /// Registers the repository serving watch keys whose model is `name`
    ///
    /// `service-instance` keys are served by the `service` repository.
    pub fn repository(
        mut self,
        name: impl Into<String>,
        repository: Arc<dyn Repository>,
    ) -> Self {
        self.repositories.register(name, repository);
        self
    }

    /// Completely replaces the repository table
    pub fn repositories(
        mut self,
        repositories: Repositories,
    ) -> Self {
        self.repositories = repositories;
        self
    }

    /// Completely replaces the default configuration
    ///
    /// # Example
    /// ```ignore
    /// let builder = BlockingClient::builder(settings, transport)
    ///     .config(BlockingConfig::new()?.with_override_config("blocking.toml")?);
    /// ```
    pub fn config(
        mut self,
        config: BlockingConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Shares an existing registry, e.g. to keep the cursor cache across clients
    pub fn registry(
        mut self,
        registry: Arc<Registry>,
    ) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validates the configuration and builds the client
    pub fn build(self) -> Result<BlockingClient> {
        let config = self.config.validate()?;
        let ctx = Arc::new(PollContext {
            settings: self.settings,
            transport: self.transport,
            settings_slug: config.settings_slug.clone(),
            event_capacity: config.event_capacity,
        });
        let registry = self.registry.unwrap_or_default();

        Ok(BlockingClient::from_parts(config, self.repositories, ctx, registry))
    }
}
