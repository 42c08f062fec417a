//! Application assembly.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use trellis_config::{ConfigError, DispatchSection, TrellisConfig};
use trellis_core::{ActionRegistry, Container, Middleware};
use trellis_dispatch::{DispatchError, Driver, DriverOptions, DriverOptionsBuilder, GhostDriver};
use trellis_lambda::LambdaDriver;
use trellis_server::{HyperDriver, ServerConfig, ServerError};
use trellis_telemetry::TelemetryError;

/// Failures while assembling or running an application.
#[derive(Error, Debug)]
pub enum AppError {
    /// No registry was given to the builder.
    #[error("an action registry is required")]
    MissingRegistry,

    /// Configuration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A driver could not be prepared.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The HTTP server failed.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Logging could not be set up.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

type Configure = Box<dyn FnOnce(DriverOptionsBuilder) -> DriverOptionsBuilder + Send>;

/// An assembled application: options, routes and global middleware.
///
/// One application can back several drivers; each call to [`ghost`],
/// [`hyper`] or [`lambda`] produces a fresh, initialized driver.
///
/// [`ghost`]: Application::ghost
/// [`hyper`]: Application::hyper
/// [`lambda`]: Application::lambda
#[derive(Clone)]
pub struct Application {
    options: Arc<DriverOptions>,
    registry: Arc<ActionRegistry>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Application {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::default()
    }

    /// Shared driver options.
    pub fn options(&self) -> &Arc<DriverOptions> {
        &self.options
    }

    /// The action registry.
    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    /// An in-process driver.
    pub fn ghost(&self) -> Result<GhostDriver, AppError> {
        self.mount(GhostDriver::new(Arc::clone(&self.options)))
    }

    /// A hyper HTTP driver.
    pub fn hyper(&self, config: ServerConfig) -> Result<HyperDriver, AppError> {
        self.mount(HyperDriver::new(Arc::clone(&self.options), config))
    }

    /// A Lambda driver.
    pub fn lambda(&self) -> Result<LambdaDriver, AppError> {
        self.mount(LambdaDriver::new(Arc::clone(&self.options)))
    }

    /// Installs logging from `config` and serves HTTP until SIGTERM or SIGINT.
    pub async fn serve(&self, config: &TrellisConfig) -> Result<(), AppError> {
        trellis_telemetry::init_logging(&config.logging)?;
        let driver = self.hyper(config.server.to_server_config())?;
        driver.run().await?;
        Ok(())
    }

    fn mount<D: Driver>(&self, mut driver: D) -> Result<D, AppError> {
        driver.initialize()?;
        for middleware in &self.middlewares {
            driver.register_middleware(Arc::clone(middleware));
        }
        driver.register_routes(Arc::clone(&self.registry))?;
        tracing::debug!(driver = %driver.kind(), actions = self.registry.len(), "driver mounted");
        Ok(driver)
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("options", &self.options)
            .field("actions", &self.registry.len())
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

/// Builder for [`Application`].
#[derive(Default)]
pub struct ApplicationBuilder {
    container: Option<Arc<Container>>,
    registry: Option<ActionRegistry>,
    dispatch: Option<DispatchSection>,
    configure: Option<Configure>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl ApplicationBuilder {
    /// Sets the frozen service container. Defaults to an empty one.
    #[must_use]
    pub fn container(mut self, container: Arc<Container>) -> Self {
        self.container = Some(container);
        self
    }

    /// Sets the action registry.
    #[must_use]
    pub fn registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Applies a `[dispatch]` config section before [`options`](Self::options).
    #[must_use]
    pub fn config(mut self, section: &DispatchSection) -> Self {
        self.dispatch = Some(section.clone());
        self
    }

    /// Customizes driver options (checkers, error handler, interceptors).
    #[must_use]
    pub fn options<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(DriverOptionsBuilder) -> DriverOptionsBuilder + Send + 'static,
    {
        self.configure = Some(Box::new(configure));
        self
    }

    /// Adds a global middleware.
    #[must_use]
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Assembles the application.
    pub fn build(self) -> Result<Application, AppError> {
        let registry = self.registry.ok_or(AppError::MissingRegistry)?;
        let container = self.container.unwrap_or_else(|| Container::new().freeze());

        let mut builder = DriverOptions::builder(container);
        if let Some(section) = &self.dispatch {
            builder = section.apply(builder)?;
        }
        if let Some(configure) = self.configure {
            builder = configure(builder);
        }

        Ok(Application {
            options: builder.build(),
            registry: Arc::new(registry),
            middlewares: self.middlewares,
        })
    }
}

impl fmt::Debug for ApplicationBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationBuilder")
            .field("registry", &self.registry.as_ref().map(ActionRegistry::len))
            .field("dispatch", &self.dispatch)
            .field("middlewares", &self.middlewares.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_required() {
        let err = Application::builder().build().unwrap_err();
        assert!(matches!(err, AppError::MissingRegistry));
    }

    #[test]
    fn test_dispatch_section_applied() {
        let section = DispatchSection {
            route_prefix: "/api".to_string(),
            development: true,
            ..DispatchSection::default()
        };
        let app = Application::builder()
            .registry(ActionRegistry::builder().build().unwrap())
            .config(&section)
            .build()
            .unwrap();

        assert_eq!(app.options().route_prefix, "/api");
        assert!(app.options().development);
    }

    #[test]
    fn test_options_closure_runs_after_config() {
        let section = DispatchSection {
            route_prefix: "/api".to_string(),
            ..DispatchSection::default()
        };
        let app = Application::builder()
            .registry(ActionRegistry::builder().build().unwrap())
            .config(&section)
            .options(|o| o.route_prefix("/v2"))
            .build()
            .unwrap();

        assert_eq!(app.options().route_prefix, "/v2");
    }

    #[test]
    fn test_each_driver_is_independent() {
        let app = Application::builder()
            .registry(ActionRegistry::builder().build().unwrap())
            .build()
            .unwrap();

        assert!(app.ghost().is_ok());
        assert!(app.ghost().is_ok());
        assert!(app.lambda().is_ok());
        assert!(app.hyper(ServerConfig::default()).is_ok());
    }
}
