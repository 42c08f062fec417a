//! Action execution.
//!
//! For one matched action the executor authorizes the request, resolves
//! every declared parameter, invokes the handler and hands the outcome to the
//! driver. Nothing is invoked once a step fails; the error goes straight to
//! [`Driver::handle_error`].

use std::time::Instant;

use tracing::Instrument;
use trellis_core::{Action, ActionError, ActionMetadata, Args, BoxFuture, Endpoint, Reply};

use crate::driver::Driver;
use crate::params;

/// Executes one action through a driver.
pub struct ActionExecutor<'a> {
    driver: &'a dyn Driver,
    metadata: &'a ActionMetadata,
}

impl<'a> ActionExecutor<'a> {
    /// Creates an executor for the action described by `metadata`.
    pub fn new(driver: &'a dyn Driver, metadata: &'a ActionMetadata) -> Self {
        Self { driver, metadata }
    }

    /// Runs the action and writes its response.
    pub async fn execute(&self, action: &mut Action) {
        let span = tracing::debug_span!(
            "action",
            action = %self.metadata.id,
            request_id = %action.request.id,
        );

        async {
            let started = Instant::now();
            match self.invoke(action).await {
                Ok(reply) => {
                    let reply = self.intercept(action, reply);
                    self.driver.handle_success(action, reply, self.metadata);
                }
                Err(error) => self.driver.handle_error(action, error, Some(self.metadata)),
            }
            tracing::debug!(
                status = action.response.status.as_u16(),
                elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
                "action completed"
            );
        }
        .instrument(span)
        .await;
    }

    /// Authorizes, resolves parameters and calls the handler.
    pub async fn invoke(&self, action: &Action) -> Result<Reply, ActionError> {
        if self.metadata.is_authorized_used {
            self.driver.check_authorization(action, self.metadata).await?;
        }

        let mut args = Args::new();
        for param in &self.metadata.params {
            let value = params::resolve(self.driver, action, param).await?;
            args.push(param.label(), value);
        }

        self.metadata
            .handler
            .invoke(&self.driver.options().container, args)
            .await
    }

    fn intercept(&self, action: &Action, reply: Reply) -> Reply {
        self.driver
            .options()
            .interceptors
            .iter()
            .chain(&self.metadata.interceptors)
            .fold(reply, |reply, interceptor| interceptor.intercept(action, reply))
    }
}

impl Endpoint for ActionExecutor<'_> {
    fn call<'b>(&'b self, action: &'b mut Action) -> BoxFuture<'b, Result<(), ActionError>> {
        Box::pin(async move {
            self.execute(action).await;
            Ok(())
        })
    }
}
