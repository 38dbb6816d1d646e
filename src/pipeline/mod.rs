//! Process context and the pipeline run
//!
//! [`AppContext`] owns everything a run needs: configuration, database, form
//! source, normalizer, renderer, delivery channel and the converter listener. It is
//! created once by [`AppContext::init`] and torn down by [`AppContext::shutdown`].
//!
//! [`AppContext::run_once`] is one pass of the pipeline:
//!
//! 1. fetch new form rows
//! 2. normalize them into records
//! 3. render one certificate per record
//! 4. deliver each certificate to every destination
//! 5. record every (record, destination) outcome in the ledger
//! 6. commit the rows that reached every destination
//!
//! Failures are isolated: a bad record skips that record, a bad destination skips
//! that destination. Rows that were not delivered everywhere stay uncommitted and
//! are picked up again by the next run.

use crate::config::{Config, DestinationConfig};
use crate::converter::{Converter, ConverterService, NoOpConverter};
use crate::credentials::{
    CredentialResolver, DatabaseSecretStore, Prompter, SecretStore, TerminalPrompter,
};
use crate::db::{Database, DeliveryStatus, NewDelivery};
use crate::delivery::{DeliveredPaths, DeliveryChannel};
use crate::error::{DeliveryError, Error, Result};
use crate::form_source::{FormBatch, FormSource, JsonExportSource};
use crate::mount::{CliMounter, Mounter};
use crate::normalize::Normalizer;
use crate::scheduler_task::ScheduledJob;
use crate::template::TemplateRenderer;
use crate::types::{CanonicalRecord, RunSummary};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Replaceable collaborators of the pipeline
pub struct Components {
    /// Form responses
    pub source: Arc<dyn FormSource>,
    /// Persisted credentials
    pub secret_store: Arc<dyn SecretStore>,
    /// Asks for credentials that are not stored
    pub prompter: Arc<dyn Prompter>,
    /// Mounts destinations
    pub mounter: Arc<dyn Mounter>,
    /// Produces the secondary format
    pub converter: Arc<dyn Converter>,
    /// Started conversion listener owned by the context; stopped by
    /// [`AppContext::shutdown`]
    pub converter_service: Option<Arc<ConverterService>>,
}

/// Process-scoped pipeline state
pub struct AppContext {
    config: Config,
    db: Arc<Database>,
    source: Arc<dyn FormSource>,
    normalizer: Normalizer,
    renderer: TemplateRenderer,
    delivery: DeliveryChannel,
    converter_service: Option<Arc<ConverterService>>,
}

impl AppContext {
    /// Open the database, load the template and start the converter listener
    ///
    /// # Errors
    /// A missing or corrupt template, an unopenable database or an invalid form
    /// location is fatal. A missing converter is not: certificates are then
    /// delivered in the primary format only.
    pub async fn init(config: Config) -> Result<Self> {
        let db = Arc::new(Database::new(&config.database_path()).await?);
        let source = Arc::new(JsonExportSource::from_config(
            &config.form,
            &config.base_dir,
            db.clone(),
        )?);

        let service = ConverterService::from_config(&config.tools, &config.artifacts.secondary_format)
            .map(Arc::new);
        let converter_service = match service {
            Some(service) => match service.start().await {
                Ok(()) => Some(service),
                Err(e) => {
                    warn!(error = %e, "conversion listener unavailable, delivering primary format only");
                    None
                }
            },
            None => {
                warn!("unoconv not found, delivering primary format only");
                None
            }
        };
        let converter: Arc<dyn Converter> = match &converter_service {
            Some(service) => service.clone(),
            None => Arc::new(NoOpConverter),
        };

        let components = Components {
            source,
            secret_store: Arc::new(DatabaseSecretStore::new(db.clone())),
            prompter: Arc::new(TerminalPrompter),
            mounter: Arc::new(CliMounter::from_config(&config.tools)),
            converter,
            converter_service: converter_service.clone(),
        };

        match Self::with_components(config, db, components) {
            Ok(context) => Ok(context),
            Err(e) => {
                if let Some(service) = &converter_service {
                    service.stop().await;
                }
                Err(e)
            }
        }
    }

    /// Assemble a context from explicit collaborators
    ///
    /// Nothing is started here. A `converter_service` passed in is stopped by
    /// [`AppContext::shutdown`]; every other component stays with the caller.
    pub fn with_components(
        config: Config,
        db: Arc<Database>,
        components: Components,
    ) -> Result<Self> {
        let renderer = TemplateRenderer::open(config.template_path(), &config.template)?;
        let normalizer = Normalizer::new(config.fields.clone(), config.normalize.clone());
        let resolver = Arc::new(CredentialResolver::new(
            components.secret_store,
            components.prompter,
        ));
        let delivery = DeliveryChannel::new(
            resolver,
            components.mounter,
            components.converter,
            config.credentials.clone(),
            config.artifacts.clone(),
        );

        info!(
            template = %renderer.path().display(),
            source = components.source.name(),
            destinations = config.destinations.len(),
            "pipeline ready"
        );

        Ok(Self {
            config,
            db,
            source: components.source,
            normalizer,
            renderer,
            delivery,
            converter_service: components.converter_service,
        })
    }

    /// Loaded configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Database handle
    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// One pass of the pipeline
    pub async fn run_once(&self) -> RunSummary {
        let mut summary = RunSummary::default();

        let batch = match self.source.fetch_new().await {
            Ok(batch) => batch,
            Err(e) => {
                error!(source = self.source.name(), error = %e, "failed to fetch form rows");
                summary.source_failed = true;
                return summary;
            }
        };

        summary.rows_fetched = batch.rows.len();
        if batch.is_empty() {
            info!(source = self.source.name(), total = batch.total, "no new form rows");
            return summary;
        }
        info!(source = self.source.name(), rows = batch.rows.len(), "processing new form rows");

        let records = self.normalizer.normalize(&batch.rows);
        let mut completed = Vec::new();

        for (row, record) in batch.rows.iter().zip(&records) {
            if self.process_record(record, &mut summary).await {
                completed.push(row.clone());
            }
        }

        let done = FormBatch {
            rows: completed,
            total: batch.total,
        };
        if done.rows.len() < batch.rows.len() {
            warn!(
                pending = batch.rows.len() - done.rows.len(),
                "some rows were not delivered everywhere and will be retried next run"
            );
        }
        if let Err(e) = self.source.commit(&done).await {
            error!(source = self.source.name(), error = %e, "failed to commit form rows");
            summary.source_failed = true;
        }

        summary
    }

    /// Render and deliver one record; true if every destination got the primary artifact
    async fn process_record(&self, record: &CanonicalRecord, summary: &mut RunSummary) -> bool {
        let artifact = match self.renderer.render(record) {
            Ok(artifact) => artifact,
            Err(e) => {
                error!(record = %record.key, name = %record.display_name, error = %e, "failed to render certificate");
                summary.render_failures += 1;
                for destination in &self.config.destinations {
                    self.record_outcome(failed_delivery(destination, record, &e))
                        .await;
                }
                return false;
            }
        };
        summary.records_rendered += 1;

        let mut complete = true;
        for destination in &self.config.destinations {
            let result = self.delivery.deliver(destination, &artifact, record).await;
            let outcome = classify(destination, record, result);

            match outcome.status {
                DeliveryStatus::Delivered => {
                    summary.primary_delivered += 1;
                    summary.secondary_delivered += 1;
                }
                DeliveryStatus::PrimaryOnly => {
                    summary.primary_delivered += 1;
                    summary.conversion_failures += 1;
                    warn!(
                        destination = %destination.name,
                        record = %record.key,
                        error = outcome.error_message.as_deref().unwrap_or_default(),
                        "certificate delivered without its converted copy"
                    );
                }
                DeliveryStatus::Failed => {
                    summary.delivery_failures += 1;
                    complete = false;
                    error!(
                        destination = %destination.name,
                        record = %record.key,
                        error = outcome.error_message.as_deref().unwrap_or_default(),
                        "delivery failed"
                    );
                }
            }

            self.record_outcome(outcome).await;
        }

        complete
    }

    async fn record_outcome(&self, outcome: NewDelivery) {
        if let Err(e) = self.db.record_delivery(&outcome).await {
            warn!(
                destination = %outcome.destination,
                record = %outcome.record_key,
                error = %e,
                "failed to record delivery outcome"
            );
        }
    }

    /// Stop the converter listener and close the database
    pub async fn shutdown(&self) {
        if let Some(service) = &self.converter_service {
            service.stop().await;
        }
        self.db.close().await;
        info!("pipeline shut down");
    }
}

#[async_trait]
impl ScheduledJob for AppContext {
    async fn execute(&self) -> RunSummary {
        self.run_once().await
    }
}

/// Ledger entry for the result of one delivery
fn classify(
    destination: &DestinationConfig,
    record: &CanonicalRecord,
    result: Result<DeliveredPaths>,
) -> NewDelivery {
    match result {
        Ok(paths) => NewDelivery {
            record_key: record.key.clone(),
            destination: destination.name.clone(),
            display_name: record.display_name.clone(),
            status: DeliveryStatus::Delivered,
            primary_path: Some(paths.primary),
            secondary_path: Some(paths.secondary),
            error_code: None,
            error_message: None,
        },
        Err(Error::Delivery(DeliveryError::ConversionFailed {
            primary_path,
            reason,
        })) => NewDelivery {
            record_key: record.key.clone(),
            destination: destination.name.clone(),
            display_name: record.display_name.clone(),
            status: DeliveryStatus::PrimaryOnly,
            primary_path: Some(primary_path),
            secondary_path: None,
            error_code: Some("conversion".to_string()),
            error_message: Some(reason),
        },
        Err(e) => failed_delivery(destination, record, &e),
    }
}

fn failed_delivery(
    destination: &DestinationConfig,
    record: &CanonicalRecord,
    error: &Error,
) -> NewDelivery {
    NewDelivery {
        record_key: record.key.clone(),
        destination: destination.name.clone(),
        display_name: record.display_name.clone(),
        status: DeliveryStatus::Failed,
        primary_path: None,
        secondary_path: None,
        error_code: Some(error.error_code().to_string()),
        error_message: Some(error.to_string()),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
