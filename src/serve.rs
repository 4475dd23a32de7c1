//! The `serve` loop: relation events in on stdin, publications out on stdout.
//!
//! Each input line is one event:
//!
//! ```text
//! {"kind":"joined","relation_id":3,"app":"wordpress","data":{"databases":"[\"app1\"]"}}
//! ```
//!
//! A `changed` or `broken` line for a relation this process has not seen,
//! such as one provisioned before a restart, registers it. Such a line may
//! carry the provider data last published for the relation in `provider`,
//! which a teardown needs:
//!
//! ```text
//! {"kind":"broken","relation_id":3,"provider":{"databases":"[\"app1\"]"}}
//! ```
//!
//! Each output line is one publication:
//!
//! ```text
//! {"relation_id":3,"data":{"data":"{...}","databases":"[\"app1\"]"}}
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use provider_core::{GenericResultExt, ProviderConfig};
use provider_mysql::MysqlGateway;
use provider_persistence::{StoreConfig, SurrealCredentialStore};
use provider_reconciler::{
    Controller, ControllerConfig, ReconcilerBuilder, ReconcilerConfig, UnitStatus,
};
use provider_relation::{DataBag, InMemoryTransport, Publication, RelationEventKind, RelationId};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

/// One relation event as read from input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    pub kind: RelationEventKind,
    pub relation_id: RelationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(default)]
    pub data: DataBag,
    /// Provider data of a relation this process may not know yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<DataBag>,
}

impl InputEvent {
    /// Parse one input line.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not a valid event.
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).context("Invalid relation event")
    }

    /// Feed the event into the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is closed.
    pub async fn apply(self, transport: &InMemoryTransport) -> Result<()> {
        let relation = self.relation_id;
        match self.kind {
            RelationEventKind::Joined => {
                transport.join(relation, self.app.as_deref(), self.data).await?;
            }
            RelationEventKind::Changed => {
                let provider = self.provider.unwrap_or_default();
                if transport.restore(relation, self.app.as_deref(), DataBag::new(), provider) {
                    info!(relation = %relation, "Registered relation from input");
                }
                transport.change(relation, self.data).await?;
            }
            RelationEventKind::Broken => {
                let provider = self.provider.unwrap_or_default();
                if transport.restore(relation, self.app.as_deref(), self.data, provider) {
                    info!(relation = %relation, "Registered relation from input");
                }
                transport.break_relation(relation).await?;
            }
        }
        Ok(())
    }
}

/// One publication as written to output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub relation_id: RelationId,
    pub data: DataBag,
}

impl From<Publication> for OutputLine {
    fn from(publication: Publication) -> Self {
        Self {
            relation_id: publication.relation_id,
            data: publication.bag,
        }
    }
}

/// Wire the real backend and store from configuration and serve stdio.
///
/// # Errors
///
/// Returns an error if the credential store cannot be opened.
pub async fn run(config: &ProviderConfig) -> Result<()> {
    let store = SurrealCredentialStore::connect(StoreConfig::from(&config.store))
        .await
        .with_context(|| format!("Failed to open credential store at {}", config.store.url))?;
    store
        .count()
        .await
        .tap_ok(|known| info!(relations = *known, "Loaded credential store"))
        .context("Failed to read credential store")?;

    let reconciler = ReconcilerBuilder::new()
        .with_gateway(Arc::new(MysqlGateway::new(&config.mysql)))
        .with_store(Arc::new(store))
        .with_config(ReconcilerConfig::from(config))
        .build()
        .context("Failed to build reconciler")?;

    let transport = Arc::new(InMemoryTransport::new(
        config.unit.address.clone(),
        config.unit.leader,
    ));
    let controller = Controller::new(
        Arc::new(reconciler),
        transport.clone(),
        ControllerConfig::from(config),
    );

    let stopper = controller.stopper();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, stopping"),
            Err(err) => error!("Failed to listen for shutdown signal: {}", err),
        }
        stopper.stop();
    });

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve_lines(controller, transport, stdin, tokio::io::stdout()).await
}

/// Run `controller` over line-oriented input and output until the input
/// ends or the controller is stopped.
///
/// # Errors
///
/// Returns an error if the controller loop fails.
pub async fn serve_lines<R, W>(
    mut controller: Controller,
    transport: Arc<InMemoryTransport>,
    input: R,
    output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (done_tx, done_rx) = watch::channel(false);
    let printer = tokio::spawn(print_publications(transport.subscribe(), output, done_rx));
    let reader = tokio::spawn(read_events(input, transport));
    tokio::spawn(log_status(controller.status()));

    let outcome = controller.run().await;
    reader.abort();
    let _ = done_tx.send(true);
    if let Err(e) = printer.await {
        warn!(error = %e, "Publication writer ended abnormally");
    }

    outcome.context("Controller failed")
}

async fn read_events<R>(input: R, transport: Arc<InMemoryTransport>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => {
                let applied = match InputEvent::parse(&line) {
                    Ok(event) => event.apply(&transport).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = applied {
                    warn!(error = %e, line = %line, "Skipping input line");
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read input");
                break;
            }
        }
    }
    info!("Input closed");
    transport.close().await;
}

async fn print_publications<W>(
    mut publications: broadcast::Receiver<Publication>,
    mut output: W,
    mut done: watch::Receiver<bool>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            received = publications.recv() => match received {
                Ok(publication) => write_line(&mut output, publication).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Publication output fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = done.changed() => {
                while let Ok(publication) = publications.try_recv() {
                    write_line(&mut output, publication).await;
                }
                break;
            }
        }
    }
    if let Err(e) = output.flush().await {
        warn!(error = %e, "Failed to flush output");
    }
}

async fn write_line<W>(output: &mut W, publication: Publication)
where
    W: AsyncWrite + Unpin,
{
    let line = match serde_json::to_string(&OutputLine::from(publication)) {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, "Failed to encode publication");
            return;
        }
    };
    let written = async {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await
    };
    if let Err(e) = written.await {
        warn!(error = %e, "Failed to write publication");
    }
}

async fn log_status(mut status: watch::Receiver<UnitStatus>) {
    while status.changed().await.is_ok() {
        let current = status.borrow_and_update().clone();
        if current.is_blocked() {
            warn!(status = %current, "Unit status changed");
        } else {
            info!(status = %current, "Unit status changed");
        }
    }
}
