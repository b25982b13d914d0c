use std::io::{self, Write};
use std::process;

use hyperjson_client::{
    BuildError, ClientBuilder, ClientError, Document, LinkMap,
    config::{self, Command, LoadError},
    telemetry::{self, TelemetryError},
};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("failed to build client: {0}")]
    Build(#[from] BuildError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("invalid JSON body: {0}")]
    Body(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let client = ClientBuilder::from_settings(&settings)?.build()?;
    info!(api_root = %client.api_root(), "client ready");

    match cli_args.command {
        Command::Get(args) => {
            let resource = client.fetch(&args.href).await?;
            print_document(&resource.body, args.links.then_some(&resource.links))
        }
        Command::Root => {
            let root = client.api_root().to_string();
            let resource = client.fetch(&root).await?;
            print_document(&resource.body, None)
        }
        Command::Submit(args) => {
            let body = args.body.as_deref().map(serde_json::from_str).transpose()?;
            let (tx, rx) = oneshot::channel();
            client.submit(args.method, &args.href, body, move |result| {
                let _ = tx.send(result);
            });
            let submission = rx
                .await
                .map_err(|_| ClientError::transport("submit task ended without a result"))??;
            if let Some(href) = submission.href.as_deref() {
                info!(href, "resource location");
            }
            print_document(&submission.body, Some(&submission.links))
        }
    }
}

fn print_document(body: &Document, links: Option<&LinkMap>) -> Result<(), AppError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, body.value())?;
    writeln!(out)?;

    if let Some(links) = links {
        for (rel, target) in links.iter() {
            for href in target.hrefs() {
                writeln!(out, "{rel}: {href}")?;
            }
        }
    }
    Ok(())
}
