use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::{
    cli::telemetry,
    store::{ChatPage, HostStore, PageOutcome, postgres::PostgresHostStore},
};

#[derive(Debug)]
pub struct Args {
    pub dsn: String,
    pub chat_path: String,
}

/// Make sure the published chat page record exists.
///
/// # Errors
/// Returns an error if the store cannot be read or written.
#[instrument(skip(store), fields(store = store.backend()))]
pub async fn ensure_chat_page(store: &dyn HostStore, slug: &str) -> Result<PageOutcome> {
    let outcome = store
        .ensure_page(&ChatPage::for_slug(slug))
        .await
        .with_context(|| format!("Failed to ensure chat page '/{slug}'"))?;
    info!(slug, outcome = outcome.as_str(), "Chat page checked");
    Ok(outcome)
}

/// Execute the install action.
/// # Errors
/// Returns an error if the database is unreachable or the page cannot be written.
pub async fn execute(args: Args) -> Result<()> {
    let store = PostgresHostStore::connect(&args.dsn).await?;
    let outcome = ensure_chat_page(&store, &args.chat_path).await;
    telemetry::shutdown_tracer();

    match outcome? {
        PageOutcome::Created => println!("Created chat page /{}", args.chat_path),
        PageOutcome::Exists => println!("Chat page /{} already exists", args.chat_path),
    }

    Ok(())
}
