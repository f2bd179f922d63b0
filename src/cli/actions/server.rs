use crate::api;
use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::Result;
use url::Url;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server { port, dsn } => {
            // Fail fast on an unparseable DSN instead of letting the pool retry it.
            let dsn = Url::parse(&dsn)?;

            api::new(port, dsn.as_str(), globals).await?;
        }
    }

    Ok(())
}
