use crate::api::{self, ApiConfig};
use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            allowed_origins,
            max_body_bytes,
        } => {
            let config = ApiConfig::new(allowed_origins).with_max_body_bytes(max_body_bytes);

            api::new(port, dsn, globals, config).await?;
        }
    }

    Ok(())
}
