use crate::context::Context;
use anyhow::{Context as _, bail};
use bytes::Bytes;
use colored::Colorize;

const PROBE_KEY: &str = "_deepcheck/probe";

/// Round-trips a probe object through the configured store.
pub async fn deepcheck(ctx: &Context) -> anyhow::Result<()> {
    let payload = Bytes::from(format!("updraft deepcheck {}", chrono::Utc::now().to_rfc3339()));

    ctx.store
        .put_file(PROBE_KEY, payload.clone(), true)
        .await
        .context("Failed to write probe object")?;
    let read = ctx
        .store
        .get_file(PROBE_KEY)
        .await
        .context("Failed to read probe object")?;
    ctx.store
        .delete_path(PROBE_KEY)
        .await
        .context("Failed to delete probe object")?;

    if read != payload {
        bail!("Probe object came back with different contents");
    }
    if ctx.store.has_file(PROBE_KEY).await? {
        bail!("Probe object still exists after delete");
    }

    println!("{} {}", "Storage OK".bright_green(), ctx.store.public_base_url().dimmed());
    Ok(())
}

pub async fn unlock(ctx: &Context, app_slug: &str) -> anyhow::Result<()> {
    let positioner = ctx.positioner();
    match positioner.lock().holder(app_slug).await? {
        Some(token) => {
            positioner.lock().force_release(app_slug).await?;
            println!("Released lock {} of {}", token.dimmed(), app_slug.bold());
        }
        None => println!("{} is not locked", app_slug.bold()),
    }
    Ok(())
}
