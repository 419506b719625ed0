use crate::cli::{AppsCommands, ChannelsCommands};
use crate::context::Context;
use crate::print::TablePrint;
use anyhow::Context as _;
use colored::Colorize;

impl AppsCommands {
    pub async fn handle(self, ctx: &Context) -> anyhow::Result<()> {
        let catalog = ctx.catalog().await?;
        match self {
            AppsCommands::Create { name, members } => {
                let app = catalog.create_app(&name, &members).await?;
                println!("Created {} ({})", app.name.bold(), app.slug.bright_cyan());
            }
            AppsCommands::Ls { json } => {
                let apps = catalog.list_apps().await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&apps)?);
                    return Ok(());
                }
                let mut table = TablePrint::new_with_headers(vec!["Slug", "Name", "Channels", "Team"]);
                for app in apps {
                    let channels = app
                        .channels
                        .iter()
                        .map(|c| c.id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    table.add_row(vec![
                        app.slug.bright_cyan().to_string(),
                        app.name,
                        channels,
                        app.team.join(", "),
                    ]);
                }
                table.print();
            }
        }
        Ok(())
    }
}

impl ChannelsCommands {
    pub async fn handle(self, ctx: &Context) -> anyhow::Result<()> {
        let catalog = ctx.catalog().await?;
        match self {
            ChannelsCommands::Create { app, name } => {
                let app = catalog
                    .get_app_by_slug(&app)
                    .await?
                    .with_context(|| format!("No application with slug '{app}'"))?;
                let channel = catalog.create_channel(app.id, &name).await?;
                println!(
                    "Created channel {} in {} with id {}",
                    channel.name.bold(),
                    app.slug,
                    channel.id.bright_cyan()
                );
            }
        }
        Ok(())
    }
}
