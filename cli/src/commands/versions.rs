use crate::cli::{Target, VersionsCommands};
use crate::context::Context;
use crate::print::TablePrint;
use chrono_humanize::HumanTime;
use colored::Colorize;
use models::release::Version;

fn rollout_cell(version: &Version) -> String {
    let text = format!("{}%", version.rollout);
    match version.rollout {
        100 => text.bright_green().to_string(),
        0 => text.dimmed().to_string(),
        _ => text.yellow().to_string(),
    }
}

fn print_version(action: &str, version: &Version) {
    println!(
        "{} {} (rollout {}, {})",
        action,
        version.name.bold(),
        rollout_cell(version),
        if version.dead { "dead".red() } else { "live".green() }
    );
}

impl VersionsCommands {
    pub async fn handle(self, ctx: &Context) -> anyhow::Result<()> {
        let manager = ctx.manager().await?;
        let catalog = manager.catalog().clone();
        match self {
            VersionsCommands::Ls { target, json } => {
                let (app, channel) = ctx.resolve(catalog.as_ref(), &target).await?;
                let versions = catalog.list_versions(app.id, &channel.id).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&versions)?);
                    return Ok(());
                }
                let mut table = TablePrint::new_with_headers(vec![
                    "Version", "Rollout", "State", "Created", "Files",
                ]);
                for version in versions.iter().rev() {
                    table.add_row(vec![
                        version.name.bold().to_string(),
                        rollout_cell(version),
                        if version.dead {
                            "dead".red().to_string()
                        } else {
                            "live".green().to_string()
                        },
                        HumanTime::from(version.created_at).to_string(),
                        version.files.len().to_string(),
                    ]);
                }
                table.print();
            }
            VersionsCommands::Rollout {
                target,
                version,
                rollout,
            } => {
                let (app, channel) = ctx.resolve(catalog.as_ref(), &target).await?;
                let version = manager
                    .set_rollout(app.id, &channel.id, &version, rollout)
                    .await?;
                print_version("Updated", &version);
            }
            VersionsCommands::Dead { target, version } => {
                let (app, channel) = ctx.resolve(catalog.as_ref(), &target).await?;
                let version = manager.set_dead(app.id, &channel.id, &version, true).await?;
                print_version("Killed", &version);
            }
            VersionsCommands::Revive { target, version } => {
                let (app, channel) = ctx.resolve(catalog.as_ref(), &target).await?;
                let version = manager.set_dead(app.id, &channel.id, &version, false).await?;
                print_version("Revived", &version);
            }
            VersionsCommands::Age { target } => {
                let (app, channel) = ctx.resolve(catalog.as_ref(), &target).await?;
                let aged = manager.mark_old_versions_dead(app.id, &channel.id).await?;
                if aged.is_empty() {
                    println!("{}", "Nothing to age".dimmed());
                }
                for name in aged {
                    println!("Marked {} as dead", name.bold());
                }
            }
            VersionsCommands::Prune { target, keep } => {
                let (app, channel) = ctx.resolve(catalog.as_ref(), &target).await?;
                let deleted = manager
                    .delete_old_dead_versions(app.id, &channel.id, keep)
                    .await?;
                if deleted.is_empty() {
                    println!("{}", "Nothing to prune".dimmed());
                }
                for version in deleted {
                    println!("Deleted {}", version.name.bold());
                }
            }
        }
        Ok(())
    }
}

pub async fn regenerate(ctx: &Context, target: &Target) -> anyhow::Result<()> {
    let manager = ctx.manager().await?;
    let (app, channel) = ctx.resolve(manager.catalog().as_ref(), target).await?;
    manager.regenerate(app.id, &channel.id).await?;
    println!("Regenerated feeds of {}/{}", app.slug, channel.id.bright_cyan());
    Ok(())
}
