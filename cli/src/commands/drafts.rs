use crate::cli::DraftsCommands;
use crate::context::Context;
use crate::print::TablePrint;
use anyhow::Context as _;
use bytes::Bytes;
use chrono_humanize::HumanTime;
use colored::Colorize;
use updraft::releases::DraftFile;

impl DraftsCommands {
    pub async fn handle(self, ctx: &Context) -> anyhow::Result<()> {
        let manager = ctx.manager().await?;
        match self {
            DraftsCommands::Upload {
                target,
                version,
                platform,
                arch,
                files,
            } => {
                let (app, channel) = ctx.resolve(manager.catalog().as_ref(), &target).await?;

                let mut drafts = Vec::with_capacity(files.len());
                for path in &files {
                    let file_name = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .with_context(|| format!("{} has no usable file name", path.display()))?
                        .to_string();
                    let data = tokio::fs::read(path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    drafts.push(DraftFile {
                        file_name,
                        data: Bytes::from(data),
                    });
                }

                let draft = manager
                    .stage_draft(app.id, &channel.id, &version, &platform, &arch, drafts)
                    .await?;
                println!(
                    "Staged draft {} of {} with {} file(s)",
                    draft.id.to_string().bright_cyan(),
                    draft.version.bold(),
                    draft.filenames.len()
                );
            }
            DraftsCommands::Ls { target, json } => {
                let (app, channel) = ctx.resolve(manager.catalog().as_ref(), &target).await?;
                let drafts = manager.catalog().list_drafts(app.id, &channel.id).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&drafts)?);
                    return Ok(());
                }
                let mut table = TablePrint::new_with_headers(vec![
                    "ID", "Version", "Target", "Staged", "Files",
                ]);
                for draft in drafts {
                    table.add_row(vec![
                        draft.id.to_string().bright_cyan().to_string(),
                        draft.version,
                        format!("{}/{}", draft.platform, draft.arch),
                        HumanTime::from(draft.date).to_string(),
                        draft.filenames.join(", "),
                    ]);
                }
                table.print();
            }
            DraftsCommands::Release { target, draft_id } => {
                let (app, channel) = ctx.resolve(manager.catalog().as_ref(), &target).await?;
                let stored = manager.release_draft(app.id, &channel.id, draft_id).await?;
                println!("{}", format!("Released draft {draft_id}").bright_green());
                for file in stored {
                    println!("  {}", file);
                }
            }
            DraftsCommands::Rm {
                target,
                draft_id,
                all,
            } => {
                let (app, channel) = ctx.resolve(manager.catalog().as_ref(), &target).await?;
                if all {
                    let count = manager.delete_all_drafts(app.id, &channel.id).await?;
                    println!("Deleted {count} draft(s)");
                } else if let Some(draft_id) = draft_id {
                    manager.delete_draft(app.id, &channel.id, draft_id).await?;
                    println!("Deleted draft {draft_id}");
                }
            }
        }
        Ok(())
    }
}
