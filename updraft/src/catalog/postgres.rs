use super::ReleaseCatalog;
use super::policy;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use models::app::{App, Channel};
use models::draft::{NewTemporarySave, TemporarySave};
use models::file::{FileType, ReleaseFile};
use models::release::Version;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct AppRow {
    id: i32,
    name: String,
    slug: String,
    token: String,
}

#[derive(sqlx::FromRow)]
struct ChannelRow {
    id: i32,
    string_id: String,
    name: String,
}

#[derive(sqlx::FromRow)]
struct VersionRow {
    id: i32,
    name: String,
    dead: bool,
    rollout: i32,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: i32,
    version_id: i32,
    file_name: String,
    platform: String,
    arch: String,
    file_type: FileType,
    sha1: String,
    sha256: String,
}

#[derive(sqlx::FromRow)]
struct DraftRow {
    id: i32,
    save_string: String,
    cipher_password: String,
    version: String,
    platform: String,
    arch: String,
    date: DateTime<Utc>,
    filenames: Vec<String>,
}

impl VersionRow {
    fn into_version(self, files: &[FileRow]) -> Version {
        Version {
            id: self.id,
            name: self.name,
            dead: self.dead,
            rollout: self.rollout,
            created_at: self.created_at,
            files: files
                .iter()
                .filter(|f| f.version_id == self.id)
                .map(FileRow::to_release_file)
                .collect(),
        }
    }
}

impl FileRow {
    fn to_release_file(&self) -> ReleaseFile {
        ReleaseFile {
            id: Some(self.id),
            file_name: self.file_name.clone(),
            platform: self.platform.clone(),
            arch: self.arch.clone(),
            file_type: self.file_type,
            sha1: self.sha1.clone(),
            sha256: self.sha256.clone(),
        }
    }
}

impl From<DraftRow> for TemporarySave {
    fn from(row: DraftRow) -> Self {
        TemporarySave {
            id: row.id,
            save_string: row.save_string,
            cipher_password: row.cipher_password,
            version: row.version,
            platform: row.platform,
            arch: row.arch,
            date: row.date,
            filenames: row.filenames,
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Postgres-backed catalog. The schema lives in `migrations/` and is applied
/// on connect.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        sqlx::migrate!().run(&pool).await?;
        info!("catalog migrations applied");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolves the public channel id of an app into its row id.
    async fn channel_pk(&self, app_id: i32, channel_id: &str) -> Result<i32> {
        let id: Option<i32> =
            sqlx::query_scalar("SELECT id FROM channel WHERE app_id = $1 AND string_id = $2")
                .bind(app_id)
                .bind(channel_id)
                .fetch_optional(&self.pool)
                .await?;
        id.ok_or_else(|| Error::NotFound(format!("channel {channel_id}")))
    }

    async fn load_versions(&self, channel_pk: i32) -> Result<Vec<Version>> {
        let rows = sqlx::query_as::<_, VersionRow>(
            "SELECT id, name, dead, rollout, created_at FROM version
             WHERE channel_id = $1 ORDER BY id",
        )
        .bind(channel_pk)
        .fetch_all(&self.pool)
        .await?;

        let files = sqlx::query_as::<_, FileRow>(
            "SELECT f.id, f.version_id, f.file_name, f.platform, f.arch, f.file_type, f.sha1, f.sha256
             FROM file f JOIN version v ON v.id = f.version_id
             WHERE v.channel_id = $1 ORDER BY f.id",
        )
        .bind(channel_pk)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|v| v.into_version(&files)).collect())
    }

    async fn load_version(&self, channel_pk: i32, name: &str) -> Result<Option<Version>> {
        let row = sqlx::query_as::<_, VersionRow>(
            "SELECT id, name, dead, rollout, created_at FROM version
             WHERE channel_id = $1 AND name = $2",
        )
        .bind(channel_pk)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let files = sqlx::query_as::<_, FileRow>(
            "SELECT id, version_id, file_name, platform, arch, file_type, sha1, sha256
             FROM file WHERE version_id = $1 ORDER BY id",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.into_version(&files)))
    }

    async fn load_app(&self, row: AppRow) -> Result<App> {
        let team: Vec<String> = sqlx::query_scalar(
            "SELECT username FROM team_member WHERE app_id = $1 ORDER BY username",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        let channel_rows = sqlx::query_as::<_, ChannelRow>(
            "SELECT id, string_id, name FROM channel WHERE app_id = $1 ORDER BY id",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        let mut channels = Vec::with_capacity(channel_rows.len());
        for channel in channel_rows {
            channels.push(Channel {
                versions: self.load_versions(channel.id).await?,
                id: channel.string_id,
                name: channel.name,
            });
        }

        Ok(App {
            id: row.id,
            name: row.name,
            slug: row.slug,
            token: row.token,
            team,
            channels,
        })
    }

    async fn updated_version(
        &self,
        channel_pk: i32,
        version: &str,
        result: sqlx::postgres::PgQueryResult,
    ) -> Result<Version> {
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("version {version}")));
        }
        self.load_version(channel_pk, version)
            .await?
            .ok_or_else(|| Error::NotFound(format!("version {version}")))
    }
}

#[async_trait]
impl ReleaseCatalog for PgCatalog {
    async fn create_app(&self, name: &str, team: &[String]) -> Result<App> {
        let mut tx = self.pool.begin().await?;

        let slugs: Vec<String> = sqlx::query_scalar("SELECT slug FROM app")
            .fetch_all(&mut *tx)
            .await?;
        let slug = policy::unique_slug(name, slugs.iter().map(String::as_str));

        let row = sqlx::query_as::<_, AppRow>(
            "INSERT INTO app (name, slug, token) VALUES ($1, $2, $3)
             RETURNING id, name, slug, token",
        )
        .bind(name)
        .bind(&slug)
        .bind(Uuid::new_v4().to_string())
        .fetch_one(&mut *tx)
        .await?;

        for member in team {
            sqlx::query("INSERT INTO team_member (app_id, username) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(row.id)
                .bind(member)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(app = %slug, "created app");
        self.load_app(row).await
    }

    async fn get_app(&self, app_id: i32) -> Result<Option<App>> {
        let row = sqlx::query_as::<_, AppRow>("SELECT id, name, slug, token FROM app WHERE id = $1")
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.load_app(row).await?)),
            None => Ok(None),
        }
    }

    async fn get_app_by_slug(&self, slug: &str) -> Result<Option<App>> {
        let row =
            sqlx::query_as::<_, AppRow>("SELECT id, name, slug, token FROM app WHERE slug = $1")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some(row) => Ok(Some(self.load_app(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_apps(&self) -> Result<Vec<App>> {
        let rows = sqlx::query_as::<_, AppRow>("SELECT id, name, slug, token FROM app ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let mut apps = Vec::with_capacity(rows.len());
        for row in rows {
            apps.push(self.load_app(row).await?);
        }
        Ok(apps)
    }

    async fn set_team(&self, app_id: i32, team: &[String]) -> Result<App> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, AppRow>("SELECT id, name, slug, token FROM app WHERE id = $1")
            .bind(app_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound(format!("app {app_id}")))?;

        sqlx::query("DELETE FROM team_member WHERE app_id = $1")
            .bind(app_id)
            .execute(&mut *tx)
            .await?;
        for member in team {
            sqlx::query("INSERT INTO team_member (app_id, username) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(app_id)
                .bind(member)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        self.load_app(row).await
    }

    async fn create_channel(&self, app_id: i32, name: &str) -> Result<Channel> {
        let row = sqlx::query_as::<_, ChannelRow>(
            "INSERT INTO channel (string_id, app_id, name)
             SELECT $1, id, $3 FROM app WHERE id = $2
             RETURNING id, string_id, name",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(app_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("app {app_id}")))?;

        Ok(Channel {
            id: row.string_id,
            name: row.name,
            versions: Vec::new(),
        })
    }

    async fn get_channel(&self, app_id: i32, channel_id: &str) -> Result<Option<Channel>> {
        let row = sqlx::query_as::<_, ChannelRow>(
            "SELECT id, string_id, name FROM channel WHERE app_id = $1 AND string_id = $2",
        )
        .bind(app_id)
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Channel {
            versions: self.load_versions(row.id).await?,
            id: row.string_id,
            name: row.name,
        }))
    }

    async fn create_version(
        &self,
        app_id: i32,
        channel_id: &str,
        name: &str,
        rollout: i32,
    ) -> Result<Version> {
        let rollout = policy::validate_rollout(rollout)?;
        let channel_pk = self.channel_pk(app_id, channel_id).await?;

        let row = sqlx::query_as::<_, VersionRow>(
            "INSERT INTO version (channel_id, name, rollout) VALUES ($1, $2, $3)
             RETURNING id, name, dead, rollout, created_at",
        )
        .bind(channel_pk)
        .bind(name)
        .bind(rollout)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                Error::Invalid(format!("version {name} already exists"))
            } else {
                err.into()
            }
        })?;

        Ok(row.into_version(&[]))
    }

    async fn get_version(
        &self,
        app_id: i32,
        channel_id: &str,
        name: &str,
    ) -> Result<Option<Version>> {
        let channel_pk = match self.channel_pk(app_id, channel_id).await {
            Ok(pk) => pk,
            Err(Error::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        self.load_version(channel_pk, name).await
    }

    async fn add_files(
        &self,
        app_id: i32,
        channel_id: &str,
        version: &str,
        files: Vec<ReleaseFile>,
    ) -> Result<Vec<ReleaseFile>> {
        let channel_pk = self.channel_pk(app_id, channel_id).await?;
        let mut tx = self.pool.begin().await?;

        let version_id: i32 =
            sqlx::query_scalar("SELECT id FROM version WHERE channel_id = $1 AND name = $2")
                .bind(channel_pk)
                .bind(version)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| Error::NotFound(format!("version {version}")))?;

        let mut stored = Vec::new();
        for mut file in files {
            let id: Option<i32> = sqlx::query_scalar(
                "INSERT INTO file (version_id, file_name, platform, arch, file_type, sha1, sha256)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (version_id, file_name, platform, arch) DO NOTHING
                 RETURNING id",
            )
            .bind(version_id)
            .bind(&file.file_name)
            .bind(&file.platform)
            .bind(&file.arch)
            .bind(file.file_type)
            .bind(&file.sha1)
            .bind(&file.sha256)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(id) = id {
                file.id = Some(id);
                stored.push(file);
            }
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn set_rollout(
        &self,
        app_id: i32,
        channel_id: &str,
        version: &str,
        rollout: i32,
    ) -> Result<Version> {
        let rollout = policy::validate_rollout(rollout)?;
        let channel_pk = self.channel_pk(app_id, channel_id).await?;
        let result =
            sqlx::query("UPDATE version SET rollout = $3 WHERE channel_id = $1 AND name = $2")
                .bind(channel_pk)
                .bind(version)
                .bind(rollout)
                .execute(&self.pool)
                .await?;
        self.updated_version(channel_pk, version, result).await
    }

    async fn set_dead(
        &self,
        app_id: i32,
        channel_id: &str,
        version: &str,
        dead: bool,
    ) -> Result<Version> {
        let channel_pk = self.channel_pk(app_id, channel_id).await?;
        let result =
            sqlx::query("UPDATE version SET dead = $3 WHERE channel_id = $1 AND name = $2")
                .bind(channel_pk)
                .bind(version)
                .bind(dead)
                .execute(&self.pool)
                .await?;
        self.updated_version(channel_pk, version, result).await
    }

    async fn list_versions(&self, app_id: i32, channel_id: &str) -> Result<Vec<Version>> {
        let channel_pk = self.channel_pk(app_id, channel_id).await?;
        self.load_versions(channel_pk).await
    }

    async fn delete_version(&self, app_id: i32, channel_id: &str, version: &str) -> Result<()> {
        let channel_pk = self.channel_pk(app_id, channel_id).await?;
        let result = sqlx::query("DELETE FROM version WHERE channel_id = $1 AND name = $2")
            .bind(channel_pk)
            .bind(version)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("version {version}")));
        }
        Ok(())
    }

    async fn save_draft(
        &self,
        app_id: i32,
        channel_id: &str,
        draft: NewTemporarySave,
    ) -> Result<TemporarySave> {
        let channel_pk = self.channel_pk(app_id, channel_id).await?;
        let row = sqlx::query_as::<_, DraftRow>(
            "INSERT INTO temporary_save
                (channel_id, save_string, cipher_password, version, platform, arch, filenames)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id, save_string, cipher_password, version, platform, arch, date, filenames",
        )
        .bind(channel_pk)
        .bind(&draft.save_string)
        .bind(&draft.cipher_password)
        .bind(&draft.version)
        .bind(&draft.platform)
        .bind(&draft.arch)
        .bind(&draft.filenames)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get_draft(
        &self,
        app_id: i32,
        channel_id: &str,
        id: i32,
    ) -> Result<Option<TemporarySave>> {
        let row = sqlx::query_as::<_, DraftRow>(
            "SELECT t.id, t.save_string, t.cipher_password, t.version, t.platform, t.arch, t.date, t.filenames
             FROM temporary_save t JOIN channel c ON c.id = t.channel_id
             WHERE c.app_id = $1 AND c.string_id = $2 AND t.id = $3",
        )
        .bind(app_id)
        .bind(channel_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_drafts(&self, app_id: i32, channel_id: &str) -> Result<Vec<TemporarySave>> {
        let rows = sqlx::query_as::<_, DraftRow>(
            "SELECT t.id, t.save_string, t.cipher_password, t.version, t.platform, t.arch, t.date, t.filenames
             FROM temporary_save t JOIN channel c ON c.id = t.channel_id
             WHERE c.app_id = $1 AND c.string_id = $2 ORDER BY t.id",
        )
        .bind(app_id)
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_draft(&self, app_id: i32, channel_id: &str, id: i32) -> Result<()> {
        sqlx::query(
            "DELETE FROM temporary_save t USING channel c
             WHERE c.id = t.channel_id AND c.app_id = $1 AND c.string_id = $2 AND t.id = $3",
        )
        .bind(app_id)
        .bind(channel_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
