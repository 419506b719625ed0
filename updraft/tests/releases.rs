use assert_matches::assert_matches;
use bytes::Bytes;
use common::{positioner, store, text};
use models::app::{App, Channel};
use std::sync::Arc;
use updraft::Error;
use updraft::catalog::{InMemoryCatalog, ReleaseCatalog};
use updraft::releases::{DraftFile, ReleaseManager};
use updraft::storage::{BlobStore, MemoryStore};

mod common;

struct Harness {
    store: Arc<MemoryStore>,
    catalog: Arc<InMemoryCatalog>,
    manager: ReleaseManager,
    app: App,
    channel: Channel,
}

impl Harness {
    async fn new() -> Self {
        let store = store();
        let catalog = Arc::new(InMemoryCatalog::new());
        let app = catalog.create_app("Fake Slug", &[]).await.unwrap();
        let channel = catalog.create_channel(app.id, "stable").await.unwrap();
        let manager = ReleaseManager::new(catalog.clone(), positioner(&store), 0);
        Self {
            store,
            catalog,
            manager,
            app,
            channel,
        }
    }

    fn key(&self, rest: &str) -> String {
        format!("{}/{}/{rest}", self.app.slug, self.channel.id)
    }

    async fn release(&self, version: &str, files: &[(&str, &'static str)]) -> Vec<String> {
        let files = files
            .iter()
            .map(|(name, data)| DraftFile {
                file_name: name.to_string(),
                data: Bytes::from_static(data.as_bytes()),
            })
            .collect();
        let draft = self
            .manager
            .stage_draft(self.app.id, &self.channel.id, version, "win32", "x64", files)
            .await
            .unwrap();
        self.manager
            .release_draft(self.app.id, &self.channel.id, draft.id)
            .await
            .unwrap()
    }

    async fn version_names(&self) -> Vec<String> {
        self.catalog
            .list_versions(self.app.id, &self.channel.id)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.name)
            .collect()
    }

    async fn lock_holder(&self) -> Option<String> {
        self.manager
            .positioner()
            .lock()
            .holder(&self.app.slug)
            .await
            .unwrap()
    }

    async fn create_versions(&self, names: &[&str]) {
        for name in names {
            self.catalog
                .create_version(self.app.id, &self.channel.id, name, 100)
                .await
                .unwrap();
        }
    }
}

#[tokio::test]
async fn staged_drafts_are_encrypted() {
    let h = Harness::new().await;
    let draft = h
        .manager
        .stage_draft(h.app.id, &h.channel.id, "1.0.0", "win32", "x64", vec![DraftFile {
            file_name: "Setup.exe".to_string(),
            data: Bytes::from_static(b"my exe"),
        }])
        .await
        .unwrap();

    assert_eq!(draft.filenames, ["Setup.exe"]);
    let sealed = h
        .store
        .contents(&h.key(&format!("_drafts/{}/Setup.exe", draft.save_string)))
        .await
        .unwrap();
    assert_ne!(sealed.as_ref(), b"my exe");
    assert!(h.version_names().await.is_empty());
}

#[tokio::test]
async fn staging_rejects_bad_input() {
    let h = Harness::new().await;
    let stage = |version: &'static str, name: &'static str| {
        h.manager
            .stage_draft(h.app.id, &h.channel.id, version, "win32", "x64", vec![DraftFile {
                file_name: name.to_string(),
                data: Bytes::from_static(b"x"),
            }])
    };
    assert_matches!(stage("", "a.exe").await, Err(Error::Invalid(_)));
    assert_matches!(stage("1.0.0", "../a.exe").await, Err(Error::Invalid(_)));
    assert_matches!(
        h.manager
            .stage_draft(h.app.id, &h.channel.id, "1.0.0", "win32", "x64", vec![])
            .await,
        Err(Error::Invalid(_))
    );
}

#[tokio::test]
async fn released_draft_is_positioned() {
    let h = Harness::new().await;
    let stored = h
        .release("1.0.0", &[("thing-full.nupkg", "my nupkg"), ("Setup.exe", "my exe")])
        .await;
    assert_eq!(stored, ["thing-full.nupkg", "Setup.exe"]);

    let version = h
        .catalog
        .get_version(h.app.id, &h.channel.id, "1.0.0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(version.rollout, 100);
    assert_eq!(version.files.len(), 2);

    assert_eq!(
        text(&h.store, &h.key("win32/x64/RELEASES")).await,
        format!(
            "0F2320FC3B29E1CD9F989DBF547BCD4D21D3BD12 https://foo.bar/{} 8",
            h.key("win32/x64/thing-full.nupkg")
        )
    );
    assert_eq!(text(&h.store, &h.key("win32/x64/Setup.exe")).await, "my exe");
    assert_eq!(text(&h.store, &h.key("latest/win32/x64/Fake Slug.exe.ref")).await, "1.0.0");
    assert!(h.store.contents(&h.key("versions.json")).await.is_some());

    assert!(h.store.keys().await.iter().all(|k| !k.contains("/_drafts/")));
    assert!(
        h.catalog
            .list_drafts(h.app.id, &h.channel.id)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(h.lock_holder().await, None);
}

#[tokio::test]
async fn later_versions_start_at_default_rollout() {
    let h = Harness::new().await;
    h.release("1.0.0", &[("thing-1.0.0-full.nupkg", "my nupkg")]).await;
    h.release("1.1.0", &[("thing-1.1.0-full.nupkg", "my delta nupkg")]).await;

    let staged = h
        .catalog
        .get_version(h.app.id, &h.channel.id, "1.1.0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(staged.rollout, 0);

    let lines = |text: String| text.lines().count();
    assert_eq!(lines(text(&h.store, &h.key("win32/x64/RELEASES")).await), 2);
    assert_eq!(lines(text(&h.store, &h.key("win32/x64/RELEASES-0")).await), 1);

    let version = h
        .manager
        .set_rollout(h.app.id, &h.channel.id, "1.1.0", 100)
        .await
        .unwrap();
    assert_eq!(version.rollout, 100);
    assert_eq!(lines(text(&h.store, &h.key("win32/x64/RELEASES-0")).await), 2);
    assert_eq!(h.lock_holder().await, None);
}

#[tokio::test]
async fn dead_versions_lose_latest() {
    let h = Harness::new().await;
    h.release("1.0.0", &[("Setup-1.0.0.exe", "old exe")]).await;
    h.release("1.1.0", &[("Setup-1.1.0.exe", "new exe")]).await;
    h.manager
        .set_rollout(h.app.id, &h.channel.id, "1.1.0", 100)
        .await
        .unwrap();
    let latest = h.key("latest/win32/x64/Fake Slug.exe");
    assert_eq!(text(&h.store, &latest).await, "new exe");

    h.manager
        .set_dead(h.app.id, &h.channel.id, "1.1.0", true)
        .await
        .unwrap();
    assert_eq!(text(&h.store, &latest).await, "old exe");
    assert_eq!(text(&h.store, &format!("{latest}.ref")).await, "1.0.0");
}

#[tokio::test]
async fn busy_lock_is_reported() {
    let h = Harness::new().await;
    h.create_versions(&["1.0.0"]).await;
    let token = h
        .manager
        .positioner()
        .request_lock(&h.app)
        .await
        .unwrap()
        .unwrap();

    let err = h
        .manager
        .set_rollout(h.app.id, &h.channel.id, "1.0.0", 50)
        .await
        .unwrap_err();
    assert!(err.is_busy());
    assert_eq!(h.lock_holder().await.as_deref(), Some(token.as_str()));

    assert!(h.manager.positioner().release_lock(&h.app, &token).await.unwrap());
    h.manager
        .set_rollout(h.app.id, &h.channel.id, "1.0.0", 50)
        .await
        .unwrap();
}

#[tokio::test]
async fn lock_is_released_after_failure() {
    let h = Harness::new().await;
    assert_matches!(
        h.manager
            .set_rollout(h.app.id, &h.channel.id, "9.9.9", 50)
            .await,
        Err(Error::NotFound(_))
    );
    assert_eq!(h.lock_holder().await, None);

    assert_matches!(
        h.manager
            .set_rollout(h.app.id, &h.channel.id, "9.9.9", 150)
            .await,
        Err(Error::Invalid(_))
    );
}

#[tokio::test]
async fn storage_failure_propagates_and_unlocks() {
    let h = Harness::new().await;
    h.store.fail_writes_under(h.key("win32")).await;
    let draft = h
        .manager
        .stage_draft(h.app.id, &h.channel.id, "1.0.0", "win32", "x64", vec![DraftFile {
            file_name: "thing-full.nupkg".to_string(),
            data: Bytes::from_static(b"my nupkg"),
        }])
        .await
        .unwrap();

    assert_matches!(
        h.manager
            .release_draft(h.app.id, &h.channel.id, draft.id)
            .await,
        Err(Error::Storage(_))
    );
    assert_eq!(h.lock_holder().await, None);
}

#[tokio::test]
async fn old_versions_are_aged() {
    let h = Harness::new().await;
    h.create_versions(&["1.0.0", "1.1.0", "1.2.0", "1.3.0", "1.4.0"])
        .await;

    let aged = h
        .manager
        .mark_old_versions_dead(h.app.id, &h.channel.id)
        .await
        .unwrap();
    assert_eq!(aged, ["1.0.0", "1.1.0"]);

    let dead: Vec<String> = h
        .catalog
        .list_versions(h.app.id, &h.channel.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|v| v.dead)
        .map(|v| v.name)
        .collect();
    assert_eq!(dead, ["1.0.0", "1.1.0"]);
}

#[tokio::test]
async fn retention_deletes_only_old_dead_versions() {
    let h = Harness::new().await;
    h.create_versions(&["1.0.0", "1.1.0", "1.2.0", "1.3.0", "1.4.0"])
        .await;
    for name in ["1.0.0", "1.3.0"] {
        h.catalog
            .set_dead(h.app.id, &h.channel.id, name, true)
            .await
            .unwrap();
        let index = h.key(&format!("_index/{name}/win32/x64/thing.nupkg"));
        h.store.put_file(&index, Bytes::from_static(b"{}"), false).await.unwrap();
    }

    let deleted = h
        .manager
        .delete_old_dead_versions(h.app.id, &h.channel.id, 3)
        .await
        .unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].name, "1.0.0");
    assert_eq!(h.version_names().await, ["1.1.0", "1.2.0", "1.3.0", "1.4.0"]);
    assert!(!h.store.has_file(&h.key("_index/1.0.0/win32/x64/thing.nupkg")).await.unwrap());
    assert!(h.store.has_file(&h.key("_index/1.3.0/win32/x64/thing.nupkg")).await.unwrap());

    let deleted = h
        .manager
        .delete_old_dead_versions(h.app.id, &h.channel.id, 0)
        .await
        .unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(h.version_names().await, ["1.1.0", "1.2.0", "1.4.0"]);
}

#[tokio::test]
async fn drafts_can_be_discarded() {
    let h = Harness::new().await;
    for version in ["1.0.0", "1.1.0"] {
        h.manager
            .stage_draft(h.app.id, &h.channel.id, version, "darwin", "arm64", vec![DraftFile {
                file_name: "mac.zip".to_string(),
                data: Bytes::from_static(b"zip"),
            }])
            .await
            .unwrap();
    }

    assert_eq!(
        h.manager
            .delete_all_drafts(h.app.id, &h.channel.id)
            .await
            .unwrap(),
        2
    );
    assert!(h.store.keys().await.is_empty());
    assert_matches!(
        h.manager.release_draft(h.app.id, &h.channel.id, 1).await,
        Err(Error::NotFound(_))
    );
}

#[tokio::test]
async fn retention_clears_deleted_versions_from_variants() {
    let h = Harness::new().await;
    for name in ["1.0.0", "1.1.0", "1.2.0", "1.3.0"] {
        let package = format!("thing-{name}-full.nupkg");
        h.release(name, &[(package.as_str(), "pkg")]).await;
        h.manager
            .set_rollout(h.app.id, &h.channel.id, name, 100)
            .await
            .unwrap();
    }
    h.manager
        .set_dead(h.app.id, &h.channel.id, "1.0.0", true)
        .await
        .unwrap();

    let variant = h.key("win32/x64/RELEASES-50");
    assert!(!text(&h.store, &variant).await.contains("thing-1.0.0"));

    let deleted = h
        .manager
        .delete_old_dead_versions(h.app.id, &h.channel.id, 3)
        .await
        .unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].name, "1.0.0");

    let canonical = text(&h.store, &h.key("win32/x64/RELEASES")).await;
    assert!(!canonical.contains("thing-1.0.0"));
    assert_eq!(canonical.lines().count(), 3);
    for bucket in [0, 50, 100] {
        let variant = text(&h.store, &h.key(&format!("win32/x64/RELEASES-{bucket}"))).await;
        assert!(!variant.contains("thing-1.0.0"));
        assert_eq!(variant.lines().count(), 3);
    }
    assert_eq!(h.lock_holder().await, None);
}

#[tokio::test]
async fn failed_release_can_be_retried() {
    let h = Harness::new().await;
    h.store.fail_writes_under(h.key("win32")).await;
    let draft = h
        .manager
        .stage_draft(h.app.id, &h.channel.id, "1.0.0", "win32", "x64", vec![DraftFile {
            file_name: "thing-full.nupkg".to_string(),
            data: Bytes::from_static(b"my nupkg"),
        }])
        .await
        .unwrap();
    assert_matches!(
        h.manager
            .release_draft(h.app.id, &h.channel.id, draft.id)
            .await,
        Err(Error::Storage(_))
    );

    h.store.heal_writes().await;
    let stored = h
        .manager
        .release_draft(h.app.id, &h.channel.id, draft.id)
        .await
        .unwrap();
    assert!(stored.is_empty());

    assert_eq!(text(&h.store, &h.key("win32/x64/thing-full.nupkg")).await, "my nupkg");
    assert_eq!(
        text(&h.store, &h.key("win32/x64/RELEASES")).await,
        format!(
            "0F2320FC3B29E1CD9F989DBF547BCD4D21D3BD12 https://foo.bar/{} 8",
            h.key("win32/x64/thing-full.nupkg")
        )
    );
    assert!(
        h.catalog
            .list_drafts(h.app.id, &h.channel.id)
            .await
            .unwrap()
            .is_empty()
    );
}
