use crate::api::lastfm::LastfmClient;
use crate::canvas::export::{self, RenderPlan};
use crate::canvas::{Canvas, CanvasEdit, CanvasSnapshot, EditOutcome, ImageChange, ImageSource};
use crate::db::models::StoredImage;
use crate::error::CollageError;
use crate::service::album_query::{AlbumQuery, AlbumQueryView, AlbumRequest};
use crate::service::image_store::PersistentImages;
use crate::types::canvas::{CanvasSize, ImageId, LayerId, Position};
use crate::types::lastfm::{Album, Period, TopAlbumsResponse};

use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A named upload, already decoded.
pub type DecodedFile = (String, ImageSource);

/// Messages handled by the canvas actor.
#[derive(Debug)]
pub enum CanvasMessage {
    /// Apply one edit and persist whatever it changed.
    Edit(CanvasEdit, RpcReplyPort<Result<EditOutcome, CollageError>>),
    /// Place decoded files on a layer (default: selected), cascading from a start point.
    AddImages(
        Vec<DecodedFile>,
        Option<LayerId>,
        Position,
        RpcReplyPort<Result<Vec<ImageId>, CollageError>>,
    ),
    Snapshot(RpcReplyPort<CanvasSnapshot>),
    RenderPlan(RpcReplyPort<RenderPlan>),
    Blob(ImageId, RpcReplyPort<Option<ImageSource>>),
    Session(RpcReplyPort<SessionInfo>),

    SetAlbumQuery(Option<String>, Option<Period>, RpcReplyPort<AlbumQueryView>),
    /// Check the rate limit and stamp a new request.
    BeginAlbumFetch(RpcReplyPort<Result<AlbumRequest, CollageError>>),
    /// A fetch finished; applied only if it is the latest one.
    AlbumsFetched(u64, Option<TopAlbumsResponse>, RpcReplyPort<AlbumQueryView>),
    Albums(RpcReplyPort<AlbumQueryView>),
    Album(u32, RpcReplyPort<Option<Album>>),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Nothing was stored when the service started.
    pub is_new: bool,
    pub image_count: usize,
    pub layer_count: usize,
    pub stored_count: usize,
    pub canvas: CanvasSize,
}

pub struct CanvasActorArgs {
    pub store: PersistentImages,
    pub size: CanvasSize,
    pub album_cooldown: Duration,
}

/// Handle for interacting with the canvas actor.
#[derive(Clone)]
pub struct CanvasHandle {
    actor: ActorRef<CanvasMessage>,
}

fn rpc_err(op: &str, e: impl std::fmt::Display) -> CollageError {
    CollageError::Actor(format!("{op} RPC failed: {e}"))
}

impl CanvasHandle {
    pub async fn edit(&self, edit: CanvasEdit) -> Result<EditOutcome, CollageError> {
        ractor::call!(self.actor, CanvasMessage::Edit, edit).map_err(|e| rpc_err("Edit", e))?
    }

    /// Decode uploads off the async runtime, then place them.
    pub async fn add_images(
        &self,
        files: Vec<(String, Vec<u8>)>,
        layer_id: Option<LayerId>,
        start: Position,
    ) -> Result<Vec<ImageId>, CollageError> {
        let decoded = decode_files(files).await?;
        ractor::call!(self.actor, CanvasMessage::AddImages, decoded, layer_id, start)
            .map_err(|e| rpc_err("AddImages", e))?
    }

    pub async fn snapshot(&self) -> Result<CanvasSnapshot, CollageError> {
        ractor::call!(self.actor, CanvasMessage::Snapshot).map_err(|e| rpc_err("Snapshot", e))
    }

    pub async fn render_plan(&self) -> Result<RenderPlan, CollageError> {
        ractor::call!(self.actor, CanvasMessage::RenderPlan).map_err(|e| rpc_err("RenderPlan", e))
    }

    /// Rasterize the current canvas to PNG on the blocking pool.
    pub async fn export_png(&self, pixel_ratio: f64) -> Result<Vec<u8>, CollageError> {
        let plan = self.render_plan().await?;
        tokio::task::spawn_blocking(move || export::render_png(&plan, pixel_ratio))
            .await
            .map_err(|e| CollageError::Actor(format!("export task failed: {e}")))?
    }

    pub async fn blob(&self, id: ImageId) -> Result<ImageSource, CollageError> {
        ractor::call!(self.actor, CanvasMessage::Blob, id.clone())
            .map_err(|e| rpc_err("Blob", e))?
            .ok_or(CollageError::ImageNotFound(id))
    }

    pub async fn session(&self) -> Result<SessionInfo, CollageError> {
        ractor::call!(self.actor, CanvasMessage::Session).map_err(|e| rpc_err("Session", e))
    }

    pub async fn set_album_query(
        &self,
        username: Option<String>,
        period: Option<Period>,
    ) -> Result<AlbumQueryView, CollageError> {
        ractor::call!(self.actor, CanvasMessage::SetAlbumQuery, username, period)
            .map_err(|e| rpc_err("SetAlbumQuery", e))
    }

    pub async fn albums(&self) -> Result<AlbumQueryView, CollageError> {
        ractor::call!(self.actor, CanvasMessage::Albums).map_err(|e| rpc_err("Albums", e))
    }

    /// Run one rate-limited fetch. The HTTP call happens outside the actor so
    /// edits keep flowing while it is in flight.
    pub async fn fetch_albums(&self, client: &LastfmClient) -> Result<AlbumQueryView, CollageError> {
        let request = ractor::call!(self.actor, CanvasMessage::BeginAlbumFetch)
            .map_err(|e| rpc_err("BeginAlbumFetch", e))??;
        let result = client
            .get_top_albums(&request.username, request.period)
            .await;
        ractor::call!(
            self.actor,
            CanvasMessage::AlbumsFetched,
            request.generation,
            result
        )
        .map_err(|e| rpc_err("AlbumsFetched", e))
    }

    /// Download the artwork of a fetched album and place it on the canvas.
    pub async fn place_album(
        &self,
        client: &LastfmClient,
        rank: u32,
        layer_id: Option<LayerId>,
        pos: Position,
    ) -> Result<ImageId, CollageError> {
        let album = ractor::call!(self.actor, CanvasMessage::Album, rank)
            .map_err(|e| rpc_err("Album", e))?
            .ok_or(CollageError::AlbumNotFound(rank))?;
        let artwork = album
            .largest_image()
            .ok_or(CollageError::MissingArtwork)?;
        let bytes = client.download_artwork(artwork).await?;

        let ids = self
            .add_images(vec![(album.display_name(), bytes)], layer_id, pos)
            .await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| CollageError::Actor("album placement produced no image".to_string()))
    }
}

async fn decode_files(files: Vec<(String, Vec<u8>)>) -> Result<Vec<DecodedFile>, CollageError> {
    tokio::task::spawn_blocking(move || {
        files
            .into_iter()
            .map(|(name, bytes)| ImageSource::decode(bytes).map(|src| (name, src)))
            .collect::<Result<Vec<_>, _>>()
    })
    .await
    .map_err(|e| CollageError::Actor(format!("decode task failed: {e}")))?
}

/// Internal state held by the canvas actor.
struct CanvasActorState {
    canvas: Canvas,
    store: PersistentImages,
    albums: AlbumQuery,
    is_new: bool,
}

/// The single owner of editor state; every mutation goes through here.
struct CanvasActor;

#[ractor::async_trait]
impl Actor for CanvasActor {
    type Msg = CanvasMessage;
    type State = CanvasActorState;
    type Arguments = CanvasActorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let CanvasActorArgs {
            mut store,
            size,
            album_cooldown,
        } = args;

        let records = store
            .load()
            .await
            .map_err(|e| ActorProcessingErr::from(format!("Image store load failed: {e}")))?;
        let is_new = store.is_empty();

        let mut state = CanvasActorState {
            canvas: Canvas::new(size),
            store,
            albums: AlbumQuery::new(album_cooldown),
            is_new,
        };
        restore(&mut state, records).await;
        persist_changes(&mut state)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("Image store sync failed: {e}")))?;

        info!(
            images = state.canvas.images().len(),
            is_new, "CanvasActor started"
        );
        Ok(state)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            CanvasMessage::Edit(edit, rp) => {
                let result = self.handle_edit(state, edit).await;
                let _ = rp.send(result);
            }
            CanvasMessage::AddImages(files, layer_id, start, rp) => {
                let count = files.len();
                let result = match state.canvas.add_images_from_files(files, layer_id, start) {
                    Ok(ids) => persist_changes(state).await.map(|_| ids),
                    Err(e) => Err(e),
                };
                if result.is_ok() {
                    info!(count, "images uploaded");
                }
                let _ = rp.send(result);
            }
            CanvasMessage::Snapshot(rp) => {
                let _ = rp.send(state.canvas.snapshot());
            }
            CanvasMessage::RenderPlan(rp) => {
                let _ = rp.send(state.canvas.render_plan());
            }
            CanvasMessage::Blob(id, rp) => {
                let _ = rp.send(state.canvas.source_of(&id));
            }
            CanvasMessage::Session(rp) => {
                let _ = rp.send(SessionInfo {
                    is_new: state.is_new,
                    image_count: state.canvas.images().len(),
                    layer_count: state.canvas.layers().len(),
                    stored_count: state.store.len(),
                    canvas: state.canvas.size(),
                });
            }
            CanvasMessage::SetAlbumQuery(username, period, rp) => {
                if let Some(username) = username {
                    state.albums.set_username(username);
                }
                if let Some(period) = period {
                    state.albums.set_period(period);
                }
                let _ = rp.send(state.albums.view());
            }
            CanvasMessage::BeginAlbumFetch(rp) => {
                let result = state.albums.begin_request(Utc::now());
                if let Err(e) = &result {
                    debug!(error = %e, "album fetch refused");
                }
                let _ = rp.send(result);
            }
            CanvasMessage::AlbumsFetched(generation, result, rp) => {
                if state.albums.complete(generation, result) {
                    info!(
                        count = state.albums.albums().len(),
                        user = %state.albums.username(),
                        "albums updated"
                    );
                }
                let _ = rp.send(state.albums.view());
            }
            CanvasMessage::Albums(rp) => {
                let _ = rp.send(state.albums.view());
            }
            CanvasMessage::Album(rank, rp) => {
                let _ = rp.send(state.albums.find(rank).cloned());
            }
        }
        Ok(())
    }
}

impl CanvasActor {
    async fn handle_edit(
        &self,
        state: &mut CanvasActorState,
        edit: CanvasEdit,
    ) -> Result<EditOutcome, CollageError> {
        let clear_all = matches!(edit, CanvasEdit::ClearImages);
        let outcome = state.canvas.apply(edit)?;

        if clear_all {
            // Bulk delete goes through the store's own clear.
            state.canvas.take_changes();
            let report = state.store.clear_all().await?;
            if !report.failed.is_empty() {
                warn!(failed = ?report.failed, "some stored images survived clear");
            }
        } else {
            persist_changes(state).await?;
        }
        Ok(outcome)
    }
}

/// Put stored images back on the canvas. Undecodable blobs are skipped.
async fn restore(state: &mut CanvasActorState, records: Vec<StoredImage>) {
    if records.is_empty() {
        return;
    }
    let decoded = tokio::task::spawn_blocking(move || {
        records
            .into_iter()
            .filter_map(|r| match ImageSource::decode(r.blob) {
                Ok(src) => Some((r.data, r.z, src)),
                Err(e) => {
                    warn!(image_id = %r.id, error = %e, "skipping undecodable stored image");
                    None
                }
            })
            .collect::<Vec<_>>()
    })
    .await;

    let decoded = match decoded {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "restore task failed");
            return;
        }
    };
    for (snapshot, stored_z, src) in decoded {
        let id = snapshot.id.clone();
        if !state.canvas.restore_image(snapshot, src) {
            warn!(image_id = %id, "stored image not restored");
            continue;
        }
        // Skipped records leave gaps; rewrite indices that moved.
        if state.canvas.z_index(&id).map(|z| z as i64) != Some(stored_z) {
            state.canvas.touch_image(&id);
        }
    }
}

/// Write every pending change through to the durable store. On failure the
/// unwritten changes go back on the canvas queue and are retried with the
/// next write.
async fn persist_changes(state: &mut CanvasActorState) -> Result<(), CollageError> {
    let mut pending = state.canvas.take_changes().into_iter();
    while let Some(change) = pending.next() {
        if let Err(e) = write_change(&state.canvas, &mut state.store, &change).await {
            error!(?change, error = %e, "image store write failed");
            let mut unwritten = vec![change];
            unwritten.extend(pending.by_ref());
            state.canvas.requeue_changes(unwritten);
            return Err(e);
        }
    }
    Ok(())
}

async fn write_change(
    canvas: &Canvas,
    store: &mut PersistentImages,
    change: &ImageChange,
) -> Result<(), CollageError> {
    match change {
        ImageChange::Removed(id) => store.delete_image(id).await.map(|_| ()),
        ImageChange::Created(id) | ImageChange::Updated(id) => {
            let (Some(img), Some(z)) = (canvas.image(id), canvas.z_index(id)) else {
                return Ok(());
            };
            if matches!(change, ImageChange::Updated(_))
                && store.contains(id)
                && store.update_snapshot(&img.snapshot(), z).await?
            {
                return Ok(());
            }
            store.save_image(&StoredImage::new(img, z)).await
        }
    }
}

/// Spawn the canvas actor and return a handle.
pub async fn spawn(args: CanvasActorArgs) -> Result<CanvasHandle, CollageError> {
    let (actor, _jh) = Actor::spawn(None, CanvasActor, args)
        .await
        .map_err(|e| CollageError::Actor(format!("failed to spawn CanvasActor: {e}")))?;
    Ok(CanvasHandle { actor })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::source::test_support::solid;
    use crate::types::canvas::NewImage;
    use sqlx::sqlite::SqlitePoolOptions;

    fn temp_db() -> (String, std::path::PathBuf) {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "collage-actor-{}-{}.sqlite",
            std::process::id(),
            ulid::Ulid::new()
        ));
        (format!("sqlite:{}", path.display()), path)
    }

    async fn state_for(url: &str) -> CanvasActorState {
        CanvasActorState {
            canvas: Canvas::default(),
            store: PersistentImages::open(url).await.unwrap(),
            albums: AlbumQuery::new(Duration::ZERO),
            is_new: true,
        }
    }

    #[tokio::test]
    async fn failed_write_keeps_changes_queued() {
        let (url, path) = temp_db();
        let mut state = state_for(&url).await;
        let id = state
            .canvas
            .add_image(NewImage::default(), solid(2, 2, [0, 0, 255, 255]))
            .unwrap();

        let raw = SqlitePoolOptions::new().connect(&url).await.unwrap();
        sqlx::query("DROP TABLE kv_images").execute(&raw).await.unwrap();
        assert!(persist_changes(&mut state).await.is_err());

        // Reopening recreates the table; the queued create is written next time.
        PersistentImages::open(&url).await.unwrap();
        persist_changes(&mut state).await.unwrap();

        let records = PersistentImages::open(&url)
            .await
            .unwrap()
            .load()
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn reorder_is_written_as_z_index() {
        let (url, path) = temp_db();
        let mut state = state_for(&url).await;
        let red = solid(1, 1, [255, 0, 0, 255]);
        let a = state.canvas.add_image(NewImage::default(), red.clone()).unwrap();
        let b = state.canvas.add_image(NewImage::default(), red).unwrap();
        persist_changes(&mut state).await.unwrap();

        state
            .canvas
            .apply(CanvasEdit::ReorderImage {
                id: b.clone(),
                order: crate::types::canvas::ZOrder::Back,
            })
            .unwrap();
        persist_changes(&mut state).await.unwrap();

        let order: Vec<_> = PersistentImages::open(&url)
            .await
            .unwrap()
            .load()
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.id, r.z))
            .collect();
        assert_eq!(order, vec![(b, 0), (a, 1)]);
        let _ = std::fs::remove_file(&path);
    }
}
