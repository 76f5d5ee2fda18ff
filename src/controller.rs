//! The scene controller: one active model slot and everything that touches it.
//!
//! Loads are split in two so the decode can run on whatever executor the host
//! has. [`SceneController::request_load`] issues a generation and returns a
//! [`PendingLoad`]; the host awaits [`PendingLoad::resolve`] and hands the
//! [`LoadResult`] back to [`SceneController::complete_load`]. Only the most
//! recently requested generation is ever attached; earlier results are
//! disposed when they arrive. [`SceneController::load_model`] does all three
//! steps in one `await`.

use std::{future::Future, pin::Pin, sync::Arc};

use instant::{Duration, Instant};
use winit::event::WindowEvent;

use crate::{
    camera::{Camera, CameraPose},
    config::ViewerConfig,
    data_structures::geometry::GeometryContainer,
    error::DecodeError,
    fit::fit,
    render::RenderBackend,
    resources::{FormatDecoder, ModelAsset},
    surface::RenderSurface,
};

#[cfg(not(target_arch = "wasm32"))]
pub type DecodeFuture =
    Pin<Box<dyn Future<Output = Result<GeometryContainer, DecodeError>> + Send + 'static>>;
#[cfg(target_arch = "wasm32")]
pub type DecodeFuture = Pin<Box<dyn Future<Output = Result<GeometryContainer, DecodeError>> + 'static>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    /// A request is in flight. A previously attached model stays drawn meanwhile.
    Loading,
    Attached,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Attached,
    /// Decoded fine but without a single drawable triangle.
    AttachedEmpty,
    /// A newer request was issued before this one resolved; its result was dropped.
    Superseded,
}

/// A decode that has been requested but not awaited yet.
pub struct PendingLoad {
    generation: u64,
    name: String,
    future: DecodeFuture,
    started: Instant,
}

impl PendingLoad {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn resolve(self) -> LoadResult {
        let result = self.future.await;
        LoadResult {
            generation: self.generation,
            name: self.name,
            result,
            elapsed: self.started.elapsed(),
        }
    }
}

#[derive(Debug)]
pub struct LoadResult {
    pub generation: u64,
    pub name: String,
    pub result: Result<GeometryContainer, DecodeError>,
    pub elapsed: Duration,
}

pub struct SceneController<B: RenderBackend> {
    surface: RenderSurface<B>,
    decoder: Arc<FormatDecoder>,
    active: Option<GeometryContainer>,
    generation: u64,
    pending: Option<u64>,
    padding: f32,
}

impl<B: RenderBackend> SceneController<B> {
    pub fn new(backend: B, config: &ViewerConfig, width: u32, height: u32) -> Self {
        Self {
            surface: RenderSurface::new(backend, config, width, height),
            decoder: Arc::new(FormatDecoder::new(config.decoder.clone())),
            active: None,
            generation: 0,
            pending: None,
            padding: config.padding,
        }
    }

    pub fn state(&self) -> SlotState {
        match (self.pending, &self.active) {
            (Some(_), _) => SlotState::Loading,
            (None, Some(_)) => SlotState::Attached,
            (None, None) => SlotState::Empty,
        }
    }

    /// Starts a load and supersedes any load still in flight.
    pub fn request_load(&mut self, asset: ModelAsset) -> PendingLoad {
        self.generation += 1;
        self.pending = Some(self.generation);
        log::info!("loading {} as generation {}", asset.name(), self.generation);

        let decoder = self.decoder.clone();
        let name = asset.name().to_string();
        PendingLoad {
            generation: self.generation,
            name,
            future: Box::pin(async move { decoder.decode(&asset).await }),
            started: Instant::now(),
        }
    }

    /// Like [`request_load`](Self::request_load) but from a format tag. An
    /// unsupported tag fails here, leaving any load in flight untouched.
    pub fn request_load_tagged(
        &mut self,
        name: &str,
        bytes: Vec<u8>,
        tag: &str,
    ) -> Result<PendingLoad, DecodeError> {
        let asset = ModelAsset::new(name, bytes, tag)?;
        Ok(self.request_load(asset))
    }

    /// Publishes a finished decode if it is still the one being waited for.
    ///
    /// On success the new container replaces the active one (whose CPU data is
    /// disposed here and whose GPU model is released on the next frame), the
    /// camera is fitted to it and it starts out visible. On failure nothing
    /// changes except that the slot stops loading.
    pub fn complete_load(&mut self, loaded: LoadResult) -> Result<LoadStatus, DecodeError> {
        if self.pending != Some(loaded.generation) {
            log::debug!(
                "dropping result of superseded load {} (generation {}, latest {})",
                loaded.name,
                loaded.generation,
                self.generation
            );
            if let Ok(container) = loaded.result {
                container.dispose();
            }
            return Ok(LoadStatus::Superseded);
        }
        self.pending = None;

        let mut container = match loaded.result {
            Ok(container) => container,
            Err(err) => {
                log::error!("could not load {}: {}", loaded.name, err);
                return Err(err);
            }
        };

        container.set_visible(true);
        self.surface.attach(&container);
        let empty = container.is_empty();
        if let Some(previous) = self.active.replace(container) {
            previous.dispose();
        }
        let pose = self.refit();

        if empty {
            log::warn!("{} has no drawable geometry", loaded.name);
            Ok(LoadStatus::AttachedEmpty)
        } else {
            log::info!(
                "attached {} in {:?}, camera at distance {:.3}",
                loaded.name,
                loaded.elapsed,
                pose.map_or(0.0, |p| p.distance)
            );
            Ok(LoadStatus::Attached)
        }
    }

    pub async fn load_model(&mut self, asset: ModelAsset) -> Result<LoadStatus, DecodeError> {
        let pending = self.request_load(asset);
        let loaded = pending.resolve().await;
        self.complete_load(loaded)
    }

    /// Returns the new visibility, or `None` when nothing is attached.
    pub fn toggle_visibility(&mut self) -> Option<bool> {
        let visible = self.active.as_mut()?.toggle_visibility();
        self.surface.set_visible(visible);
        Some(visible)
    }

    /// Frames the active model again with the current field of view.
    pub fn refit(&mut self) -> Option<CameraPose> {
        let bounds = *self.active.as_ref()?.bounds();
        let pose = fit(&bounds, self.surface.camera().fovy(), self.padding);
        self.surface.apply_pose(&pose);
        Some(pose)
    }

    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        self.surface.resize(width, height)
    }

    pub fn frame(&mut self) -> Result<(), wgpu::SurfaceError> {
        self.surface.frame()
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        self.surface.handle_window_event(event)
    }

    /// Disposes the active model (GPU side first) and then the surface.
    pub fn shutdown(mut self) {
        self.pending = None;
        self.surface.release_attached();
        if let Some(container) = self.active.take() {
            container.dispose();
        }
        self.surface.dispose();
    }

    pub fn active(&self) -> Option<&GeometryContainer> {
        self.active.as_ref()
    }

    pub fn camera(&self) -> &Camera {
        self.surface.camera()
    }

    pub fn surface(&self) -> &RenderSurface<B> {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut RenderSurface<B> {
        &mut self.surface
    }

    pub fn decoder(&self) -> &FormatDecoder {
        &self.decoder
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
