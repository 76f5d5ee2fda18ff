//! Window and event loop.
//!
//! The [`App`] owns the scene controller once the GPU context exists and maps
//! winit events onto it:
//!
//! - resize events resize the surface
//! - every redraw runs one controller frame and schedules the next one
//! - left-drag and the mouse wheel orbit and zoom
//! - `V` toggles the model, `F` frames it again
//! - dropping a file onto the window loads it (natively)
//! - on the web, the page hands picked files to [`load_model`]
//! - closing the window shuts the controller down
//!
//! Decoding runs off the event loop (a tokio runtime natively,
//! `spawn_local` on the web); the result comes back as a [`ViewerEvent`].

use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::Key,
    window::Window,
};

use crate::{
    config::ViewerConfig,
    context::Context,
    controller::{LoadResult, LoadStatus, PendingLoad, SceneController},
    error::DecodeError,
    resources::ModelAsset,
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub enum ViewerEvent {
    /// The GPU context finished initializing (web only, natively it is awaited in place).
    #[allow(dead_code)]
    Initialized(Box<Context>),
    /// A model handed in from outside the event loop (the web page).
    Open(ModelAsset),
    Decoded(LoadResult),
}

/// Checks the tag before anything is queued, so an unsupported file never
/// disturbs the model on screen.
pub fn open_request(name: &str, bytes: Vec<u8>, tag: &str) -> Result<ViewerEvent, DecodeError> {
    ModelAsset::new(name, bytes, tag).map(ViewerEvent::Open)
}

impl std::fmt::Debug for ViewerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized(_) => f.write_str("Initialized"),
            Self::Open(asset) => f.debug_tuple("Open").field(&asset.name()).finish(),
            Self::Decoded(loaded) => f
                .debug_struct("Decoded")
                .field("generation", &loaded.generation)
                .field("name", &loaded.name)
                .finish(),
        }
    }
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: EventLoopProxy<ViewerEvent>,
    config: ViewerConfig,
    controller: Option<SceneController<Context>>,
    // Loaded as soon as the controller exists
    queued: Option<ModelAsset>,
}

impl App {
    fn new(
        event_loop: &EventLoop<ViewerEvent>,
        config: ViewerConfig,
        initial: Option<ModelAsset>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            proxy: event_loop.create_proxy(),
            config,
            controller: None,
            queued: initial,
        })
    }

    fn window(&self) -> Option<&Arc<Window>> {
        self.controller
            .as_ref()
            .map(|controller| controller.surface().backend().window())
    }

    fn attach_context(&mut self, ctx: Context) {
        let size = ctx.window().inner_size();
        let window = ctx.window().clone();
        self.controller = Some(SceneController::new(
            ctx,
            &self.config,
            size.width,
            size.height,
        ));
        if let Some(asset) = self.queued.take() {
            self.load(asset);
        }
        window.request_redraw();
    }

    fn load(&mut self, asset: ModelAsset) {
        let Some(controller) = &mut self.controller else {
            self.queued = Some(asset);
            return;
        };
        let pending = controller.request_load(asset);
        self.spawn_decode(pending);
    }

    fn spawn_decode(&self, pending: PendingLoad) {
        let proxy = self.proxy.clone();
        let fut = async move {
            let loaded = pending.resolve().await;
            if let Err(err) = proxy.send_event(ViewerEvent::Decoded(loaded)) {
                log::warn!("event loop closed before a decode finished: {}", err);
            }
        };
        #[cfg(not(target_arch = "wasm32"))]
        self.async_runtime.spawn(fut);
        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(fut);
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        let Some(controller) = &mut self.controller else {
            return;
        };
        if let Key::Character(c) = event.logical_key.as_ref() {
            if c.eq_ignore_ascii_case("v") {
                match controller.toggle_visibility() {
                    Some(visible) => log::info!("model visible: {}", visible),
                    None => log::info!("no model to toggle"),
                }
            } else if c.eq_ignore_ascii_case("f") {
                if let Some(pose) = controller.refit() {
                    log::info!("camera refitted at distance {:.3}", pose.distance);
                }
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(controller) = self.controller.take() {
            controller.shutdown();
        }
    }
}

impl ApplicationHandler<ViewerEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.controller.is_some() {
            return;
        }

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.initial_size.0,
                self.config.initial_size.1,
            ));

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let window = wgpu::web_sys::window().unwrap_throw();
            let document = window.document().unwrap_throw();
            let canvas = document.get_element_by_id(CANVAS_ID).unwrap_throw();
            let html_canvas_element = canvas.unchecked_into();
            window_attributes = window_attributes.with_canvas(Some(html_canvas_element));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("could not create a window: {}", e);
                event_loop.exit();
                return;
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self
                .async_runtime
                .block_on(Context::new(window, &self.config))
            {
                Ok(ctx) => self.attach_context(ctx),
                Err(e) => {
                    log::error!("could not initialize the GPU context: {:#}", e);
                    event_loop.exit();
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            let config = self.config.clone();
            wasm_bindgen_futures::spawn_local(async move {
                match Context::new(window, &config).await {
                    Ok(ctx) => {
                        if proxy.send_event(ViewerEvent::Initialized(Box::new(ctx))).is_err() {
                            log::error!("event loop closed before the GPU context was ready");
                        }
                    }
                    Err(e) => log::error!("could not initialize the GPU context: {:#}", e),
                }
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Initialized(ctx) => {
                // This is the message from our wasm `spawn_local`
                self.attach_context(*ctx);
            }
            ViewerEvent::Open(asset) => {
                log::info!("opening {} ({} bytes)", asset.name(), asset.bytes().len());
                self.load(asset);
            }
            ViewerEvent::Decoded(loaded) => {
                let Some(controller) = &mut self.controller else {
                    log::debug!("decode of {} finished after shutdown", loaded.name);
                    return;
                };
                let name = loaded.name.clone();
                match controller.complete_load(loaded) {
                    Ok(LoadStatus::Superseded) => {}
                    Ok(_) => {
                        if let Some(window) = self.window() {
                            window.set_title(&format!("{} - {}", self.config.title, name));
                            window.request_redraw();
                        }
                    }
                    // Already logged; the previous model stays
                    Err(_) => {}
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(controller) = &mut self.controller else {
            return;
        };
        controller.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                controller.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                let window = controller.surface().backend().window().clone();
                window.request_redraw();
                match controller.frame() {
                    Ok(()) => {}
                    // Reconfigure the surface if it's lost or outdated
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = window.inner_size();
                        if !controller.resize(size.width, size.height) {
                            controller.surface_mut().backend_mut().reconfigure();
                        }
                    }
                    Err(e) => {
                        log::error!("Unable to render {}", e);
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(&event),
            #[cfg(not(target_arch = "wasm32"))]
            WindowEvent::DroppedFile(path) => match ModelAsset::from_file(&path) {
                Ok(asset) => self.load(asset),
                Err(e) => log::error!("cannot open {}: {:#}", path.display(), e),
            },
            _ => {}
        }
    }
}

/// Opens the viewer window and blocks until it is closed.
pub fn run(config: ViewerConfig, initial: Option<ModelAsset>) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info).unwrap_throw();
    }

    let event_loop: EventLoop<ViewerEvent> = EventLoop::with_user_event().build()?;
    #[cfg(target_arch = "wasm32")]
    WEB_PROXY.with(|proxy| *proxy.borrow_mut() = Some(event_loop.create_proxy()));
    let mut app = App::new(&event_loop, config, initial)?;
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(target_arch = "wasm32")]
thread_local! {
    static WEB_PROXY: std::cell::RefCell<Option<EventLoopProxy<ViewerEvent>>> =
        const { std::cell::RefCell::new(None) };
}

/// Loads a model picked on the page. `tag` is the file extension (`"glb"`,
/// `".OBJ"`, ...). Unsupported tags are rejected here and leave the current
/// model alone.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn load_model(name: String, bytes: Vec<u8>, tag: String) -> Result<(), JsValue> {
    let event = open_request(&name, bytes, &tag).map_err(|e| JsValue::from_str(&e.to_string()))?;
    WEB_PROXY.with(|proxy| match proxy.borrow().as_ref() {
        Some(proxy) => proxy
            .send_event(event)
            .map_err(|e| JsValue::from_str(&format!("viewer has shut down: {e}"))),
        None => Err(JsValue::from_str("viewer is not running yet")),
    })
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), wasm_bindgen::JsValue> {
    run(ViewerConfig::default(), None).map_err(|e| wasm_bindgen::JsValue::from_str(&format!("{e:#}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::DecodeErrorKind, resources::ModelFormat};

    #[test]
    fn page_files_become_open_events() {
        match open_request("duck.glb", b"glTF".to_vec(), ".GLB") {
            Ok(ViewerEvent::Open(asset)) => {
                assert_eq!(asset.name(), "duck.glb");
                assert_eq!(asset.format(), ModelFormat::Glb);
            }
            other => panic!("expected an open event, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_page_files_are_refused() {
        let err = open_request("part.stl", vec![0; 84], "stl").err().unwrap();
        assert_eq!(err.kind(), DecodeErrorKind::UnsupportedFormat);
    }
}
