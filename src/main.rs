// main.rs — 事件循环、菜单、状态栏; 把视觉源交给房间渲染核心

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // 在 Release 模式下隐藏控制台窗口

mod atlas;
mod config;
mod fonts;
mod frame;
mod i18n;
mod loader;
mod renderer;
mod room;
mod source;

use config::{AppConfig, CliArgs, ResampleFilter};
use frame::{FrameInfo, FramePlan, FrameSkip, RenderContext};
use loader::{LoadOptions, LoadResult, Loaded};
use renderer::Renderer;
use room::RoomLook;
use source::{LiveFeed, SourceKind};

use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    dpi::LogicalSize,
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowBuilder},
};

/// UI state that lives across frames.
struct UiState {
    show_fps: bool,
    vsync: bool,
    is_loading: bool,
    is_fullscreen: bool,
    lang: String,
    fps: f32,
}

/// What the UI asked for during one frame; applied after rendering.
#[derive(Default)]
struct UiActions {
    open_dialog: bool,
    stop_animation: bool,
    toggle_fullscreen: bool,
    vsync_changed: bool,
    resample_changed: bool,
    lang_changed: bool,
    exit: bool,
}

/// Read-only numbers shown in the status bar.
struct StatusLine {
    info: Option<FrameInfo>,
    atlas_size: Option<(u32, u32)>,
    room: Option<(f32, f32, f32)>,
    animating: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = CliArgs::from_env();
    i18n::init(i18n::resolve_lang(cli.lang.as_deref()));

    let app_config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        log::error!("{}, using defaults", e);
        AppConfig::default()
    });

    let event_loop = EventLoop::new();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(i18n::tr("app.title"))
            .with_inner_size(LogicalSize::new(1280, 720))
            .build(&event_loop)
            .expect("create window"),
    );

    let mut renderer = pollster::block_on(Renderer::new(window.clone(), &app_config));
    let size = renderer.size;
    let mut ctx = RenderContext::new(&app_config, (size.width, size.height));
    ctx.set_static_image(source::placeholder_image(800, 600));

    // 大图在解码线程里缩小, 同时保证 3x3 图集不超过 GPU 纹理上限
    let gpu_limit = renderer.max_tile_edge();
    let load_opts = LoadOptions {
        max_long_edge: match app_config.max_long_edge {
            0 => gpu_limit,
            n => n.min(gpu_limit),
        },
        filter: app_config.resample.into(),
    };

    let mut ui = UiState {
        show_fps: false,
        vsync: app_config.vsync,
        is_loading: false,
        is_fullscreen: false,
        lang: i18n::resolve_lang(cli.lang.as_deref()),
        fps: 0.0,
    };

    let mut last_frame_time = Instant::now();
    let mut frame_count = 0u32;
    let mut last_info: Option<FrameInfo> = None;

    let (tx, rx): (Sender<LoadResult>, Receiver<LoadResult>) = channel();
    if let Some(path) = cli.image.clone() {
        ui.is_loading = true;
        loader::spawn_load(path, load_opts, tx.clone());
    }

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        if let Ok(result) = rx.try_recv() {
            ui.is_loading = false;
            apply_loaded(result, &mut ctx, &window);
        }

        match event {
            Event::WindowEvent { event, .. } => {
                let response = renderer.egui_state.on_event(&renderer.egui_ctx, &event);
                if response.consumed {
                    return;
                }

                match event {
                    WindowEvent::CloseRequested => {
                        ctx.detach_live_feed();
                        *control_flow = ControlFlow::Exit;
                    }

                    WindowEvent::Resized(new_size) => {
                        renderer.resize(new_size);
                        ctx.resize(new_size.width, new_size.height);
                    }

                    WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                        renderer.resize(*new_inner_size);
                        ctx.resize(new_inner_size.width, new_inner_size.height);
                    }

                    WindowEvent::KeyboardInput { input, .. } if input.state == ElementState::Pressed => {
                        match input.virtual_keycode {
                            Some(VirtualKeyCode::O) => {
                                if let Some(path) = pick_image() {
                                    ui.is_loading = true;
                                    loader::spawn_load(path, load_opts, tx.clone());
                                }
                            }
                            Some(VirtualKeyCode::F11) => toggle_fullscreen(&window, &mut ui),
                            Some(VirtualKeyCode::Escape) if ui.is_fullscreen => toggle_fullscreen(&window, &mut ui),
                            _ => {}
                        }
                    }

                    WindowEvent::DroppedFile(path) => {
                        ui.is_loading = true;
                        loader::spawn_load(path, load_opts, tx.clone());
                    }

                    _ => {}
                }
            }

            Event::RedrawRequested(_) => {
                frame_count += 1;
                let now = Instant::now();
                let elapsed = now.duration_since(last_frame_time).as_secs_f32();
                if elapsed >= 1.0 {
                    ui.fps = frame_count as f32 / elapsed;
                    frame_count = 0;
                    last_frame_time = now;
                }

                let plan = ctx.plan_frame();
                let scene = match &plan {
                    // 最小化: 整帧跳过
                    FramePlan::Skip(FrameSkip::DegenerateViewport) => return,
                    FramePlan::Skip(reason) => {
                        log::trace!("room skipped: {}", reason);
                        None
                    }
                    FramePlan::Draw(info, scene) => {
                        if info.rebuilt {
                            log::trace!("atlas repainted (reallocated: {})", info.reallocated);
                        }
                        last_info = Some(info.clone());
                        Some(scene)
                    }
                };

                if let Some(atlas) = ctx.atlas() {
                    renderer.sync_atlas(atlas);
                }

                let status = StatusLine {
                    info: last_info.clone(),
                    atlas_size: ctx.atlas().map(|a| a.size()),
                    room: scene.map(|s| (s.room.width(), s.room.height(), s.room.depth())),
                    animating: ctx.has_live_feed(),
                };

                let mut actions = UiActions::default();
                let render_result = renderer.render_with_ui(&window, scene, |egui_ctx| {
                    draw_ui(egui_ctx, &mut ui, &mut ctx.look, &mut ctx.resample, &status, &mut actions);
                });

                apply_actions(actions, &mut ui, &mut ctx, &mut renderer, &window, load_opts, &tx, control_flow);

                match render_result {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => renderer.resize(renderer.size),
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("GPU out of memory, exiting");
                        *control_flow = ControlFlow::Exit;
                    }
                    Err(e) => log::warn!("render error: {:?}", e),
                }
            }

            Event::MainEventsCleared => {
                window.request_redraw();
            }

            _ => {}
        }
    });
}

fn pick_image() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter(&i18n::tr("file.filter.images"), loader::IMAGE_EXTENSIONS)
        .pick_file()
}

fn toggle_fullscreen(window: &Window, ui: &mut UiState) {
    ui.is_fullscreen = !ui.is_fullscreen;
    if ui.is_fullscreen {
        window.set_fullscreen(Some(Fullscreen::Borderless(None)));
    } else {
        window.set_fullscreen(None);
    }
}

fn apply_loaded(result: LoadResult, ctx: &mut RenderContext, window: &Window) {
    let (path, loaded) = match result {
        Ok(ok) => ok,
        Err(e) => {
            log::error!("{}", i18n::tr_with("error.load", &[("err", e.to_string())]));
            return;
        }
    };

    ctx.detach_live_feed();
    match loaded {
        Loaded::Still(img) => {
            log::info!("showing {} ({}x{})", path.display(), img.width(), img.height());
            ctx.set_static_image(img);
        }
        Loaded::Animation(frames) => {
            log::info!("playing {} ({} frames)", path.display(), frames.len());
            // 第一帧作为静态图兜底, 帧流就绪前也有画面
            if let Some(first) = frames.first() {
                ctx.set_static_image(first.image.clone());
            }
            let feed = LiveFeed::new();
            ctx.attach_live_feed(feed.clone());
            loader::spawn_playback(frames, feed);
        }
    }

    if let Some(name) = path.file_name() {
        window.set_title(&format!("{} - {}", i18n::tr("app.title"), name.to_string_lossy()));
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_actions(
    actions: UiActions,
    ui: &mut UiState,
    ctx: &mut RenderContext,
    renderer: &mut Renderer,
    window: &Window,
    load_opts: LoadOptions,
    tx: &Sender<LoadResult>,
    control_flow: &mut ControlFlow,
) {
    if actions.open_dialog {
        if let Some(path) = pick_image() {
            ui.is_loading = true;
            loader::spawn_load(path, load_opts, tx.clone());
        }
    }
    if actions.stop_animation {
        ctx.detach_live_feed();
    }
    if actions.toggle_fullscreen {
        toggle_fullscreen(window, ui);
    }
    if actions.vsync_changed {
        renderer.set_vsync(ui.vsync);
    }
    if actions.resample_changed {
        ctx.invalidate();
    }
    if actions.lang_changed {
        i18n::init(ui.lang.clone());
        window.set_title(&i18n::tr("app.title"));
    }
    if actions.exit {
        ctx.detach_live_feed();
        *control_flow = ControlFlow::Exit;
    }
}

fn draw_ui(
    ctx: &egui::Context,
    ui_state: &mut UiState,
    look: &mut RoomLook,
    resample: &mut ResampleFilter,
    status: &StatusLine,
    actions: &mut UiActions,
) {
    egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
        egui::menu::bar(ui, |ui| {
            ui.menu_button(i18n::tr("menu.file"), |ui| {
                if ui.button(i18n::tr("menu.open_image")).clicked() {
                    actions.open_dialog = true;
                    ui.close_menu();
                }
                if ui
                    .add_enabled(status.animating, egui::Button::new(i18n::tr("menu.stop_animation")))
                    .clicked()
                {
                    actions.stop_animation = true;
                    ui.close_menu();
                }
                ui.separator();
                if ui.button(i18n::tr("menu.exit")).clicked() {
                    actions.exit = true;
                }
            });

            ui.menu_button(i18n::tr("menu.view"), |ui| {
                ui.menu_button(i18n::tr("view.look"), |ui| {
                    ui.add(egui::Slider::new(&mut look.height_factor, 0.25..=3.0).text(i18n::tr("look.height")));
                    ui.add(egui::Slider::new(&mut look.depth_factor, 0.1..=5.0).text(i18n::tr("look.depth")));
                    ui.add(
                        egui::Slider::new(&mut look.fov_y_degrees, 20.0..=120.0)
                            .text(i18n::tr("look.fov"))
                            .suffix("°"),
                    );
                    if ui.button(i18n::tr("view.reset_look")).clicked() {
                        *look = RoomLook::default();
                    }
                });

                ui.menu_button(i18n::tr("view.resample"), |ui| {
                    let filters = [
                        (ResampleFilter::Nearest, "resample.nearest"),
                        (ResampleFilter::Triangle, "resample.triangle"),
                        (ResampleFilter::CatmullRom, "resample.catmull_rom"),
                        (ResampleFilter::Lanczos3, "resample.lanczos3"),
                    ];
                    for (filter, key) in filters {
                        if ui.radio_value(resample, filter, i18n::tr(key)).clicked() {
                            actions.resample_changed = true;
                            ui.close_menu();
                        }
                    }
                });

                ui.separator();
                let fullscreen_key = if ui_state.is_fullscreen {
                    "view.fullscreen.exit"
                } else {
                    "view.fullscreen.enter"
                };
                if ui.button(i18n::tr(fullscreen_key)).clicked() {
                    actions.toggle_fullscreen = true;
                    ui.close_menu();
                }
                ui.checkbox(&mut ui_state.show_fps, i18n::tr("view.show_fps"));
                if ui
                    .checkbox(&mut ui_state.vsync, i18n::tr("view.enable_vsync"))
                    .changed()
                {
                    actions.vsync_changed = true;
                }
            });

            ui.menu_button(i18n::tr("menu.language"), |ui| {
                for (code, name) in i18n::LANGUAGES {
                    if ui.radio_value(&mut ui_state.lang, code.to_string(), name).clicked() {
                        actions.lang_changed = true;
                        ui.close_menu();
                    }
                }
            });
        });
    });

    egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            if ui_state.is_loading {
                ui.label(egui::RichText::new(i18n::tr("status.loading")).color(egui::Color32::YELLOW));
                ui.label("|");
            }

            match &status.info {
                Some(info) => {
                    let kind_key = match info.kind {
                        SourceKind::Static => "status.source_static",
                        SourceKind::Live => "status.source_live",
                    };
                    ui.label(i18n::tr(kind_key));
                    ui.label("|");
                    ui.label(i18n::tr_with(
                        "status.source_size",
                        &[
                            ("w", info.source_size.0.to_string()),
                            ("h", info.source_size.1.to_string()),
                            ("aspect", format!("{:.3}", info.aspect)),
                        ],
                    ));
                }
                None => {
                    ui.label(i18n::tr("status.waiting"));
                }
            }

            if let Some((w, h)) = status.atlas_size {
                ui.label("|");
                ui.label(i18n::tr_with("status.atlas_size", &[("w", w.to_string()), ("h", h.to_string())]));
            }

            if let Some((w, h, d)) = status.room {
                ui.label("|");
                ui.label(i18n::tr_with(
                    "status.room",
                    &[
                        ("w", format!("{:.0}", w)),
                        ("h", format!("{:.0}", h)),
                        ("d", format!("{:.0}", d)),
                    ],
                ));
            }

            if ui_state.show_fps {
                ui.label("|");
                ui.label(egui::RichText::new(format!("FPS: {:.1}", ui_state.fps)).color(egui::Color32::GREEN));
            }
        });
    });
}
