//! egui front-end: input card, mode switch and one row per download.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use eframe::{
    App, Frame,
    egui::{self, Color32, ColorImage, RichText, TextureOptions, Visuals},
};
use rfd::FileDialog;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::model::{Quality, TaskId, TaskStatus};
use crate::os::{clipboard_text, reveal_folder};
use crate::session::{DownloadRow, Session, SimpleOption, UiMode, folder_display_name};
use crate::thumbnail::fetch_thumbnail;

const COLOR_BG: Color32 = Color32::from_rgb(0x12, 0x12, 0x1f);
const COLOR_CARD: Color32 = Color32::from_rgb(0x15, 0x15, 0x26);
const COLOR_ACCENT: Color32 = Color32::from_rgb(0xf9, 0x73, 0x16);
const COLOR_TEXT: Color32 = Color32::WHITE;
const COLOR_TEXT_GRAY: Color32 = Color32::from_rgb(0xaa, 0xaa, 0xaa);
const COLOR_ERROR: Color32 = Color32::from_rgb(0xcf, 0x66, 0x79);

/// How long closing the window waits for the worker to wind down
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// What a click on a row asked for; applied after the list is drawn
enum RowAction {
    Cancel(TaskId),
    Open(PathBuf),
    Remove(TaskId),
}

pub struct FastYtApp {
    session: Session,
    /// Runtime used for blocking thumbnail fetches
    runtime: Handle,
    /// Cached textures for row thumbnails
    thumbnails: HashMap<TaskId, egui::TextureHandle>,
    /// Decoded thumbnails waiting to be uploaded on the UI thread
    thumbnail_results: Arc<Mutex<Vec<(TaskId, ColorImage)>>>,
    /// Whether the URL entry had keyboard focus last frame
    entry_focused: bool,
}

impl FastYtApp {
    pub fn new(cc: &eframe::CreationContext<'_>, session: Session, runtime: Handle) -> Self {
        cc.egui_ctx.set_visuals(visuals());
        Self {
            session,
            runtime,
            thumbnails: HashMap::new(),
            thumbnail_results: Arc::new(Mutex::new(Vec::new())),
            entry_focused: false,
        }
    }

    fn spawn_thumbnail_fetches(&mut self, ctx: &egui::Context) {
        for (id, url) in self.session.take_thumbnail_requests() {
            let results = Arc::clone(&self.thumbnail_results);
            let ctx = ctx.clone();
            self.runtime.spawn_blocking(move || {
                if let Some(img) = fetch_thumbnail(&url) {
                    results
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((id, img));
                    ctx.request_repaint();
                }
            });
        }
    }

    fn upload_thumbnails(&mut self, ctx: &egui::Context) {
        let mut pending = self
            .thumbnail_results
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (id, img) in pending.drain(..) {
            // The row may have been removed while the image was in flight.
            if self.session.row(id).is_some() {
                let tex = ctx.load_texture(format!("thumb-{id}"), img, TextureOptions::default());
                self.thumbnails.insert(id, tex);
            }
        }
    }

    fn top_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label(RichText::new("⚡ Fast YT").size(22.0).strong().color(COLOR_ACCENT));
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let mut mode = self.session.state().mode();
                ui.selectable_value(&mut mode, UiMode::Advanced, "Advanced");
                ui.selectable_value(&mut mode, UiMode::Simple, "Simple");
                if mode != self.session.state().mode() {
                    self.session.state_mut().set_mode(mode);
                }
            });
        });
    }

    fn input_card(&mut self, ui: &mut egui::Ui) {
        let simple = self.session.state().mode() == UiMode::Simple;
        card(COLOR_CARD, 20.0).show(ui, |ui| {
            ui.horizontal(|ui| {
                let (hint, action) = if simple {
                    ("Ctrl+V anywhere to auto-start...", "Download")
                } else {
                    ("Paste URL here...", "Add to Queue")
                };
                let entry = egui::TextEdit::singleline(&mut self.session.url_input)
                    .hint_text(hint)
                    .desired_width((ui.available_width() - 230.0).max(120.0));
                let response = ui.add(entry);
                self.entry_focused = response.has_focus();
                let entered = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

                let paste = egui::Button::new(RichText::new("Paste").color(COLOR_TEXT))
                    .fill(COLOR_BG)
                    .rounding(18.0)
                    .min_size(egui::vec2(70.0, 32.0));
                if ui.add(paste).clicked() {
                    if let Some(id) = self.session.paste_from_clipboard(clipboard_text()) {
                        info!(task = %id, "submitted from Paste button");
                    }
                }

                let button = egui::Button::new(RichText::new(action).strong().color(COLOR_TEXT))
                    .fill(COLOR_ACCENT)
                    .rounding(18.0)
                    .min_size(egui::vec2(130.0, 32.0));
                if ui.add(button).clicked() || entered {
                    if let Some(id) = self.session.submit_entry() {
                        info!(task = %id, "submitted from entry");
                    }
                }
            });

            ui.add_space(12.0);
            ui.horizontal(|ui| {
                let dir = self.session.state().download_dir().to_path_buf();
                let path_button = egui::Button::new(
                    RichText::new(format!("📁 {}", folder_display_name(&dir))).color(COLOR_TEXT_GRAY),
                )
                .fill(COLOR_BG)
                .rounding(18.0);
                if ui
                    .add(path_button)
                    .on_hover_text(dir.display().to_string())
                    .clicked()
                {
                    if let Some(folder) = FileDialog::new().set_directory(&dir).pick_folder() {
                        self.session.state_mut().set_download_dir(folder);
                    }
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if simple {
                        self.simple_options(ui);
                    } else {
                        self.advanced_options(ui);
                    }
                });
            });
        });
    }

    fn simple_options(&mut self, ui: &mut egui::Ui) {
        let mut option = self.session.state().simple_option();
        // Right-to-left layout: last choice first.
        for choice in [SimpleOption::AudioOnly, SimpleOption::QuickVideo] {
            ui.selectable_value(&mut option, choice, choice.label());
        }
        if option != self.session.state().simple_option() {
            self.session.state_mut().set_simple_option(option);
        }
    }

    fn advanced_options(&mut self, ui: &mut egui::Ui) {
        let mut quality = self.session.state().quality();
        egui::ComboBox::from_id_source("max_quality")
            .selected_text(quality.label())
            .show_ui(ui, |ui| {
                for choice in Quality::CHOICES {
                    ui.selectable_value(&mut quality, choice, choice.label());
                }
            });
        ui.label("Max Quality:");
        if quality != self.session.state().quality() {
            self.session.state_mut().set_quality(quality);
        }
    }

    fn queue_card(&mut self, ui: &mut egui::Ui) {
        let mut actions = Vec::new();
        card(COLOR_CARD, 20.0).show(ui, |ui| {
            ui.set_min_size(ui.available_size());
            egui::ScrollArea::vertical()
                .auto_shrink([false; 2])
                .show(ui, |ui| {
                    if self.session.rows().is_empty() {
                        ui.label(RichText::new("Nothing queued yet").color(COLOR_TEXT_GRAY));
                    }
                    for row in self.session.rows() {
                        if let Some(action) = row_ui(ui, row, self.thumbnails.get(&row.id)) {
                            actions.push(action);
                        }
                        ui.add_space(5.0);
                    }
                });
        });

        for action in actions {
            match action {
                RowAction::Cancel(id) => self.session.cancel(id),
                RowAction::Open(folder) => reveal_folder(&folder),
                RowAction::Remove(id) => {
                    self.session.remove(id);
                    self.thumbnails.remove(&id);
                }
            }
        }
    }
}

impl App for FastYtApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        // Apply worker events to the rows
        self.session.pump_events();
        // Fetch new thumbnails off the UI thread, upload finished ones
        self.spawn_thumbnail_fetches(ctx);
        self.upload_thumbnails(ctx);

        // Ctrl+V anywhere in the window
        let pasted: Vec<String> = ctx.input(|i| {
            i.events
                .iter()
                .filter_map(|event| match event {
                    egui::Event::Paste(text) => Some(text.clone()),
                    _ => None,
                })
                .collect()
        });

        // Title and mode switch
        egui::TopBottomPanel::top("top_bar")
            .frame(egui::Frame::none().fill(COLOR_BG).inner_margin(egui::Margin::symmetric(30.0, 18.0)))
            .show_separator_line(false)
            .show(ctx, |ui| self.top_bar(ui));

        // Input card above the download list
        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(COLOR_BG).inner_margin(egui::Margin::symmetric(30.0, 10.0)))
            .show(ctx, |ui| {
                self.input_card(ui);
                ui.add_space(16.0);
                self.queue_card(ui);
            });

        // After the entry has seen this frame's input, so a focused entry
        // does not receive the text twice.
        for text in pasted {
            if let Some(id) = self.session.handle_paste(&text, self.entry_focused) {
                info!(task = %id, "submitted from clipboard");
            }
        }

        // Stop the worker and give the running download a moment to die
        if ctx.input(|i| i.viewport().close_requested()) {
            if let Some(worker) = self.session.shutdown() {
                let joined = self
                    .runtime
                    .block_on(async { tokio::time::timeout(WORKER_JOIN_TIMEOUT, worker).await });
                if joined.is_err() {
                    warn!("download worker still running at exit");
                }
            }
        }

        // Request periodic repaint for progress updates
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

fn visuals() -> Visuals {
    let mut visuals = Visuals::dark();
    visuals.panel_fill = COLOR_BG;
    visuals.window_fill = COLOR_CARD;
    visuals.extreme_bg_color = COLOR_BG;
    visuals.selection.bg_fill = COLOR_ACCENT;
    visuals.hyperlink_color = COLOR_ACCENT;
    visuals
}

fn card(fill: Color32, rounding: f32) -> egui::Frame {
    egui::Frame::none()
        .fill(fill)
        .rounding(rounding)
        .inner_margin(egui::Margin::same(18.0))
}

fn row_ui(
    ui: &mut egui::Ui,
    row: &DownloadRow,
    thumbnail: Option<&egui::TextureHandle>,
) -> Option<RowAction> {
    let mut action = None;
    card(COLOR_BG, 25.0).show(ui, |ui| {
        ui.horizontal(|ui| {
            // Thumbnail once it has loaded, a play glyph until then
            match thumbnail {
                Some(tex) => {
                    ui.add(egui::Image::new(tex).max_height(54.0));
                }
                None => {
                    ui.label(RichText::new("▶").size(22.0).color(COLOR_ACCENT));
                }
            }
            ui.vertical(|ui| {
                ui.horizontal(|ui| {
                    ui.label(RichText::new(row.display_title()).size(14.0).color(COLOR_TEXT))
                        .on_hover_text(row.url.as_str());
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        action = row_buttons(ui, row);
                    });
                });
                ui.label(RichText::new(row.status_label()).size(12.0).color(COLOR_TEXT_GRAY));
                // Failed and cancelled rows keep their bar, in red
                let bar_color = match row.status {
                    TaskStatus::Cancelled | TaskStatus::Error => COLOR_ERROR,
                    _ => COLOR_ACCENT,
                };
                ui.add(
                    egui::ProgressBar::new(row.progress)
                        .fill(bar_color)
                        .desired_height(8.0),
                );
            });
        });
    });
    action
}

/// Cancel while active; open-folder and remove once finished.
fn row_buttons(ui: &mut egui::Ui, row: &DownloadRow) -> Option<RowAction> {
    let round = |text: &str, fill: Color32| {
        egui::Button::new(RichText::new(text).color(COLOR_TEXT))
            .fill(fill)
            .rounding(15.0)
            .min_size(egui::vec2(30.0, 30.0))
    };

    if !row.is_finished() {
        let clicked = ui.add(round("✕", COLOR_ERROR)).on_hover_text("Cancel").clicked();
        return clicked.then_some(RowAction::Cancel(row.id));
    }

    let mut action = None;
    if ui.add(round("🗑", COLOR_CARD)).on_hover_text("Remove").clicked() {
        action = Some(RowAction::Remove(row.id));
    }
    if row.status == TaskStatus::Completed
        && ui.add(round("📂", COLOR_CARD)).on_hover_text("Open folder").clicked()
    {
        action = Some(RowAction::Open(row.destination.clone()));
    }
    action
}
