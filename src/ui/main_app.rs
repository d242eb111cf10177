//! Main application UI.

use std::path::PathBuf;

use eframe::egui::{self, Align, Layout};

use crate::config::{AppConfig, StoreKind, UiConfig};

use super::attendance_panel;
use super::attendance_view::AttendanceView;
use super::components::colors;

/// Main application state.
pub struct MainApp {
    config: AppConfig,
    config_path: PathBuf,
    saved_ui: UiConfig,
    // Keeps the background runtime alive while the window is open.
    _rt: tokio::runtime::Runtime,
    view: AttendanceView,

    // Query dialog
    query_dialog_open: bool,
    query_input: String,
}

impl MainApp {
    pub fn new(config: AppConfig, config_path: PathBuf, rt: tokio::runtime::Runtime, view: AttendanceView) -> Self {
        Self {
            saved_ui: config.ui.clone(),
            config,
            config_path,
            _rt: rt,
            view,
            query_dialog_open: false,
            query_input: String::new(),
        }
    }

    /// Remember the open scope for the next launch.
    fn save_last_query(&mut self) {
        self.config.ui.last_query = if self.config.ui.remember_last_query {
            self.view.query_string()
        } else {
            String::new()
        };
        if self.config.ui == self.saved_ui {
            return;
        }
        match self.config.save(&self.config_path) {
            Ok(()) => self.saved_ui = self.config.ui.clone(),
            Err(e) => tracing::error!("Failed to save config: {}", e),
        }
    }

    /// Render menu bar.
    fn show_menu_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::MenuBar::new().ui(ui, |ui| {
                ui.menu_button("View", |ui| {
                    if ui.button("Open Query...").clicked() {
                        self.query_input = self.view.query_string();
                        self.query_dialog_open = true;
                        ui.close();
                    }
                    if ui.button("Reload Classes").clicked() {
                        self.view.load_groups();
                        ui.close();
                    }
                    if ui.button("Refresh Roster").clicked() {
                        self.view.retry();
                        ui.close();
                    }
                });
                ui.menu_button("Settings", |ui| {
                    ui.checkbox(&mut self.config.ui.remember_last_query, "Reopen last class on start");
                });
            });
        });
    }

    /// Render status bar (display only, no interaction).
    fn show_status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar")
            .min_height(28.0)
            .show(ctx, |ui| {
                ui.disable();
                ui.horizontal(|ui| {
                    let store = match self.config.store.kind {
                        StoreKind::Memory => "memory".to_string(),
                        StoreKind::File => self.config.store.resolved_file_path().display().to_string(),
                        StoreKind::Postgres => format!("postgres {}", self.config.store.database.name),
                        StoreKind::Http => self.config.store.http.url.clone(),
                    };
                    ui.colored_label(colors::NEUTRAL, format!("Store: {store}"));

                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        if self.view.is_busy() {
                            ui.colored_label(colors::WARNING, "Working...");
                            ui.spinner();
                        } else {
                            ui.colored_label(colors::SUCCESS, "Idle");
                        }
                    });
                });
            });
    }

    /// Render the query string dialog.
    fn show_query_dialog(&mut self, ctx: &egui::Context) {
        if !self.query_dialog_open {
            return;
        }

        let mut open = true;
        egui::Window::new("Open Query")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .open(&mut open)
            .show(ctx, |ui| {
                ui.add_space(10.0);
                ui.label("Paste a shared link or query string:");
                ui.add(
                    egui::TextEdit::singleline(&mut self.query_input)
                        .desired_width(380.0)
                        .hint_text("date=2026-03-02&class=7B&status=present"),
                );

                ui.add_space(15.0);
                ui.separator();
                ui.add_space(10.0);

                ui.horizontal(|ui| {
                    if ui.button("Cancel").clicked() {
                        self.query_dialog_open = false;
                    }
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        if ui.button("Open").clicked() {
                            let query = query_part(&self.query_input).to_string();
                            self.view.apply_query(&query);
                            self.query_dialog_open = false;
                        }
                    });
                });
            });

        if !open {
            self.query_dialog_open = false;
        }
    }
}

impl eframe::App for MainApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Poll async results
        self.view.poll();

        // Request repaint during async operations
        if self.view.is_busy() {
            ctx.request_repaint();
        }

        self.show_menu_bar(ctx);
        self.show_status_bar(ctx);
        self.show_query_dialog(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            attendance_panel::show(&mut self.view, ui);
        });

        if ctx.input(|i| i.viewport().close_requested()) {
            self.save_last_query();
        }
    }
}

/// Accept either a bare query string or a full link and return the query part.
fn query_part(input: &str) -> &str {
    let input = input.trim();
    match input.split_once('?') {
        Some((_, query)) => query,
        None => input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_part_strips_link_prefix() {
        assert_eq!(query_part("rollcall://view?date=2026-01-05&class=3A"), "date=2026-01-05&class=3A");
        assert_eq!(query_part("  date=2026-01-05 "), "date=2026-01-05");
        assert_eq!(query_part("?class=3A"), "class=3A");
    }
}
