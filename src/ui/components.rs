//! Shared UI components.

use eframe::egui::{self, Color32, CornerRadius, Margin, Response, RichText, Ui};

use crate::models::AttendanceStatus;

/// Status indicator colors.
pub mod colors {
    use super::Color32;

    pub const SUCCESS: Color32 = Color32::from_rgb(100, 200, 100);
    pub const ERROR: Color32 = Color32::from_rgb(255, 100, 100);
    pub const WARNING: Color32 = Color32::from_rgb(255, 200, 100);
    pub const NEUTRAL: Color32 = Color32::from_rgb(150, 150, 150);
    pub const INFO: Color32 = Color32::from_rgb(110, 160, 240);
}

/// Badge color for a status.
pub fn status_color(status: AttendanceStatus) -> Color32 {
    match status {
        AttendanceStatus::Present => colors::SUCCESS,
        AttendanceStatus::Online => colors::INFO,
        AttendanceStatus::ExcusedSick | AttendanceStatus::ExcusedPermission => colors::WARNING,
        AttendanceStatus::UnexcusedAbsence => colors::ERROR,
    }
}

/// Render a panel header with title.
pub fn panel_header(ui: &mut Ui, title: &str) {
    ui.heading(RichText::new(title).size(24.0));
    ui.add_space(10.0);
    ui.separator();
    ui.add_space(10.0);
}

/// Small framed card with a title, a large value and a subtitle.
pub fn stat_card(ui: &mut Ui, title: &str, value: &str, subtitle: &str, accent: Color32) {
    egui::Frame::new()
        .fill(ui.style().visuals.extreme_bg_color)
        .inner_margin(Margin::same(12))
        .outer_margin(Margin::same(4))
        .corner_radius(CornerRadius::same(8))
        .show(ui, |ui| {
            ui.set_min_width(120.0);

            ui.vertical(|ui| {
                ui.label(RichText::new(title).small());
                ui.label(RichText::new(value).heading().strong().color(accent));
                ui.label(RichText::new(subtitle).small().weak());
            });
        });
}

/// Button with a leading phosphor icon.
pub fn button_with_icon(ui: &mut Ui, enabled: bool, icon: &str, text: &str) -> Response {
    ui.add_enabled(enabled, egui::Button::new(format!("{icon} {text}")))
}
