//! Attendance roster panel: filters, summary cards, selectable table and bulk actions.

use chrono::Days;
use eframe::egui::{self, RichText, ScrollArea, Ui};
use egui_extras::DatePickerButton;
use egui_phosphor::regular::{
    ARROWS_CLOCKWISE, CARET_LEFT, CARET_RIGHT, CHECK_SQUARE, FILE_CSV, FILE_XLS, LINK, MAGNIFYING_GLASS, SQUARE, X,
};

use crate::export::show_save_dialog;
use crate::models::{AttendanceMode, AttendanceStatus, ModeFilter, StatusFilter, local_today};
use crate::service::QueryState;

use super::attendance_view::{AttendanceView, Notice};
use super::components::{button_with_icon, colors, panel_header, stat_card, status_color};

/// Show the attendance panel.
pub fn show(view: &mut AttendanceView, ui: &mut Ui) {
    panel_header(ui, "Attendance");

    show_scope_row(view, ui);
    ui.add_space(8.0);
    show_filter_row(view, ui);
    ui.add_space(10.0);
    show_stats(view, ui);
    ui.add_space(6.0);
    show_notice(view, ui);
    show_action_row(view, ui);

    ui.add_space(8.0);
    ui.separator();
    ui.add_space(6.0);

    show_table(view, ui);
}

fn show_scope_row(view: &mut AttendanceView, ui: &mut Ui) {
    ui.horizontal(|ui| {
        ui.label("Date:");
        let mut date = view.criteria().date();
        if ui.button(CARET_LEFT).on_hover_text("Previous day").clicked()
            && let Some(prev) = date.checked_sub_days(Days::new(1))
        {
            view.set_date(prev);
        }
        if ui.add(DatePickerButton::new(&mut date).id_salt("attendance_date")).changed() {
            view.set_date(date);
        }
        if ui.button(CARET_RIGHT).on_hover_text("Next day").clicked()
            && let Some(next) = view.criteria().date().checked_add_days(Days::new(1))
        {
            view.set_date(next);
        }
        if ui.button("Today").clicked() {
            view.set_date(local_today());
        }

        ui.add_space(20.0);

        ui.label("Class:");
        let selected = view.criteria().group_id().unwrap_or("Select a class").to_string();
        let mut chosen: Option<Option<String>> = None;
        egui::ComboBox::from_id_salt("attendance_group")
            .width(180.0)
            .selected_text(selected)
            .show_ui(ui, |ui| {
                if ui
                    .selectable_label(view.criteria().group_id().is_none(), "None")
                    .clicked()
                {
                    chosen = Some(None);
                }
                for group in view.groups() {
                    if ui
                        .selectable_label(view.criteria().group_id() == Some(group.as_str()), group)
                        .clicked()
                    {
                        chosen = Some(Some(group.clone()));
                    }
                }
            });
        if let Some(group) = chosen {
            view.set_group(group);
        }

        if view.is_loading() {
            ui.add_space(10.0);
            ui.spinner();
            ui.label("Loading...");
        }
    });
}

fn show_filter_row(view: &mut AttendanceView, ui: &mut Ui) {
    ui.horizontal(|ui| {
        ui.label(MAGNIFYING_GLASS);
        let mut search = view.criteria().search_text().to_string();
        if ui
            .add(
                egui::TextEdit::singleline(&mut search)
                    .desired_width(200.0)
                    .hint_text("Name or ID"),
            )
            .changed()
        {
            view.set_search_text(search);
        }

        ui.add_space(15.0);

        ui.label("Status:");
        let current = view.criteria().status_filter();
        egui::ComboBox::from_id_salt("attendance_status_filter")
            .width(130.0)
            .selected_text(status_filter_label(current))
            .show_ui(ui, |ui| {
                if ui.selectable_label(current == StatusFilter::All, "All").clicked() {
                    view.set_status_filter(StatusFilter::All);
                }
                for status in AttendanceStatus::ALL {
                    let option = StatusFilter::Only(status);
                    if ui.selectable_label(current == option, status.label()).clicked() {
                        view.set_status_filter(option);
                    }
                }
            });

        ui.add_space(15.0);

        ui.label("Mode:");
        let current = view.criteria().mode_filter();
        egui::ComboBox::from_id_salt("attendance_mode_filter")
            .width(110.0)
            .selected_text(mode_filter_label(current))
            .show_ui(ui, |ui| {
                if ui.selectable_label(current == ModeFilter::All, "All").clicked() {
                    view.set_mode_filter(ModeFilter::All);
                }
                for mode in AttendanceMode::ALL {
                    let option = ModeFilter::Only(mode);
                    if ui.selectable_label(current == option, mode.label()).clicked() {
                        view.set_mode_filter(option);
                    }
                }
            });

        ui.add_space(15.0);

        if ui
            .button(format!("{LINK} Copy link"))
            .on_hover_text("Copy the current filters as a query string")
            .clicked()
        {
            ui.ctx().copy_text(view.query_string());
        }
    });
}

fn show_stats(view: &AttendanceView, ui: &mut Ui) {
    let stats = view.stats();
    ui.horizontal_wrapped(|ui| {
        stat_card(
            ui,
            "Presence",
            &format!("{}%", stats.present_rate),
            &format!("of {} records", stats.total),
            colors::SUCCESS,
        );
        for status in AttendanceStatus::ALL {
            stat_card(
                ui,
                status.label(),
                &stats.count(status).to_string(),
                status.as_str(),
                status_color(status),
            );
        }
    });
}

fn show_notice(view: &mut AttendanceView, ui: &mut Ui) {
    let mut dismiss = false;

    if let QueryState::Failed(message) = view.query_state() {
        let message = message.clone();
        ui.horizontal(|ui| {
            ui.colored_label(colors::ERROR, format!("Could not load attendance: {message}"));
            if ui.button(format!("{ARROWS_CLOCKWISE} Retry")).clicked() {
                view.retry();
            }
        });
    }

    if let Some(notice) = view.notice() {
        let color = match notice {
            Notice::Info(_) => colors::NEUTRAL,
            Notice::Success(_) => colors::SUCCESS,
            Notice::Error(_) => colors::ERROR,
        };
        let message = notice.message().to_string();
        ui.horizontal(|ui| {
            ui.colored_label(color, message);
            if ui.small_button(X).on_hover_text("Dismiss").clicked() {
                dismiss = true;
            }
        });
    }

    if dismiss {
        view.dismiss_notice();
    }
}

fn show_action_row(view: &mut AttendanceView, ui: &mut Ui) {
    ui.horizontal_wrapped(|ui| {
        let selected = view.selection().len();
        ui.label(RichText::new(format!("{selected} selected")).strong());

        if ui.button("Select visible").clicked() {
            view.select_all_visible();
        }
        if ui.add_enabled(selected > 0, egui::Button::new("Clear")).clicked() {
            view.clear_selection();
        }

        ui.add_space(10.0);
        ui.label("Mark as:");

        let enabled = view.can_bulk_apply();
        for status in AttendanceStatus::ALL {
            if ui
                .add_enabled(
                    enabled,
                    egui::Button::new(RichText::new(status.label()).color(status_color(status))),
                )
                .clicked()
            {
                view.bulk_apply(status);
            }
        }
        if view.is_bulk_pending() {
            ui.spinner();
        }

        ui.add_space(20.0);

        let has_group = view.criteria().group_id().is_some();
        if button_with_icon(ui, has_group, FILE_CSV, "Export CSV").clicked()
            && let Some(path) = show_save_dialog(&view.export_filename("csv"))
        {
            let _ = view.export_csv(&path);
        }
        if button_with_icon(ui, has_group, FILE_XLS, "Export Excel").clicked()
            && let Some(path) = show_save_dialog(&view.export_filename("xlsx"))
        {
            let _ = view.export_excel(&path);
        }
    });
}

fn show_table(view: &mut AttendanceView, ui: &mut Ui) {
    if view.criteria().group_id().is_none() {
        ui.label(RichText::new("Select a class to see its roster.").weak());
        return;
    }

    let mut toggled: Option<String> = None;
    let visible = view.visible_records();

    ScrollArea::both().show(ui, |ui| {
        egui::Grid::new("attendance_roster_grid")
            .num_columns(6)
            .striped(true)
            .min_col_width(60.0)
            .spacing([12.0, 6.0])
            .show(ui, |ui| {
                ui.strong("");
                ui.strong("Name");
                ui.strong("ID");
                ui.strong("Status");
                ui.strong("Mode");
                ui.strong("Time");
                ui.end_row();

                for record in &visible {
                    let icon = if view.is_selected(&record.id) { CHECK_SQUARE } else { SQUARE };
                    if ui.button(icon).clicked() {
                        toggled = Some(record.id.clone());
                    }
                    ui.label(&record.subject_name);
                    ui.label(RichText::new(&record.subject_id).weak());
                    ui.colored_label(status_color(record.status), record.status.label());
                    ui.label(record.mode.map(|m| m.label()).unwrap_or("-"));
                    ui.label(record.time_label());
                    ui.end_row();
                }

                if visible.is_empty() && !view.is_loading() {
                    ui.label("");
                    ui.label("No records match the current filters.");
                    ui.end_row();
                }
            });
    });

    if let Some(id) = toggled {
        view.toggle_row(&id);
    }
}

fn status_filter_label(filter: StatusFilter) -> &'static str {
    match filter {
        StatusFilter::All => "All",
        StatusFilter::Only(status) => status.label(),
    }
}

fn mode_filter_label(filter: ModeFilter) -> &'static str {
    match filter {
        ModeFilter::All => "All",
        ModeFilter::Only(mode) => mode.label(),
    }
}
