//! GUI panels and application state.

pub mod attendance_panel;
pub mod attendance_view;
pub mod components;
pub mod main_app;

pub use attendance_view::{AttendanceView, Notice};
pub use main_app::MainApp;
