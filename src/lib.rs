//! Adaptive study planning: turns owned courses and preferences into a dated
//! session calendar, then keeps it honest as sessions are completed, missed
//! and rescheduled.
//!
//! [`services::study_planner_service::StudyPlannerService`] is the entry point.

pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use error::{AppError, AppResult};
pub use services::study_planner_service::StudyPlannerService;
