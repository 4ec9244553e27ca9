pub mod badge_evaluator;
pub mod buddy_notifier;
pub mod plan_cache;
pub mod plan_merger;
pub mod progress_analyzer;
pub mod reschedule_service;
pub mod schedule_utils;
pub mod session_generator;
pub mod settings_service;
pub mod study_planner_service;
pub mod subject_classifier;
