pub mod adaptation;
pub mod badge;
pub mod buddy;
pub mod course;
pub mod plan_change;
pub mod settings;
pub mod study_plan;
