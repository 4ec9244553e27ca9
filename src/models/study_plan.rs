use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::course::Difficulty;
use crate::services::schedule_utils::{self, hhmm};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SessionType {
    Lesson,
    Review,
    BonusReview,
    Practice,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Lesson => "lesson",
            SessionType::Review => "review",
            SessionType::BonusReview => "bonus-review",
            SessionType::Practice => "practice",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for SessionType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "lesson" => Ok(SessionType::Lesson),
            "review" => Ok(SessionType::Review),
            "bonus-review" => Ok(SessionType::BonusReview),
            "practice" => Ok(SessionType::Practice),
            other => Err(format!("unsupported session type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Upcoming,
    Completed,
    Missed,
    Rescheduled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Upcoming => "upcoming",
            SessionStatus::Completed => "completed",
            SessionStatus::Missed => "missed",
            SessionStatus::Rescheduled => "rescheduled",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Subject {
    Mathematics,
    Physics,
    Chemistry,
    Biology,
    Programming,
    Language,
    History,
    Economics,
    Arts,
    #[default]
    General,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Mathematics => "mathematics",
            Subject::Physics => "physics",
            Subject::Chemistry => "chemistry",
            Subject::Biology => "biology",
            Subject::Programming => "programming",
            Subject::Language => "language",
            Subject::History => "history",
            Subject::Economics => "economics",
            Subject::Arts => "arts",
            Subject::General => "general",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to schedule a session except where it lands on the calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStudySession {
    pub course_id: String,
    pub course_title: String,
    pub lesson_id: Option<String>,
    pub lesson_title: Option<String>,
    pub session_type: SessionType,
    pub is_optional: bool,
    pub difficulty: Difficulty,
    pub minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub course_id: String,
    pub course_title: String,
    #[serde(default)]
    pub lesson_id: Option<String>,
    #[serde(default)]
    pub lesson_title: Option<String>,
    #[serde(rename = "type")]
    pub session_type: SessionType,
    pub is_completed: bool,
    pub is_optional: bool,
    pub is_missed: bool,
    pub is_rescheduled: bool,
    #[serde(default)]
    pub original_date: Option<NaiveDate>,
    pub difficulty: Difficulty,
    pub estimated_minutes: i64,
    pub duration: i64,
    pub status: SessionStatus,
    #[serde(default)]
    pub subject: Subject,
    #[serde(default)]
    pub color_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StudySession {
    pub fn schedule(new: NewStudySession, date: NaiveDate, start_time: NaiveTime) -> Self {
        let minutes = new.minutes.max(0);
        Self {
            id: Uuid::new_v4().to_string(),
            date,
            start_time,
            end_time: schedule_utils::end_time_after(start_time, minutes),
            course_id: new.course_id,
            course_title: new.course_title,
            lesson_id: new.lesson_id,
            lesson_title: new.lesson_title,
            session_type: new.session_type,
            is_completed: false,
            is_optional: new.is_optional,
            is_missed: false,
            is_rescheduled: false,
            original_date: None,
            difficulty: new.difficulty,
            estimated_minutes: minutes,
            duration: minutes,
            status: SessionStatus::Upcoming,
            subject: Subject::General,
            color_code: String::new(),
            completed_at: None,
        }
    }

    pub fn display_title(&self) -> &str {
        self.lesson_title.as_deref().unwrap_or(&self.course_title)
    }

    /// Neither completed nor flagged missed.
    pub fn is_pending(&self) -> bool {
        !self.is_completed && !self.is_missed
    }

    /// Keeps `estimated_minutes`, `duration` and `end_time` in step.
    pub fn set_duration(&mut self, minutes: i64) {
        let minutes = minutes.max(0);
        self.estimated_minutes = minutes;
        self.duration = minutes;
        self.end_time = schedule_utils::end_time_after(self.start_time, minutes);
    }

    pub fn mark_completed(&mut self, at: DateTime<Utc>) {
        self.is_completed = true;
        self.is_missed = false;
        self.status = SessionStatus::Completed;
        self.completed_at = Some(at);
    }

    /// Reopens a completed session. A session whose date has passed goes back to missed.
    pub fn mark_incomplete(&mut self, today: NaiveDate) {
        self.is_completed = false;
        self.completed_at = None;
        if self.date < today {
            self.is_missed = true;
            self.status = SessionStatus::Missed;
        } else if self.is_rescheduled {
            self.status = SessionStatus::Rescheduled;
        } else {
            self.status = SessionStatus::Upcoming;
        }
    }

    /// Returns false when the session is already completed; completed sessions never go missed.
    pub fn mark_missed(&mut self) -> bool {
        if self.is_completed {
            return false;
        }
        self.is_missed = true;
        self.status = SessionStatus::Missed;
        true
    }

    /// Moves the session. `original_date` is captured on the first move only.
    pub fn reschedule_to(&mut self, date: NaiveDate) {
        if self.original_date.is_none() {
            self.original_date = Some(self.date);
        }
        self.date = date;
        self.is_rescheduled = true;
        self.is_missed = false;
        self.status = SessionStatus::Rescheduled;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudyPlan {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub exam_date: NaiveDate,
    pub sessions: Vec<StudySession>,
    pub total_estimated_hours: f64,
    pub progress_percentage: f64,
    pub is_active: bool,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub adaptation_reason: Option<String>,
    #[serde(default)]
    pub version: i64,
}

impl StudyPlan {
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        start_date: NaiveDate,
        exam_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            name: name.into(),
            start_date,
            exam_date,
            sessions: Vec::new(),
            total_estimated_hours: 0.0,
            progress_percentage: 0.0,
            is_active: true,
            last_updated: now,
            adaptation_reason: None,
            version: 0,
        }
    }

    /// Re-sorts sessions and recomputes progress. Call after every mutation.
    pub fn refresh(&mut self, now: DateTime<Utc>) {
        self.sessions
            .sort_by(|a, b| a.date.cmp(&b.date).then(a.start_time.cmp(&b.start_time)));
        self.progress_percentage = self.compute_progress();
        self.last_updated = now;
    }

    /// Recomputes `total_estimated_hours` from session durations; used after structural edits.
    pub fn recompute_total_hours(&mut self) {
        let minutes: i64 = self.sessions.iter().map(|session| session.duration).sum();
        self.total_estimated_hours = schedule_utils::round_to_tenth(minutes as f64 / 60.0);
    }

    fn compute_progress(&self) -> f64 {
        if self.sessions.is_empty() {
            return 0.0;
        }
        self.completed_count() as f64 / self.sessions.len() as f64 * 100.0
    }

    pub fn completed_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_completed).count()
    }

    pub fn missed_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_missed).count()
    }

    pub fn course_ids(&self) -> HashSet<&str> {
        self.sessions.iter().map(|s| s.course_id.as_str()).collect()
    }

    pub fn latest_session_date(&self) -> Option<NaiveDate> {
        self.sessions.iter().map(|s| s.date).max()
    }

    pub fn session(&self, session_id: &str) -> Option<&StudySession> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    pub fn session_mut(&mut self, session_id: &str) -> Option<&mut StudySession> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }

    pub fn sessions_on(&self, date: NaiveDate) -> impl Iterator<Item = &StudySession> {
        self.sessions.iter().filter(move |s| s.date == date)
    }

    /// Pending sessions from `from` onwards, in calendar order.
    pub fn upcoming_sessions(&self, from: NaiveDate, limit: usize) -> Vec<&StudySession> {
        self.sessions
            .iter()
            .filter(|s| s.date >= from && s.is_pending())
            .take(limit)
            .collect()
    }

    pub fn is_sorted_by_date(&self) -> bool {
        self.sessions.windows(2).all(|pair| pair[0].date <= pair[1].date)
    }
}

pub fn plan_name(distinct_courses: usize) -> String {
    match distinct_courses {
        1 => "Study plan · 1 course".to_string(),
        n => format!("Study plan · {n} courses"),
    }
}
