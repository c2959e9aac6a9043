use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Validation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },
    #[error("{field} is invalid")]
    Invalid { field: &'static str },
}

fn check_text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required { field });
    }
    check_optional_text(field, Some(value), max)
}

fn check_optional_text(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<(), ValidationError> {
    match value {
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong { field, max }),
        _ => Ok(()),
    }
}

// ============================================================================
// User Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public projection of a user embedded in group, task and streak listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub timezone: String,
}

impl SignupRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_text("name", &self.name, 100)?;
        check_text("email", &self.email, 254)?;
        if !self.email.contains('@') {
            return Err(ValidationError::Invalid { field: "email" });
        }
        if self.password.chars().count() < 8 {
            return Err(ValidationError::TooShort { field: "password", min: 8 });
        }
        check_text("timezone", &self.timezone, 64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

// ============================================================================
// Group Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Admin,
    Member,
}

impl GroupRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::Admin => "admin",
            GroupRole::Member => "member",
        }
    }

    /// Admins edit the group, manage invite links, handle join requests and remove members
    pub fn can_moderate(&self) -> bool {
        matches!(self, GroupRole::Admin)
    }
}

impl FromStr for GroupRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(GroupRole::Admin),
            "member" => Ok(GroupRole::Member),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub description: Option<String>,
}

impl CreateGroupRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_text("name", &self.name, 100)?;
        check_optional_text("description", self.description.as_deref(), 500)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl UpdateGroupRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(ref name) = self.name {
            check_text("name", name, 100)?;
        }
        check_optional_text("description", self.description.as_deref(), 500)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub role: GroupRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberWithUser {
    pub membership: GroupMember,
    pub user: UserSummary,
}

/// A group as seen by one of its members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupWithRole {
    pub group: Group,
    pub owner: UserSummary,
    pub role: GroupRole,
    pub member_count: i64,
}

/// A group the caller can browse and ask to join
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicGroup {
    pub group: Group,
    pub owner: UserSummary,
    pub member_count: i64,
    pub has_pending_request: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDetails {
    pub group: Group,
    pub owner: UserSummary,
    pub members: Vec<MemberWithUser>,
    pub task_count: i64,
    pub goal_count: i64,
    pub user_role: GroupRole,
    /// Only present for admins
    pub invite_token: Option<String>,
}

// ============================================================================
// Invite Link Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteLink {
    pub invite_token: String,
    pub invite_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitePreview {
    pub group: Group,
    pub owner: UserSummary,
    pub member_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGroupResponse {
    pub group_id: Uuid,
}

// ============================================================================
// Join Request Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl JoinRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinRequestStatus::Pending => "pending",
            JoinRequestStatus::Approved => "approved",
            JoinRequestStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for JoinRequestStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JoinRequestStatus::Pending),
            "approved" => Ok(JoinRequestStatus::Approved),
            "rejected" => Ok(JoinRequestStatus::Rejected),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub message: Option<String>,
    pub status: JoinRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequestWithUser {
    pub request: JoinRequest,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateJoinRequestRequest {
    pub message: Option<String>,
}

impl CreateJoinRequestRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_optional_text("message", self.message.as_deref(), 300)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinRequestAction {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleJoinRequestRequest {
    pub request_id: Uuid,
    pub action: JoinRequestAction,
}

// ============================================================================
// Daily Task Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Missed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::Missed => "missed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "completed" => Ok(TaskStatus::Completed),
            "missed" => Ok(TaskStatus::Missed),
            _ => Err(()),
        }
    }
}

/// One commitment of one user in one group for one calendar day.
///
/// `date` is the start of that day in the owner's timezone, stored as a UTC instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTask {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub status: TaskStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWithUser {
    pub task: DailyTask,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    /// Any instant within the intended day; normalized server-side
    pub date: DateTime<Utc>,
}

impl CreateTaskRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_text("title", &self.title, 200)?;
        check_optional_text("description", self.description.as_deref(), 1000)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
}

impl UpdateTaskRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(ref title) = self.title {
            check_text("title", title, 200)?;
        }
        check_optional_text("description", self.description.as_deref(), 1000)
    }

    pub fn edits_details(&self) -> bool {
        self.title.is_some() || self.description.is_some()
    }
}

/// An unresolved task whose day has fully elapsed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTask {
    pub task: DailyTask,
    pub days_pending: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTaskWithGroup {
    pub pending: PendingTask,
    pub group: GroupRef,
}

// ============================================================================
// Streak Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Streak {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub current_streak: u32,
    pub best_streak: u32,
    pub last_task_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakWithUser {
    pub streak: Streak,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakWithGroup {
    pub streak: Streak,
    pub group: GroupRef,
}

// ============================================================================
// Goal Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    ShortTerm,
    LongTerm,
}

impl GoalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalType::ShortTerm => "short_term",
            GoalType::LongTerm => "long_term",
        }
    }
}

impl FromStr for GoalType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "short_term" => Ok(GoalType::ShortTerm),
            "long_term" => Ok(GoalType::LongTerm),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Active,
    Completed,
    Abandoned,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Completed => "completed",
            GoalStatus::Abandoned => "abandoned",
        }
    }
}

impl FromStr for GoalStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(GoalStatus::Active),
            "completed" => Ok(GoalStatus::Completed),
            "abandoned" => Ok(GoalStatus::Abandoned),
            _ => Err(()),
        }
    }
}

/// Checklist entry of a short-term goal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    pub completed: bool,
}

/// Dated checkpoint of a long-term goal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub date: DateTime<Utc>,
    pub text: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub goal_type: GoalType,
    pub items: Vec<ChecklistItem>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub milestones: Vec<Milestone>,
    pub status: GoalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    /// Fraction of checklist items or milestones marked completed, in `0.0..=1.0`
    pub fn progress(&self) -> f64 {
        let (done, total) = match self.goal_type {
            GoalType::ShortTerm => (
                self.items.iter().filter(|i| i.completed).count(),
                self.items.len(),
            ),
            GoalType::LongTerm => (
                self.milestones.iter().filter(|m| m.completed).count(),
                self.milestones.len(),
            ),
        };
        if total == 0 {
            0.0
        } else {
            done as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalWithUser {
    pub goal: Goal,
    pub user: UserSummary,
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGoalRequest {
    pub title: String,
    pub description: Option<String>,
    pub goal_type: GoalType,
    pub items: Option<Vec<ChecklistItem>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub milestones: Option<Vec<Milestone>>,
}

impl CreateGoalRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_text("title", &self.title, 200)?;
        check_optional_text("description", self.description.as_deref(), 1000)?;
        check_date_range(self.start_date, self.end_date)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateGoalRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub items: Option<Vec<ChecklistItem>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub milestones: Option<Vec<Milestone>>,
    pub status: Option<GoalStatus>,
}

impl UpdateGoalRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(ref title) = self.title {
            check_text("title", title, 200)?;
        }
        check_optional_text("description", self.description.as_deref(), 1000)?;
        check_date_range(self.start_date, self.end_date)
    }
}

fn check_date_range(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<(), ValidationError> {
    match (start, end) {
        (Some(s), Some(e)) if e < s => Err(ValidationError::Invalid { field: "end_date" }),
        _ => Ok(()),
    }
}

// ============================================================================
// Dashboard Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardGroup {
    pub group: Group,
    pub role: GroupRole,
    pub member_count: i64,
    pub pending_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub groups: Vec<DashboardGroup>,
    pub streaks: Vec<StreakWithGroup>,
    pub pending_tasks: Vec<PendingTaskWithGroup>,
    pub best_streak: u32,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSuccess<T> {
    pub data: T,
}

impl<T> ApiSuccess<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Tests
// ============================================================================
