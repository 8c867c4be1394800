//! Shared event taxonomy and JSON codec for the classroom realtime wire.
//!
//! This crate owns the wire representation used by both `server` and
//! `client`. Every message on the relay protocol is one [`Event`], encoded
//! as a JSON text frame with an external `"type"` tag. Consumers drop
//! undecodable frames, which is what keeps the taxonomy extensible: an old
//! client simply ignores event kinds it does not know.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Error returned by [`decode`] and [`encode`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text frame is not a known event.
    #[error("failed to decode event: {0}")]
    Decode(#[source] serde_json::Error),
    /// The event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Numeric classroom group identifier.
pub type GroupId = u32;

/// The three graded classroom activities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKey {
    #[serde(rename = "a1")]
    A1,
    #[serde(rename = "a2")]
    A2,
    #[serde(rename = "a3")]
    A3,
}

impl ActivityKey {
    /// All activities, in dashboard order.
    pub const ALL: [ActivityKey; 3] = [ActivityKey::A1, ActivityKey::A2, ActivityKey::A3];

    /// Wire/storage name, e.g. `"a1"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKey::A1 => "a1",
            ActivityKey::A2 => "a2",
            ActivityKey::A3 => "a3",
        }
    }
}

impl std::fmt::Display for ActivityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Student-side seat role. Only recorders report progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Recorder,
    Operator,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Recorder => f.write_str("recorder"),
            Role::Operator => f.write_str("operator"),
        }
    }
}

/// One named value in a teacher-pushed lesson.
///
/// An explicit association list rather than a free-form object: the teacher
/// can still name the solution-indicator variable anything, but the wire
/// shape stays typed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VarBinding {
    pub name: String,
    pub value: serde_json::Value,
}

/// Teacher-pushed demo program for the code-reading activity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeLesson {
    pub code: String,
    pub code_info: Vec<VarBinding>,
    pub total_heads: u32,
    pub total_legs: u32,
}

/// Teacher-pushed optimization directions for the exploration activity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectionLesson {
    pub directions: Vec<String>,
    /// Milliseconds since the Unix epoch at push time.
    pub timestamp: i64,
}

/// Recorder-side exploration progress, mirrored to the teacher console.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorationState {
    pub optimization_direction: String,
    pub python_code: String,
    pub run_output: String,
    pub has_error: bool,
    pub stars: u32,
}

/// Operator-side draft, mirrored to the group's recorder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorDraft {
    pub optimization_direction: String,
    pub python_code: String,
    pub run_output: String,
    pub has_error: bool,
}

/// The tagged union carried on the relay wire.
///
/// The relay treats most kinds opaquely (rebroadcast to other connections);
/// only the teacher-broadcast family and the liveness ping get special
/// handling server-side. See the `server` crate for the dispatch table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A student seat claimed a group (also re-announced on reload and ping).
    #[serde(rename = "session:login", rename_all = "camelCase")]
    SessionLogin {
        group_id: GroupId,
        #[serde(default)]
        role: Option<Role>,
    },
    /// A student seat released its group.
    #[serde(rename = "session:logout", rename_all = "camelCase")]
    SessionLogout {
        group_id: GroupId,
        #[serde(default)]
        role: Option<Role>,
    },
    /// A recorder reported an activity score. State-setting, not a delta:
    /// duplicate delivery folds to the same result.
    #[serde(rename = "student:update", rename_all = "camelCase")]
    StudentUpdate {
        group_id: GroupId,
        activity: ActivityKey,
        stars: u32,
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    /// Teacher liveness probe; every client re-announces itself in response.
    #[serde(rename = "teacher:ping")]
    TeacherPing,
    /// Teacher pushed the demo program for the code-reading activity.
    #[serde(rename = "teacher:broadcast")]
    TeacherBroadcast {
        activity: ActivityKey,
        data: CodeLesson,
    },
    /// Teacher pushed the direction list for the exploration activity.
    #[serde(rename = "teacher:activity3:broadcast")]
    TeacherDirectionsBroadcast {
        activity: ActivityKey,
        data: DirectionLesson,
    },
    /// A late-joining student asked the relay for the latest retained
    /// broadcast of an activity.
    #[serde(rename = "student:request-broadcast", rename_all = "camelCase")]
    RequestBroadcast {
        activity: ActivityKey,
        group_id: GroupId,
    },
    /// Recorder exploration progress, relayed opaquely.
    #[serde(rename = "activity3:sync", rename_all = "camelCase")]
    ExplorationSync {
        group_id: GroupId,
        data: ExplorationState,
    },
    /// Operator draft, relayed opaquely.
    #[serde(rename = "activity3:operator-sync", rename_all = "camelCase")]
    OperatorSync {
        group_id: GroupId,
        data: OperatorDraft,
    },
    /// Teacher signed out; the relay drops retained broadcasts.
    #[serde(rename = "teacher:logout")]
    TeacherLogout,
    /// Teacher explicitly wiped retained broadcasts.
    #[serde(rename = "teacher:clear-broadcasts")]
    ClearBroadcasts,
    /// Relay acknowledgement that retention was wiped; clients drop their
    /// local copies of pushed content.
    #[serde(rename = "teacher:broadcasts-cleared")]
    BroadcastsCleared,
}

impl Event {
    /// The wire tag, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Event::SessionLogin { .. } => "session:login",
            Event::SessionLogout { .. } => "session:logout",
            Event::StudentUpdate { .. } => "student:update",
            Event::TeacherPing => "teacher:ping",
            Event::TeacherBroadcast { .. } => "teacher:broadcast",
            Event::TeacherDirectionsBroadcast { .. } => "teacher:activity3:broadcast",
            Event::RequestBroadcast { .. } => "student:request-broadcast",
            Event::ExplorationSync { .. } => "activity3:sync",
            Event::OperatorSync { .. } => "activity3:operator-sync",
            Event::TeacherLogout => "teacher:logout",
            Event::ClearBroadcasts => "teacher:clear-broadcasts",
            Event::BroadcastsCleared => "teacher:broadcasts-cleared",
        }
    }

    /// The group this event concerns, when it carries one.
    #[must_use]
    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            Event::SessionLogin { group_id, .. }
            | Event::SessionLogout { group_id, .. }
            | Event::StudentUpdate { group_id, .. }
            | Event::RequestBroadcast { group_id, .. }
            | Event::ExplorationSync { group_id, .. }
            | Event::OperatorSync { group_id, .. } => Some(*group_id),
            _ => None,
        }
    }
}

/// Encode an event into a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode(event: &Event) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(CodecError::Encode)
}

/// Decode a JSON text frame into an event.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed JSON or unknown tags.
pub fn decode(text: &str) -> Result<Event, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Decode)
}

/// Current time as milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
