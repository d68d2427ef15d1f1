//! Status projection for the dashboard.
//! Folds drained `ChatEvent`s into a status line and a few flags, so the host
//! page does not have to interpret the event stream itself.

use serde::Serialize;

use console_types::event::ChatEvent;
use console_types::message::EntryKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "camelCase")]
pub enum Activity {
    Idle,
    /// A message is out, waiting for the backend's plan
    Sending,
    AwaitingApproval,
    /// Plan approved, waiting for its result
    Processing,
    Error(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleStatus {
    pub activity: Activity,
    pub status_text: String,
    pub connected: bool,
    /// Results that arrived for a session that is no longer current
    pub stale_results: u32,
    /// Last failure to save the chat locally, cleared on the next good run
    pub persist_warning: Option<String>,
}

impl ConsoleStatus {
    pub fn new() -> Self {
        Self {
            activity: Activity::Idle,
            status_text: "Ready".to_string(),
            connected: false,
            stale_results: 0,
            persist_warning: None,
        }
    }

    pub fn process_events(&mut self, events: &[ChatEvent]) {
        for event in events {
            match event {
                ChatEvent::HistoryAppended { entry } => {
                    if entry.kind == EntryKind::User
                        && matches!(self.activity, Activity::Idle | Activity::Error(_))
                    {
                        self.set(Activity::Sending, "Sending...");
                    }
                }
                ChatEvent::PlanReceived { .. } => {
                    self.set(Activity::AwaitingApproval, "Plan ready for approval");
                }
                ChatEvent::PlanRejected { .. } => {
                    self.set(Activity::Idle, "Plan rejected");
                }
                ChatEvent::ProcessingStarted { session_id } => {
                    self.status_text = format!("Executing plan {}...", session_id);
                    self.activity = Activity::Processing;
                }
                ChatEvent::Resolved { success: true, .. } => {
                    self.set(Activity::Idle, "Ready");
                }
                ChatEvent::Resolved { success: false, .. } | ChatEvent::TimedOut { .. } => {}
                ChatEvent::Error { message } => {
                    self.status_text = format!("Error: {}", message);
                    self.activity = Activity::Error(message.clone());
                }
                ChatEvent::StaleEventDropped { .. } => {
                    self.stale_results += 1;
                }
                ChatEvent::PersistFailed { message } => {
                    self.persist_warning = Some(message.clone());
                }
                ChatEvent::Reset => {
                    self.set(Activity::Idle, "Ready");
                    self.persist_warning = None;
                    self.stale_results = 0;
                }
            }
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.activity, Activity::Sending | Activity::Processing)
    }

    fn set(&mut self, activity: Activity, text: &str) {
        self.activity = activity;
        self.status_text = text.to_string();
    }
}

impl Default for ConsoleStatus {
    fn default() -> Self {
        Self::new()
    }
}
