pub mod api;
pub mod dispatcher;
pub mod incidents;
pub mod terminal;


pub use dispatcher::{
    ContainmentAction, ContainmentActionRequest, Playbook, PlaybookDispatcher, PlaybookOutcome,
    PlaybookRequest, INSIDER_REASON_PREFIX, MANUAL_OVERRIDE_TITLE,
};
pub use incidents::{Incident, IncidentSeverity, IncidentStatus, IncidentStore, MemoryIncidentStore};
pub use terminal::TerminalCommand;
