//! Session domain — the state machine and the controller that drives it.
//!
//!   - state.rs      — pure `transition(state, event)` and the session value
//!   - controller.rs — async side effects, camera lease, analysis tickets

mod controller;
mod state;

pub use controller::SessionController;
pub use state::{
    transition, AnalysisJob, AnalysisTicket, CameraStatus, Event, Outcome, Rejection, Screen,
    SessionSnapshot, SessionState, Step, ANALYSIS_FAILED_MESSAGE, NO_IMAGE_MESSAGE,
};
