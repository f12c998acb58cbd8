//! Inbound events to the controller.
//!
//! The hosting runtime owns every subscription.  It turns device callbacks
//! and timer fires into [`Input`]s and hands them to
//! [`Controller::handle`](super::service::Controller::handle) one at a
//! time, each processed to completion before the next.

use crate::app::ports::SwitchState;
use crate::scheduler::ScheduledEvent;
use crate::sensors::SensorRole;

/// Events that adapters feed into the application core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// A sensor in the given cluster reported a new humidity value.
    SensorEvent(SensorRole),

    /// One of the must-be-off / must-be-on interlock switches changed.
    InterlockChanged,

    /// The fan reported a state change on its own event stream.
    FanReported(SwitchState),

    /// A timer scheduled through the [`TimerService`](super::ports::TimerService) fired.
    Timer(ScheduledEvent),
}
