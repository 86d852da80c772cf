/*!
 * Connection and SD card control state
 *
 * Tracks whether the controller board is reachable and who holds the card.
 * Every transition to `Disconnected` starts a new generation; responses
 * carrying a [`Ticket`] from an older generation belong to a connection that
 * no longer exists and must be dropped by the caller.
 */

use strum::Display;
use tracing::{info, warn};

use crate::error::{MasterSdError, Result};

/// Side currently holding the SD card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Controller {
    /// The 3D printer reads the card
    #[strum(to_string = "3D Printer")]
    Host,
    /// MasterSD owns the card and can change its contents
    #[strum(to_string = "MasterSD")]
    MasterDevice,
    /// The device has not reported yet
    Unknown,
}

impl Controller {
    /// Interpret the backend's controller flag
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Self::MasterDevice,
            Some(false) => Self::Host,
            None => Self::Unknown,
        }
    }

    /// Label of the action that hands the card to the other side
    pub fn switch_label(&self) -> &'static str {
        match self {
            Self::MasterDevice => "Return Control",
            _ => "Take Control",
        }
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected { controller: Controller },
}

/// Proof that a request was issued under the current connection and card holder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
}

/// Connection state machine for one client
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    generation: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            generation: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Controller while connected
    pub fn controller(&self) -> Option<Controller> {
        match self.state {
            SessionState::Connected { controller } => Some(controller),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected { .. })
    }

    /// Whether MasterSD holds the card, i.e. the listing may be used
    pub fn holds_card(&self) -> bool {
        self.controller() == Some(Controller::MasterDevice)
    }

    /// Take/return control is only offered once the controller is known
    pub fn can_switch_control(&self) -> bool {
        matches!(
            self.controller(),
            Some(Controller::Host | Controller::MasterDevice)
        )
    }

    /// Ticket for a request issued now
    pub fn ticket(&self) -> Ticket {
        Ticket {
            generation: self.generation,
        }
    }

    /// Whether a response to `ticket` may still be applied
    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.generation == self.generation && self.state != SessionState::Disconnected
    }

    /// Start connecting, returning the ticket for the connect request
    pub fn begin_connect(&mut self) -> Result<Ticket> {
        if self.state != SessionState::Disconnected {
            return Err(MasterSdError::AlreadyConnected);
        }
        self.state = SessionState::Connecting;
        Ok(self.ticket())
    }

    /// Connect succeeded
    pub fn connected(&mut self, flag: Option<bool>) -> Controller {
        let controller = Controller::from_flag(flag);
        info!(%controller, "Connected to MasterSD");
        self.state = SessionState::Connected { controller };
        controller
    }

    /// Connect failed on every port
    pub fn connect_failed(&mut self) {
        warn!("Could not connect to MasterSD");
        self.reset();
    }

    /// Switch control succeeded with the new flag
    ///
    /// Losing the card discards the listing, so requests issued while it was
    /// held stop being current.
    pub fn control_switched(&mut self, flag: Option<bool>) -> Controller {
        let controller = Controller::from_flag(flag);
        info!(%controller, "SD card control switched");
        if controller != Controller::MasterDevice {
            self.generation += 1;
        }
        self.state = SessionState::Connected { controller };
        controller
    }

    /// The device gave the card back on its own, e.g. to run a file
    pub fn control_released(&mut self) {
        if self.is_connected() {
            info!("MasterSD released the SD card");
            self.generation += 1;
            self.state = SessionState::Connected {
                controller: Controller::Host,
            };
        }
    }

    /// Disconnect succeeded
    pub fn disconnected(&mut self) {
        info!("Disconnected from MasterSD");
        self.reset();
    }

    /// The serial port went away underneath the connection
    pub fn port_lost(&mut self) {
        if self.state != SessionState::Disconnected {
            warn!("MasterSD serial port lost");
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.state = SessionState::Disconnected;
        self.generation += 1;
    }
}
