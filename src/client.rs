/*!
 * MasterSD client
 *
 * Ties the backend [`Transport`], the connection [`Session`] and the
 * [`SdTreeStore`] together. Local state only changes on the success path of
 * a backend call, and only if the connection that issued the call is still
 * the current one.
 *
 * Each operation comes in two halves: a method that validates against the
 * current state and issues the call, and an `on_*` handler that applies the
 * response. Event-driven callers can dispatch the call themselves and feed
 * the response to the handler later, together with the [`Ticket`] taken
 * when the call went out.
 */

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{MasterSdError, Result};
use crate::session::{Controller, Session, Ticket};
use crate::store::SdTreeStore;
use crate::transport::{
    RawListing, Transport, TransportResult, WriteRequest, WriteResponse, MAX_UPLOAD_BYTES,
};
use crate::utils::{port_options, resolve_ports, AUTO_PORT};
use crate::bail;

/// Result of delivering a backend response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The response was applied to local state
    Applied(T),
    /// The response arrived after its connection was closed and was dropped
    Ignored,
}

impl<T> Outcome<T> {
    /// Applied value, if any
    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Ignored => None,
        }
    }
}

/// Client for one MasterSD board behind a host backend
pub struct MasterSd<T: Transport> {
    transport: T,
    session: Session,
    store: SdTreeStore,
    ports: Vec<String>,
}

impl<T: Transport> MasterSd<T> {
    /// Create a disconnected client
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            session: Session::new(),
            store: SdTreeStore::new(),
            ports: vec![AUTO_PORT.to_string()],
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &SdTreeStore {
        &self.store
    }

    /// Browse into another folder of the listing
    pub fn enter(&mut self, path: &str) -> Result<()> {
        self.store.enter(path)
    }

    /// Ticket for a call issued now
    pub fn ticket(&self) -> Ticket {
        self.session.ticket()
    }

    /// Port choices, `AUTO` first
    pub fn port_options(&self) -> &[String] {
        &self.ports
    }

    /// Ask the host for its serial ports and update the port choices
    pub fn refresh_ports(&mut self) -> Result<&[String]> {
        let ports = self.transport.serial_ports()?;
        self.update_ports(ports.as_slice());
        Ok(&self.ports)
    }

    /// Feed the host's current serial port list
    ///
    /// Losing every MasterSD candidate means the board is gone: the
    /// connection is dropped along with the listing.
    pub fn update_ports<S: AsRef<str>>(&mut self, ports: &[S]) {
        self.ports = port_options(ports);
        if self.ports.len() == 1 {
            self.session.port_lost();
            self.store.clear();
        }
    }

    /// Connect to the board on the selected ports (`AUTO` tries all of them)
    pub fn connect(&mut self, selection: &[String]) -> Result<Outcome<Controller>> {
        let ports = resolve_ports(selection, &self.ports);
        if ports.is_empty() {
            return Err(MasterSdError::NoPorts);
        }
        let ticket = self.session.begin_connect()?;
        info!(?ports, "Connecting to MasterSD");
        let response = self.transport.connect(&ports);
        self.on_connected(ticket, response)
    }

    pub fn on_connected(
        &mut self,
        ticket: Ticket,
        response: TransportResult<Option<bool>>,
    ) -> Result<Outcome<Controller>> {
        if !self.accepts(ticket, "connect") {
            return Ok(Outcome::Ignored);
        }

        match response {
            Ok(flag) => {
                let controller = self.session.connected(flag);
                if controller == Controller::MasterDevice {
                    self.refresh()?;
                }
                Ok(Outcome::Applied(controller))
            }
            Err(e) => {
                self.session.connect_failed();
                self.store.clear();
                Err(e.into())
            }
        }
    }

    /// Close the connection, handing the card back first on the backend side
    pub fn disconnect(&mut self) -> Result<Outcome<()>> {
        ensure_connected(&self.session)?;
        let ticket = self.session.ticket();
        let response = self.transport.disconnect();
        self.on_disconnected(ticket, response)
    }

    pub fn on_disconnected(
        &mut self,
        ticket: Ticket,
        response: TransportResult<()>,
    ) -> Result<Outcome<()>> {
        if !self.accepts(ticket, "disconnect") {
            return Ok(Outcome::Ignored);
        }

        response?;
        self.session.disconnected();
        self.store.clear();
        Ok(Outcome::Applied(()))
    }

    /// Hand the card to the other side
    pub fn switch_control(&mut self) -> Result<Outcome<Controller>> {
        ensure_connected(&self.session)?;
        if !self.session.can_switch_control() {
            return Err(MasterSdError::ControlUnavailable);
        }
        let ticket = self.session.ticket();
        let response = self.transport.switch_control();
        self.on_control_switched(ticket, response)
    }

    pub fn on_control_switched(
        &mut self,
        ticket: Ticket,
        response: TransportResult<Option<bool>>,
    ) -> Result<Outcome<Controller>> {
        if !self.accepts(ticket, "switch_control") {
            return Ok(Outcome::Ignored);
        }

        let controller = self.session.control_switched(response?);
        if controller == Controller::MasterDevice {
            self.refresh()?;
        } else {
            self.store.clear();
        }
        Ok(Outcome::Applied(controller))
    }

    /// Fetch the whole listing again
    pub fn refresh(&mut self) -> Result<Outcome<()>> {
        ensure_card(&self.session)?;
        let ticket = self.session.ticket();
        let response = self.transport.get_info();
        self.on_listing(ticket, response)
    }

    pub fn on_listing(
        &mut self,
        ticket: Ticket,
        response: TransportResult<RawListing>,
    ) -> Result<Outcome<()>> {
        if !self.accepts(ticket, "get_info") {
            return Ok(Outcome::Ignored);
        }

        match response {
            Ok(raw) => {
                self.store.replace_listing(raw)?;
                Ok(Outcome::Applied(()))
            }
            Err(e) => {
                // Showing nothing beats showing a listing that may be wrong
                self.store.clear();
                Err(e.into())
            }
        }
    }

    /// Create `name` under `parent`
    pub fn mkdir(&mut self, parent: &str, name: &str) -> Result<Outcome<String>> {
        self.ensure_listing()?;
        let path = self.store.validate_new_folder(parent, name)?;
        let ticket = self.session.ticket();
        let response = self.transport.mkdir(&path);
        self.on_folder_created(ticket, parent, name, response)
    }

    pub fn on_folder_created(
        &mut self,
        ticket: Ticket,
        parent: &str,
        name: &str,
        response: TransportResult<()>,
    ) -> Result<Outcome<String>> {
        if !self.accepts(ticket, "mkdir") {
            return Ok(Outcome::Ignored);
        }

        response?;
        let path = self.store.create_folder(parent, name)?;
        Ok(Outcome::Applied(path))
    }

    /// Delete a folder and everything below it
    pub fn rmdir(&mut self, path: &str) -> Result<Outcome<()>> {
        self.ensure_listing()?;
        self.store.validate_folder_removal(path)?;
        let ticket = self.session.ticket();
        let response = self.transport.rmdir(path);
        self.on_folder_removed(ticket, path, response)
    }

    pub fn on_folder_removed(
        &mut self,
        ticket: Ticket,
        path: &str,
        response: TransportResult<()>,
    ) -> Result<Outcome<()>> {
        if !self.accepts(ticket, "rmdir") {
            return Ok(Outcome::Ignored);
        }

        response?;
        let applied = self.store.delete_folder(path);
        self.settle(applied)
    }

    /// Delete one file
    pub fn delete(&mut self, path: &str) -> Result<Outcome<()>> {
        self.ensure_listing()?;
        self.store.file(path)?;
        let ticket = self.session.ticket();
        let response = self.transport.delete(path);
        self.on_file_deleted(ticket, path, response)
    }

    pub fn on_file_deleted(
        &mut self,
        ticket: Ticket,
        path: &str,
        response: TransportResult<()>,
    ) -> Result<Outcome<()>> {
        if !self.accepts(ticket, "delete") {
            return Ok(Outcome::Ignored);
        }

        response?;
        let applied = self.store.delete_file(path);
        self.settle(applied)
    }

    /// Stage a local file on the host and write it into `folder`
    pub fn upload(
        &mut self,
        file: &Path,
        folder: &str,
        run: bool,
    ) -> Result<Outcome<WriteResponse>> {
        self.ensure_listing()?;
        if !self.store.has_folder(folder) {
            bail!(FolderNotFound, "{}", folder);
        }

        let size = fs::metadata(file)?.len();
        if size > MAX_UPLOAD_BYTES {
            return Err(MasterSdError::UploadTooLarge {
                size,
                limit: MAX_UPLOAD_BYTES,
            });
        }

        let ticket = self.session.ticket();
        info!(file = %file.display(), size, "Staging file on host");
        let name = self.transport.upload(file)?;
        if !self.accepts(ticket, "upload") {
            return Ok(Outcome::Ignored);
        }

        let request = WriteRequest {
            name,
            path: folder.to_string(),
            run,
        };
        let response = self.transport.write_sd(&request);
        self.on_file_written(ticket, folder, response)
    }

    pub fn on_file_written(
        &mut self,
        ticket: Ticket,
        folder: &str,
        response: TransportResult<WriteResponse>,
    ) -> Result<Outcome<WriteResponse>> {
        if !self.accepts(ticket, "write_sd") {
            return Ok(Outcome::Ignored);
        }

        let written = response?;
        let applied = self
            .store
            .write_file(folder, &written.name, written.size, written.autorun);
        if written.autorun {
            self.session.control_released();
        }
        self.settle(applied)?;
        Ok(Outcome::Applied(written))
    }

    fn accepts(&self, ticket: Ticket, call: &str) -> bool {
        let current = self.session.is_current(ticket);
        if !current {
            debug!(call, "Dropping response from a closed connection");
        }
        current
    }

    fn ensure_listing(&self) -> Result<()> {
        ensure_card(&self.session)?;
        if !self.store.is_loaded() {
            return Err(MasterSdError::NoListing);
        }
        Ok(())
    }

    /// Re-fetch after a local apply found the listing out of step with the card
    fn settle(&mut self, applied: Result<()>) -> Result<Outcome<()>> {
        match applied {
            Ok(()) => Ok(Outcome::Applied(())),
            Err(e) if e.is_consistency_error() => {
                warn!("Listing discarded ({}), fetching a fresh one", e);
                if let Err(refresh) = self.refresh() {
                    warn!("Re-fetch failed: {}", refresh);
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

fn ensure_connected(session: &Session) -> Result<()> {
    if !session.is_connected() {
        return Err(MasterSdError::NotConnected);
    }
    Ok(())
}

fn ensure_card(session: &Session) -> Result<()> {
    ensure_connected(session)?;
    if !session.holds_card() {
        return Err(MasterSdError::NotInControl);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::transport::mock::MockTransport;
    use crate::transport::RawFile;
    use crate::types::Space;
    use std::fs::File;
    use tempfile::tempdir;

    fn listing() -> RawListing {
        RawListing {
            folders: vec!["/sdcard".to_string(), "/sdcard/prints".to_string()],
            files: vec![RawFile {
                name: "a.gcode".to_string(),
                size: 40,
                folder: 1,
            }],
            free_size: 960,
            taken_size: 40,
        }
    }

    fn connected() -> MasterSd<MockTransport> {
        let mut client = MasterSd::new(MockTransport::with_listing(listing()));
        client.refresh_ports().unwrap();
        let outcome = client.connect(&[AUTO_PORT.to_string()]).unwrap();
        assert_eq!(outcome, Outcome::Applied(Controller::MasterDevice));
        client
    }

    #[test]
    fn test_connect_as_master_fetches_listing() {
        let client = connected();

        assert!(client.session().holds_card());
        assert!(client.store().is_loaded());
        assert_eq!(
            client.transport().calls(),
            vec!["serial_ports", "connect /dev/ttyACM0", "get_info"]
        );
    }

    #[test]
    fn test_connect_failure_resets_state() {
        let transport = MockTransport::with_listing(listing());
        transport.fail("connect");
        let mut client = MasterSd::new(transport);

        let result = client.connect(&["/dev/ttyACM3".to_string()]);
        assert!(matches!(result, Err(MasterSdError::Transport(_))));
        assert_eq!(client.session().state(), SessionState::Disconnected);
        assert!(!client.store().is_loaded());
    }

    #[test]
    fn test_switch_control_round_trip() {
        let mut transport = MockTransport::with_listing(listing());
        transport.connect_flag = Some(false);
        let mut client = MasterSd::new(transport);

        assert_eq!(
            client.connect(&["/dev/ttyACM0".to_string()]).unwrap(),
            Outcome::Applied(Controller::Host)
        );
        assert!(!client.store().is_loaded());
        assert!(matches!(client.refresh(), Err(MasterSdError::NotInControl)));

        assert_eq!(
            client.switch_control().unwrap(),
            Outcome::Applied(Controller::MasterDevice)
        );
        assert!(client.store().is_loaded());

        assert_eq!(
            client.switch_control().unwrap(),
            Outcome::Applied(Controller::Host)
        );
        assert!(!client.store().is_loaded());
    }

    #[test]
    fn test_switch_refused_while_controller_unknown() {
        let mut transport = MockTransport::with_listing(listing());
        transport.connect_flag = None;
        let mut client = MasterSd::new(transport);
        client.connect(&["/dev/ttyACM0".to_string()]).unwrap();

        assert!(matches!(
            client.switch_control(),
            Err(MasterSdError::ControlUnavailable)
        ));
        assert!(!client.transport().calls().contains(&"switch_control".to_string()));
    }

    #[test]
    fn test_mkdir_applies_after_success() {
        let mut client = connected();

        let outcome = client.mkdir("/sdcard", "models").unwrap();
        assert_eq!(outcome, Outcome::Applied("/sdcard/models".to_string()));
        assert!(client.store().has_folder("/sdcard/models"));
    }

    #[test]
    fn test_mkdir_invalid_name_never_reaches_backend() {
        let mut client = connected();

        assert!(matches!(
            client.mkdir("/sdcard", "prints"),
            Err(MasterSdError::InvalidName(_))
        ));
        assert!(!client
            .transport()
            .calls()
            .iter()
            .any(|call| call.starts_with("mkdir")));
    }

    #[test]
    fn test_transport_failure_leaves_listing_untouched() {
        let mut client = connected();
        let before = client.store().listing().cloned();
        client.transport().fail("delete");
        client.transport().fail("rmdir");

        assert!(matches!(
            client.delete("/sdcard/prints/a.gcode"),
            Err(MasterSdError::Transport(_))
        ));
        assert!(matches!(
            client.rmdir("/sdcard/prints"),
            Err(MasterSdError::Transport(_))
        ));
        assert_eq!(client.store().listing().cloned(), before);
    }

    #[test]
    fn test_delete_and_rmdir() {
        let mut client = connected();

        client.delete("/sdcard/prints/a.gcode").unwrap();
        assert_eq!(
            client.store().current_space(),
            Space {
                free_bytes: 1000,
                used_bytes: 0
            }
        );

        client.rmdir("/sdcard/prints").unwrap();
        assert!(!client.store().has_folder("/sdcard/prints"));
    }

    #[test]
    fn test_response_after_port_loss_is_ignored() {
        let mut client = connected();
        let ticket = client.ticket();

        client.update_ports(&["/dev/ttyUSB0"]);
        assert_eq!(client.session().state(), SessionState::Disconnected);
        assert!(!client.store().is_loaded());

        let outcome = client
            .on_file_deleted(ticket, "/sdcard/prints/a.gcode", Ok(()))
            .unwrap();
        assert_eq!(outcome, Outcome::Ignored);

        let outcome = client.on_listing(ticket, Ok(listing())).unwrap();
        assert_eq!(outcome, Outcome::Ignored);
        assert!(!client.store().is_loaded());
    }

    #[test]
    fn test_response_after_reconnect_is_ignored() {
        let mut client = connected();
        let ticket = client.ticket();

        client.disconnect().unwrap();
        client.connect(&[AUTO_PORT.to_string()]).unwrap();

        let outcome = client
            .on_folder_created(ticket, "/sdcard", "late", Ok(()))
            .unwrap();
        assert_eq!(outcome, Outcome::Ignored);
        assert!(!client.store().has_folder("/sdcard/late"));
    }

    #[test]
    fn test_response_after_control_handback_is_ignored() {
        let mut client = connected();
        let ticket = client.ticket();

        assert_eq!(
            client.switch_control().unwrap(),
            Outcome::Applied(Controller::Host)
        );
        assert_eq!(
            client.switch_control().unwrap(),
            Outcome::Applied(Controller::MasterDevice)
        );

        let outcome = client
            .on_file_deleted(ticket, "/sdcard/prints/a.gcode", Ok(()))
            .unwrap();
        assert_eq!(outcome, Outcome::Ignored);
        assert!(client.store().file("/sdcard/prints/a.gcode").is_ok());
        assert_eq!(
            client.store().current_space(),
            Space {
                free_bytes: 960,
                used_bytes: 40
            }
        );
    }

    #[test]
    fn test_write_after_autorun_is_ignored() {
        let mut client = connected();
        let ticket = client.ticket();

        let written = WriteResponse {
            name: "run.gcode".to_string(),
            size: 10,
            autorun: true,
        };
        client
            .on_file_written(ticket, "/sdcard", Ok(written))
            .unwrap();
        assert_eq!(client.session().controller(), Some(Controller::Host));

        // The printer now holds the card, so the next switch takes it back
        client.transport().control.set(Some(false));
        client.switch_control().unwrap();
        assert!(client.store().is_loaded());

        let late = WriteResponse {
            name: "late.gcode".to_string(),
            size: 10,
            autorun: false,
        };
        let outcome = client
            .on_file_written(ticket, "/sdcard", Ok(late))
            .unwrap();
        assert_eq!(outcome, Outcome::Ignored);
        assert!(client.store().file("/sdcard/late.gcode").is_err());
    }

    #[test]
    fn test_connect_without_candidates() {
        let mut transport = MockTransport::with_listing(listing());
        transport.ports = vec!["/dev/ttyUSB0".to_string()];
        let mut client = MasterSd::new(transport);
        client.refresh_ports().unwrap();

        assert!(matches!(
            client.connect(&[AUTO_PORT.to_string()]),
            Err(MasterSdError::NoPorts)
        ));
        assert_eq!(client.session().state(), SessionState::Disconnected);
        assert_eq!(client.transport().calls(), vec!["serial_ports"]);
    }

    #[test]
    fn test_refresh_failure_discards_listing() {
        let mut client = connected();
        client.transport().fail("get_info");

        assert!(client.refresh().is_err());
        assert!(!client.store().is_loaded());

        client.transport().recover("get_info");
        client.refresh().unwrap();
        assert!(client.store().is_loaded());
    }

    #[test]
    fn test_desync_forces_refetch() {
        let mut raw = listing();
        raw.taken_size = 10;
        let mut client = MasterSd::new(MockTransport::with_listing(raw));
        client.connect(&["/dev/ttyACM0".to_string()]).unwrap();

        let result = client.delete("/sdcard/prints/a.gcode");
        assert!(matches!(result, Err(MasterSdError::SpaceDesync(_))));

        let calls = client.transport().calls();
        assert_eq!(calls.last().map(String::as_str), Some("get_info"));
        assert!(client.store().is_loaded());
    }

    #[test]
    fn test_upload_writes_into_folder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part.gcode");
        File::create(&path).unwrap().set_len(100).unwrap();

        let mut transport = MockTransport::with_listing(listing());
        transport.written_size = 100;
        let mut client = MasterSd::new(transport);
        client.connect(&["/dev/ttyACM0".to_string()]).unwrap();

        let written = client
            .upload(&path, "/sdcard/prints", false)
            .unwrap()
            .applied()
            .unwrap();
        assert_eq!(written.name, "part.gcode");

        let view = client.store().children_of("/sdcard/prints").unwrap();
        assert!(view.files.iter().any(|file| file.name == "part.gcode"));
        assert_eq!(client.store().current_space().used_bytes, 140);
    }

    #[test]
    fn test_upload_with_run_releases_card() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part.gcode");
        File::create(&path).unwrap().set_len(10).unwrap();

        let mut client = connected();
        client.upload(&path, "/sdcard", true).unwrap();

        assert!(!client.store().is_loaded());
        assert_eq!(client.session().controller(), Some(Controller::Host));
    }

    #[test]
    fn test_upload_size_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.gcode");
        File::create(&path)
            .unwrap()
            .set_len(MAX_UPLOAD_BYTES + 1)
            .unwrap();

        let mut client = connected();
        assert!(matches!(
            client.upload(&path, "/sdcard", false),
            Err(MasterSdError::UploadTooLarge { .. })
        ));
        assert!(!client
            .transport()
            .calls()
            .iter()
            .any(|call| call.starts_with("upload")));
    }

    #[test]
    fn test_operations_need_the_card() {
        let mut client = MasterSd::new(MockTransport::with_listing(listing()));
        assert!(matches!(
            client.mkdir("/sdcard", "x"),
            Err(MasterSdError::NotConnected)
        ));
        assert!(matches!(
            client.disconnect(),
            Err(MasterSdError::NotConnected)
        ));
    }
}
