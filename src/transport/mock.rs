//! In-memory [`Transport`] for unit tests

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::Path;

use super::error::{TransportError, TransportResult};
use super::wire::{RawListing, WriteRequest, WriteResponse};
use super::Transport;

/// Scripted backend recording every call it receives
#[derive(Default)]
pub(crate) struct MockTransport {
    pub ports: Vec<String>,
    pub connect_flag: Option<bool>,
    /// Flag returned by the next switch; flips on every call
    pub control: Cell<Option<bool>>,
    pub listing: RefCell<RawListing>,
    /// Size the device reports for written files
    pub written_size: u64,
    pub failing: RefCell<HashSet<&'static str>>,
    pub calls: RefCell<Vec<String>>,
}

impl MockTransport {
    pub fn with_listing(listing: RawListing) -> Self {
        Self {
            ports: vec!["/dev/ttyACM0".to_string()],
            connect_flag: Some(true),
            listing: RefCell::new(listing),
            ..Default::default()
        }
    }

    pub fn fail(&self, call: &'static str) {
        self.failing.borrow_mut().insert(call);
    }

    pub fn recover(&self, call: &'static str) {
        self.failing.borrow_mut().remove(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: &'static str, detail: &str) -> TransportResult<()> {
        let entry = if detail.is_empty() {
            call.to_string()
        } else {
            format!("{} {}", call, detail)
        };
        self.calls.borrow_mut().push(entry);

        if self.failing.borrow().contains(call) {
            return Err(TransportError::Status {
                status: 400,
                body: format!("{} failed", call),
            });
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    fn serial_ports(&self) -> TransportResult<Vec<String>> {
        self.record("serial_ports", "")?;
        Ok(self.ports.clone())
    }

    fn connect(&self, ports: &[String]) -> TransportResult<Option<bool>> {
        self.record("connect", &ports.join(","))?;
        self.control.set(self.connect_flag);
        Ok(self.connect_flag)
    }

    fn disconnect(&self) -> TransportResult<()> {
        self.record("disconnect", "")
    }

    fn switch_control(&self) -> TransportResult<Option<bool>> {
        self.record("switch_control", "")?;
        let next = Some(!self.control.get().unwrap_or(true));
        self.control.set(next);
        Ok(next)
    }

    fn get_info(&self) -> TransportResult<RawListing> {
        self.record("get_info", "")?;
        Ok(self.listing.borrow().clone())
    }

    fn mkdir(&self, path: &str) -> TransportResult<()> {
        self.record("mkdir", path)
    }

    fn rmdir(&self, path: &str) -> TransportResult<()> {
        self.record("rmdir", path)
    }

    fn delete(&self, path: &str) -> TransportResult<()> {
        self.record("delete", path)
    }

    fn upload(&self, file: &Path) -> TransportResult<String> {
        let name = file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        self.record("upload", &name)?;
        Ok(name)
    }

    fn write_sd(&self, request: &WriteRequest) -> TransportResult<WriteResponse> {
        self.record("write_sd", &format!("{} -> {}", request.name, request.path))?;
        Ok(WriteResponse {
            name: request.name.clone(),
            size: self.written_size,
            autorun: request.run,
        })
    }
}
