//! Outgoing message channel: transport ownership plus sequence numbering.
//!
//! Every response and event drains the single monotonic `seq` counter here,
//! which linearizes everything the client observes.

use crate::dap::protocol::{Event, Request, Response};
use crate::dap::transport::Transport;
use crate::debugger::error::Error;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

pub struct Channel {
    transport: Box<dyn Transport>,
    seq: i64,
}

impl Channel {
    pub fn new(transport: Box<dyn Transport>) -> Channel {
        Channel { transport, seq: 1 }
    }

    fn next_seq(&mut self) -> i64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    pub fn reset_seq(&mut self) {
        self.seq = 1;
    }

    pub fn poll(&mut self) -> Result<(), Error> {
        self.transport.poll().map_err(Error::Transport)
    }

    pub fn input(&mut self) -> Option<Value> {
        self.transport.input()
    }

    pub fn set_schema(&mut self, path: &Path) -> Result<(), Error> {
        self.transport.set_schema(path).map_err(Error::Transport)
    }

    pub fn respond(&mut self, request: &Request, body: Option<Value>) -> Result<(), Error> {
        let seq = self.next_seq();
        self.write(&Response::success(seq, request, body))
    }

    pub fn respond_error(
        &mut self,
        request: &Request,
        message: impl Into<String>,
    ) -> Result<(), Error> {
        let seq = self.next_seq();
        self.write(&Response::error(seq, request, message))
    }

    pub fn event(&mut self, event: &'static str, body: Option<Value>) -> Result<(), Error> {
        let seq = self.next_seq();
        self.write(&Event::new(seq, event, body))
    }

    fn write<T: Serialize>(&mut self, message: &T) -> Result<(), Error> {
        let value = serde_json::to_value(message)?;
        self.transport.send(&value).map_err(Error::Transport)
    }
}
