//! In-memory collaborators for exercising `flexray-tp` in tests.
//!
//! - [`MockUpper`] stages message bytes per connection and records every confirmation.
//! - [`MockLink`] records frames handed to the network and can be told to refuse them.

use std::collections::HashMap;

use flexray_tp::{BufReq, ConnectionId, FrTpError, FrameLink, TxFrame, UpperLayer};

/// Message source of one connection.
#[derive(Debug, Default, Clone)]
struct MockSource {
    data: Vec<u8>,
    offset: usize,
    staged: usize,
    busy: bool,
    failing: bool,
}

impl MockSource {
    fn unsent(&self) -> usize {
        self.data.len() - self.offset
    }
}

/// Upper layer backed by per-connection byte buffers.
#[derive(Debug, Default)]
pub struct MockUpper {
    sources: HashMap<ConnectionId, MockSource>,
    confirmations: Vec<(ConnectionId, Result<(), FrTpError>)>,
    queries: usize,
}

impl MockUpper {
    /// Upper layer with no connection loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide `data` for `connection` with every byte staged.
    pub fn load(&mut self, connection: ConnectionId, data: &[u8]) {
        self.load_staged(connection, data, data.len());
    }

    /// Provide `data` for `connection` with only the first `staged` bytes available.
    pub fn load_staged(&mut self, connection: ConnectionId, data: &[u8], staged: usize) {
        self.sources.insert(
            connection,
            MockSource {
                data: data.to_vec(),
                staged: staged.min(data.len()),
                ..MockSource::default()
            },
        );
    }

    /// Make `count` more bytes of the message available.
    pub fn stage(&mut self, connection: ConnectionId, count: usize) {
        if let Some(src) = self.sources.get_mut(&connection) {
            src.staged = (src.staged + count).min(src.unsent());
        }
    }

    /// Answer every request for `connection` with [`BufReq::Busy`].
    pub fn set_busy(&mut self, connection: ConnectionId, busy: bool) {
        if let Some(src) = self.sources.get_mut(&connection) {
            src.busy = busy;
        }
    }

    /// Answer every request for `connection` with [`BufReq::NotOk`].
    pub fn set_failing(&mut self, connection: ConnectionId, failing: bool) {
        if let Some(src) = self.sources.get_mut(&connection) {
            src.failing = failing;
        }
    }

    /// Confirmations received so far, oldest first.
    pub fn confirmations(&self) -> &[(ConnectionId, Result<(), FrTpError>)] {
        &self.confirmations
    }

    /// Confirmations received for `connection`.
    pub fn results_for(&self, connection: ConnectionId) -> Vec<Result<(), FrTpError>> {
        self.confirmations
            .iter()
            .filter(|(id, _)| *id == connection)
            .map(|(_, result)| *result)
            .collect()
    }

    /// Bytes of `connection`'s message handed out so far.
    pub fn copied(&self, connection: ConnectionId) -> usize {
        self.sources.get(&connection).map_or(0, |src| src.offset)
    }

    /// Number of zero-length availability queries seen.
    pub fn queries(&self) -> usize {
        self.queries
    }
}

impl UpperLayer for MockUpper {
    fn copy_tx_data(&mut self, connection: ConnectionId, dest: &mut [u8]) -> BufReq {
        if dest.is_empty() {
            self.queries += 1;
        }
        let Some(src) = self.sources.get_mut(&connection) else {
            return BufReq::NotOk;
        };
        if src.failing {
            return BufReq::NotOk;
        }
        if src.busy || dest.len() > src.staged {
            return BufReq::Busy;
        }
        let end = src.offset + dest.len();
        dest.copy_from_slice(&src.data[src.offset..end]);
        src.offset = end;
        src.staged -= dest.len();
        BufReq::Ok(src.staged as u32)
    }

    fn tx_confirmation(&mut self, connection: ConnectionId, result: Result<(), FrTpError>) {
        self.confirmations.push((connection, result));
    }
}

/// Frame recorded by [`MockLink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub connection: ConnectionId,
    pub frame: TxFrame,
    pub payload: Vec<u8>,
}

/// Error returned by [`MockLink`] while refusing frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRefused;

/// Frame link that records instead of transmitting.
#[derive(Debug, Default)]
pub struct MockLink {
    frames: Vec<SentFrame>,
    cancels: Vec<ConnectionId>,
    refuse: bool,
}

impl MockLink {
    /// Link accepting every frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every following frame.
    pub fn set_refuse(&mut self, refuse: bool) {
        self.refuse = refuse;
    }

    /// Frames accepted so far.
    pub fn frames(&self) -> &[SentFrame] {
        &self.frames
    }

    /// Connections whose pending frame was cancelled.
    pub fn cancels(&self) -> &[ConnectionId] {
        &self.cancels
    }

    /// Concatenated payload accepted for `connection`.
    pub fn payload_for(&self, connection: ConnectionId) -> Vec<u8> {
        self.frames
            .iter()
            .filter(|f| f.connection == connection)
            .flat_map(|f| f.payload.iter().copied())
            .collect()
    }
}

impl FrameLink for MockLink {
    type Error = LinkRefused;

    fn transmit(
        &mut self,
        connection: ConnectionId,
        frame: &TxFrame,
        payload: &[u8],
    ) -> Result<(), Self::Error> {
        if self.refuse {
            return Err(LinkRefused);
        }
        self.frames.push(SentFrame {
            connection,
            frame: *frame,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn cancel_transmit(&mut self, connection: ConnectionId) {
        self.cancels.push(connection);
    }
}
