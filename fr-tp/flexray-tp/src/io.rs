//! Collaborator interfaces: the upper-layer data source and the frame link.
//!
//! The engine never encodes frames or touches hardware itself. It pulls payload bytes through
//! [`UpperLayer`], reports the outcome of each message back through it, and (when driven through
//! [`crate::TxEngine::poll_send`]) hands filled frames to a [`FrameLink`].

use crate::ConnectionId;
use crate::errors::FrTpError;
use crate::tx::TxFrame;

/// Outcome of an upper-layer copy request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufReq {
    /// Copy done; carries the number of bytes still staged after it.
    Ok(u32),
    /// Not enough data staged yet; retry later.
    Busy,
    /// Data source failed; the message cannot complete.
    NotOk,
}

/// Application side of a connection.
pub trait UpperLayer {
    /// Copy `dest.len()` bytes of the message into `dest`.
    ///
    /// An empty `dest` copies nothing and only reports the staged byte count.
    fn copy_tx_data(&mut self, connection: ConnectionId, dest: &mut [u8]) -> BufReq;

    /// Final outcome of a message admitted by [`crate::TxEngine::transmit`], reported once.
    fn tx_confirmation(&mut self, connection: ConnectionId, result: Result<(), FrTpError>);
}

/// Network-layer frame transmit primitive.
pub trait FrameLink {
    /// Backend-specific error type.
    type Error;

    /// Queue one frame; its PCI is derived from `frame` by the codec behind this link.
    fn transmit(
        &mut self,
        connection: ConnectionId,
        frame: &TxFrame,
        payload: &[u8],
    ) -> Result<(), Self::Error>;

    /// Drop a queued frame that has not been confirmed yet.
    fn cancel_transmit(&mut self, connection: ConnectionId);
}
