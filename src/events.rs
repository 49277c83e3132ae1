//! The contract between the engine and its host.
//!
//! The engine performs no I/O of its own: every outbound byte goes through
//! [`Events::writev`] and every parsed protocol event lands in one of the
//! other methods, all on the calling thread. Returning `Err` from any
//! method unwinds the current state-machine step with that error; the
//! connection should then be discarded.
//!
//! Only the sink is mandatory. Everything else defaults to a no-op so a
//! host implements exactly the events it cares about.

use crate::error::Result;
use crate::frame::FrameHeader;
use crate::message::Message;

pub trait Events {
    /// Emit outbound bytes, in order. An `Err` aborts the connection with
    /// [`crate::Error::Disconnect`].
    fn writev(&mut self, chunks: &[&[u8]]) -> Result<()>;

    /// A stream came into existence (locally or remotely initiated).
    fn stream_start(&mut self, _id: u32) -> Result<()> {
        Ok(())
    }

    /// The stream is gone; no further events fire for this id.
    fn stream_end(&mut self, _id: u32) -> Result<()> {
        Ok(())
    }

    fn message_head(&mut self, _id: u32, _message: &Message) -> Result<()> {
        Ok(())
    }

    fn message_data(&mut self, _id: u32, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    /// End of payload. Carries the trailer block when one was received.
    fn message_tail(&mut self, _id: u32, _trailers: Option<&Message>) -> Result<()> {
        Ok(())
    }

    /// A pushed request promised on `parent`; the response will arrive on
    /// stream `id`.
    fn message_push(&mut self, _id: u32, _message: &Message, _parent: u32) -> Result<()> {
        Ok(())
    }

    /// Raw observation hook: every inbound HTTP/2 frame, before dispatch.
    fn frame(&mut self, _head: &FrameHeader, _payload: &[u8]) -> Result<()> {
        Ok(())
    }

    /// The peer's SETTINGS were applied (and acknowledged).
    fn settings(&mut self) -> Result<()> {
        Ok(())
    }

    /// More payload may now be sent; `id` 0 means the connection window.
    fn flow_increase(&mut self, _id: u32) -> Result<()> {
        Ok(())
    }

    fn pong(&mut self, _payload: [u8; 8]) -> Result<()> {
        Ok(())
    }

    /// An HTTP/1 Upgrade (other than h2c) was requested. Parsing pauses
    /// until the host answers with some response head; a 101 switches the
    /// remaining payload to raw passthrough.
    fn upgrade(&mut self) -> Result<()> {
        Ok(())
    }
}
