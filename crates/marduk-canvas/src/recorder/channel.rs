use std::sync::Weak;

use crate::transport::{TransportHandle, TransportHelpers, TransportInit};

/// Connection from a recorder to the translator replaying its stream.
///
/// Calls return `false` when the message could not be delivered; the
/// recorder then treats its transport as unavailable.
pub trait TranslatorChannel: Send + Sync {
    /// Hands the header, signals and initial buffers to the translator.
    fn install_transport(&self, init: TransportInit) -> bool;

    /// Announces a buffer the writer grew into.
    fn add_buffer(&self, handle: TransportHandle) -> bool;

    /// Replaces the readback buffer. Only sent after a `PauseTranslation`
    /// event was recorded.
    fn set_data_surface_buffer(&self, handle: TransportHandle) -> bool;

    /// Resumes a reader that stopped after its idle timeout.
    fn restart(&self) -> bool;

    /// `true` once nothing sent on this channel will be acted upon.
    fn is_closed(&self) -> bool;
}

/// Forwards writer callbacks to the recorder's channel.
///
/// Holds the channel weakly so that the transport never keeps its own
/// connection alive.
pub(crate) struct RecorderHelpers {
    channel: Weak<dyn TranslatorChannel>,
}

impl RecorderHelpers {
    pub(crate) fn new(channel: Weak<dyn TranslatorChannel>) -> Self {
        Self { channel }
    }
}

impl TransportHelpers for RecorderHelpers {
    fn init_translator(&self, init: TransportInit) -> bool {
        self.channel
            .upgrade()
            .is_some_and(|c| c.install_transport(init))
    }

    fn add_buffer(&self, handle: TransportHandle) -> bool {
        self.channel.upgrade().is_some_and(|c| c.add_buffer(handle))
    }

    fn reader_closed(&self) -> bool {
        self.channel.upgrade().is_none_or(|c| c.is_closed())
    }

    fn restart_reader(&self) -> bool {
        self.channel.upgrade().is_some_and(|c| c.restart())
    }
}
