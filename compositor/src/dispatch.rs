//! The dispatcher loop: the main thread blocks on the inbound channel and
//! applies each packet to the shared server.
use crate::outbox::SharedChannel;
use crate::shared::SharedServer;
use crate::sources::Inbound;
use crossbeam_channel::Receiver;

/// Consumes `rx` until every sender has been dropped, applying each
/// [`Inbound`] item to `server` and replying through `outbox`.
pub fn run_dispatch(server: SharedServer, mut outbox: SharedChannel, rx: Receiver<Inbound>) {
    for item in rx.iter() {
        match item {
            Inbound::Packet(source, header, body) => {
                server.with(|srv| compositor_core::dispatch(srv, &mut outbox, source, header, &body));
            }
            Inbound::Disconnect(source) => {
                server.with(|srv| srv.disconnect_client(source));
            }
        }
    }
}
