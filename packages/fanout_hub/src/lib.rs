//! Fanout Hub - real-time message fan-out between peer connections
//!
//! A single hub worker owns the set of live connections. Everything that
//! touches that set (register, unregister, broadcast) arrives as a message on
//! a queue and is applied one request at a time. Each connection gets a reader
//! task that forwards whatever it receives to the hub, which writes it to every
//! member. A member whose write fails is dropped without affecting the others.
//!
//! This crate knows nothing about sockets or message formats: transports plug
//! in by implementing [`PeerSender`] and [`PeerReceiver`].
//!
//! # Example
//!
//! ```no_run
//! use fanout_hub::{Connection, Hub, HubConfig, HubHandle, accept};
//! # use fanout_hub::{ConnectionError, Payload, PeerReceiver, PeerSender};
//! # struct MySender;
//! # struct MyReceiver;
//! # impl PeerSender for MySender {
//! #     async fn send(&mut self, _p: Payload) -> Result<(), ConnectionError> { Ok(()) }
//! #     async fn close(&mut self) {}
//! # }
//! # impl PeerReceiver for MyReceiver {
//! #     async fn recv(&mut self) -> Result<Payload, ConnectionError> { Err(ConnectionError::Closed) }
//! # }
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub: HubHandle<MySender> = Hub::spawn(HubConfig::default());
//!
//!     // For every accepted peer:
//!     let conn = Connection::new(MySender, MyReceiver);
//!     let reader = accept(&hub, conn).await.unwrap();
//!
//!     // The reader ends once the peer goes away.
//!     let exit = reader.await.unwrap();
//!     println!("reader finished: {:?}", exit);
//!
//!     hub.shutdown().await.unwrap();
//! }
//! ```

mod connection;
mod error;
mod hub;
mod membership;
mod reader;
#[cfg(test)]
mod test_helpers;

pub use connection::{ConnId, Connection, Member, Payload, PeerReceiver, PeerSender, Source};
pub use error::{ConnectionError, HubError};
pub use hub::{DEFAULT_SEND_TIMEOUT, Hub, HubConfig, HubHandle, HubStats};
pub use reader::{ReaderExit, accept, run_reader};
