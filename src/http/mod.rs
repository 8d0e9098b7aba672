//! HTTP surface: record store, route dispatcher and server.

mod dispatcher;
mod handlers;
mod server;
mod store;

pub use dispatcher::Dispatcher;
pub use handlers::ApiError;
pub use server::HttpServer;
pub use store::{Person, PersonInput, RecordStore};
