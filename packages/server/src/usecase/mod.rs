//! UseCase layer: action handlers, the dispatcher that routes envelopes to them,
//! the floor-request coordinator, and connection open/close handling.

pub mod authenticate;
pub mod chat;
pub mod connect;
pub mod disconnect;
pub mod dispatcher;
pub mod error;
pub mod floor;
pub mod floor_coordinator;
pub mod handler;
pub mod meeting;

pub use authenticate::AuthenticationHandler;
pub use chat::ChatHandler;
pub use connect::ConnectUseCase;
pub use disconnect::DisconnectUseCase;
pub use dispatcher::{ActionDispatcher, InboundQueue};
pub use error::ActionError;
pub use floor::FloorRequestHandler;
pub use floor_coordinator::FloorRequestCoordinator;
pub use handler::{ActionHandler, Broadcast, Outcome, RequestContext};
pub use meeting::MeetingLifecycleHandler;
