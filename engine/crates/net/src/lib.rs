pub mod channels;
pub mod output_router;
pub mod protocol;
pub mod rate_limiter;
pub mod web_server;

pub use channels::NetToTick;
pub use protocol::{
    parse_client_message, ActionRequest, ClientMessage, ClientRequest, InteractAction,
    ProtocolError, ServerMessage,
};
pub use rate_limiter::RateLimitConfig;
pub use web_server::{serve_on_listener, WebServerConfig};
