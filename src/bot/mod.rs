/// Action button payloads
pub mod callback;
/// Reply storage and chunked delivery
pub mod delivery;
/// Command and message handlers
pub mod handlers;
/// Button and rewrite command routing
pub mod router;
/// Per-chat wizard sessions
pub mod state;
/// Outbound chat operations
pub mod transport;
/// User-facing texts and keyboards
pub mod views;
/// Connection health monitoring
pub mod watchdog;
/// Image generation wizard
pub mod wizard;

pub use handlers::{BotContext, Caller, Command};
