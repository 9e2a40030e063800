mod error;
mod host;
mod turn;

pub use error::SessionError;
pub use host::SessionHost;
pub use turn::{TurnRequest, TurnResult, TurnStatus};
