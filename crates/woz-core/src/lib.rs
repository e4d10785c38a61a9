pub mod errors;
pub mod export;
pub mod ids;
pub mod session;

pub use errors::RelayError;
pub use ids::{LogRowId, MessageId, SessionId};
pub use session::{LogRow, Message, Role, Session};
