pub mod command;
pub mod message;
pub mod secure;
pub mod session;

pub use command::{Command, CommandContext, CommandHandler, CommandRouter};
pub use message::{channel_aad, ChannelMessage, EncryptedMessage, PlaintextMessage};
pub use secure::{ChannelTransport, ReceiveOutcome, SecureChannel};
pub use session::SessionEstablisher;
