//! Outbound mail: message model, the `Mailer` collaborator, and the
//! single-consumer dispatcher that feeds it.
//!
//! SMTP itself is out of scope; [`Mailer`] is the seam where a real transport
//! plugs in. [`LogMailer`] only logs, for development and tests.

pub mod dispatcher;
pub mod mailer;
pub mod message;

pub use dispatcher::{MailChannels, MailDispatcher, MailDispatcherHandle, MailQueue};
pub use mailer::{LogMailer, MailConfig, MailError, Mailer};
pub use message::{Attachment, Message};
