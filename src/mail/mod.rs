//! Mail domain: entity, wire payloads, address and result validation.

pub mod address;
pub mod model;
pub mod validator;

pub use model::{
    ApproveRequest, AssistantResponseRequest, ClassificationTask, DeadLetterEvent, IncomingMail,
    Mail, MailStatus, ProcessedEvent, ValidateRequest,
};
