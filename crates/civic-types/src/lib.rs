pub mod api;
pub mod flow;
pub mod models;
pub mod validation;

pub use flow::{FlowError, FlowEvent, FlowStage, Session};
pub use models::{Citizen, IdNumber, Theme};
