//! Practice consultations with a doctor persona, summarized into a checklist
//! of what to tell and ask a real doctor.

pub mod config;
pub mod error;
pub mod gateway;
pub mod openai;
pub mod prompt;
pub mod record;
pub mod script;
pub mod session;
pub mod storage;
pub mod transcript;

pub use error::*;
