//! Screening chat: conversation state machine and HTTP service behind a
//! portfolio site's visitor/recruiter chatbot.

pub mod app;
pub mod articles;
pub mod chat;
pub mod config;
pub mod error;
pub mod events;
pub mod news;
pub mod ratelimit;
pub mod site;
pub mod store;
pub mod transcript;
pub mod uploads;

#[cfg(test)]
pub(crate) mod test_support;
