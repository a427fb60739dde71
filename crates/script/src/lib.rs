//! Standard script forms and public key handling used by output storage.

pub mod secp;
pub mod standard;
