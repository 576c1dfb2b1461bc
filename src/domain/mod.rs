pub mod change;
pub mod comment;
pub mod listing;
pub mod preferences;
pub mod toast;
pub mod vote;
