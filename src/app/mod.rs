pub mod comments;
pub mod directory;
pub mod error;
pub mod filter;
pub mod i18n;
pub mod toasts;
pub mod validation;
pub mod view;
pub mod vote_cache;
pub mod voting;
