pub mod access;
pub mod auth;
pub mod error;
pub mod likes;
pub mod posts;
pub mod reconcile;
pub mod subposts;
