pub mod like;
pub mod page;
pub mod post;
pub mod subpost;
pub mod user;
