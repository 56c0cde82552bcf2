pub mod comment;
pub mod post;

pub use comment::*;
pub use post::*;
