//! Service layer: orchestrates repository access and applies the
//! visibility policy at each decision point. Collaborators are injected
//! through the constructors, nothing is resolved at runtime.

pub mod comments;
pub mod posts;
pub mod users;

pub use comments::CommentService;
pub use posts::PostService;
pub use users::UserService;
