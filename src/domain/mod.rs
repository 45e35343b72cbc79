pub mod account;
pub mod article;
pub mod summary;
pub mod tree;

pub use account::{Account, Backend, BackendKind};
pub use article::{Abstract, ArticleState, StateChange};
pub use summary::{FeedListEntry, Summary, Validator};
pub use tree::{FeedTree, Folder};
